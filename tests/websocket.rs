//! End-to-end over a real WebSocket.

mod common;

use common::server::user;
use common::TestServer;
use futures_util::{SinkExt, StreamExt};
use presence_proto::{Event, kinds};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn recv(ws: &mut Ws) -> Option<Event> {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.ok()?? {
            Ok(WsMessage::Text(text)) => return Event::parse(&text).ok(),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn expect(ws: &mut Ws, kind: &str) -> Event {
    loop {
        let event = recv(ws).await.unwrap_or_else(|| panic!("closed before {kind}"));
        if event.is(kind) {
            return event;
        }
    }
}

async fn send(ws: &mut Ws, kind: &str, data: serde_json::Value) {
    let text = Event::new(kind, data).to_text().unwrap();
    ws.send(WsMessage::Text(text)).await.unwrap();
}

#[tokio::test]
async fn login_over_websocket() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let addr = server.spawn_gateway().await.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    expect(&mut ws, kinds::AUTHENTICATE).await;
    send(
        &mut ws,
        kinds::AUTHENTICATE,
        json!({ "type": "authid", "data": { "tokens": { "authId": "auth-ann" }, "login": "ann" } }),
    )
    .await;
    assert_eq!(expect(&mut ws, kinds::AUTHENTICATE).await.data, json!(true));
    expect(&mut ws, kinds::ACCOUNT).await;

    send(&mut ws, kinds::ACCOUNT, json!({ "type": "create", "data": { "login": "ann", "name": "Ann" } })).await;
    let created = expect(&mut ws, kinds::ACCOUNT).await;
    assert_eq!(created.data["type"], "create");
    assert_eq!(created.data["data"]["login"], "ann");

    send(&mut ws, kinds::ACCOUNT, json!({ "type": "login", "data": { "alias": "ann" } })).await;
    let session = expect(&mut ws, kinds::SESSION).await;
    assert!(session.data.as_str().unwrap().starts_with("session-"));
    expect(&mut ws, kinds::READY).await;

    // closing the socket ends the session
    ws.close(None).await.unwrap();
    let session_id = session.data.as_str().unwrap().to_string();
    for _ in 0..50 {
        if server.hub.sessions().get(&session_id).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.hub.sessions().get(&session_id).is_none());
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = TestServer::start(vec![]);
    let addr = server.spawn_gateway().await.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    expect(&mut ws, kinds::AUTHENTICATE).await;
    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
    send(&mut ws, kinds::SESSION, json!("session-nope")).await;
    assert_eq!(expect(&mut ws, kinds::SESSION).await.data, json!(false));
}
