//! Multi-device sessions, resume, logout and guests.

mod common;

use common::server::user;
use common::TestServer;
use presence_proto::kinds;
use presenced::store::{AccountStore, InviteStore, RoomStore};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn second_device_joins_the_live_session() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut phone = server.connect();
    let mut laptop = server.connect();

    let first = phone.login("ann", "Ann").await.unwrap();
    let second = laptop.login("ann", "Ann").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(server.hub.sessions().len(), 1);
    assert_eq!(
        server.hub.sessions().get(&first).unwrap().connection_count(),
        2
    );

    // account output reaches every device
    phone.send(kinds::CREATE, json!({ "name": "standup" })).await;
    let on_phone = phone.expect(kinds::JOIN).await.unwrap();
    let on_laptop = laptop.expect(kinds::JOIN).await.unwrap();
    assert_eq!(on_phone, on_laptop);
}

#[tokio::test]
async fn initialize_answers_only_the_asking_device() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut phone = server.connect();
    let mut laptop = server.connect();
    phone.login("ann", "Ann").await.unwrap();
    laptop.login("ann", "Ann").await.unwrap();

    laptop.send(kinds::INITIALIZE, json!(null)).await;
    let init = laptop.expect(kinds::INITIALIZE).await.unwrap();
    assert_eq!(init.data["account"]["name"], "Ann");

    // the phone sees nothing for it
    assert!(phone.recv_timeout(Duration::from_millis(200)).await.is_err());
}

#[tokio::test]
async fn session_resume_reattaches() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut phone = server.connect();
    let session_id = phone.login("ann", "Ann").await.unwrap();

    let mut again = server.connect();
    again.expect(kinds::AUTHENTICATE).await.unwrap();
    again.send(kinds::SESSION, json!(session_id)).await;
    let attached = again.expect(kinds::SESSION).await.unwrap();
    assert_eq!(attached.data, json!(session_id));
    again.expect(kinds::READY).await.unwrap();
    assert_eq!(
        server.hub.sessions().get(&session_id).unwrap().connection_count(),
        2
    );
}

#[tokio::test]
async fn logout_closes_every_device() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut phone = server.connect();
    let mut laptop = server.connect();
    let session_id = phone.login("ann", "Ann").await.unwrap();
    laptop.login("ann", "Ann").await.unwrap();

    phone.send(kinds::LOGOUT, json!(null)).await;
    phone.expect_closed().await.unwrap();
    laptop.expect_closed().await.unwrap();

    // teardown runs in the background
    for _ in 0..50 {
        if server.hub.sessions().get(&session_id).is_none() && server.hub.accounts().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.hub.sessions().get(&session_id).is_none());
    assert!(server.hub.accounts().is_empty());

    // a fresh login gets a fresh session
    let mut next = server.connect();
    let fresh = next.login("ann", "Ann").await.unwrap();
    assert_ne!(fresh, session_id);
}

#[tokio::test]
async fn guest_joins_through_an_invite() {
    let server = TestServer::start(vec![]);
    let owner = server
        .store
        .create_account("owner", None, "Owner")
        .await
        .unwrap();
    server
        .store
        .set_room("room-lobby", "lobby", &owner.client_id, false)
        .await
        .unwrap();
    server
        .store
        .create_invite("tok-1", "room-lobby", true, &owner.client_id)
        .await
        .unwrap();

    let invite = json!({
        "type": "anon-invite",
        "data": { "tokens": { "token": "tok-1", "roomId": "room-lobby" }, "identity": { "name": "Visitor" } },
    });

    let mut guest = server.connect();
    guest.expect(kinds::AUTHENTICATE).await.unwrap();
    guest.send(kinds::AUTHENTICATE, invite.clone()).await;
    assert_eq!(guest.recv().await.unwrap().data, json!(true));
    guest.expect(kinds::READY).await.unwrap();
    let joined = guest.expect(kinds::JOIN).await.unwrap();
    assert_eq!(joined.data["clientId"], "room-lobby");

    // single use: the same token is refused the second time
    let mut second = server.connect();
    second.expect(kinds::AUTHENTICATE).await.unwrap();
    second.send(kinds::AUTHENTICATE, invite).await;
    assert_eq!(second.recv().await.unwrap().data, json!(false));
    let error = second.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_INVITE_INVALID");
}

#[tokio::test]
async fn quick_relogin_keeps_the_room_binding() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let ann = server
        .store
        .create_account("ann", None, "Ann")
        .await
        .unwrap();
    server
        .store
        .set_room("room-ops", "ops", &ann.client_id, false)
        .await
        .unwrap();
    server
        .store
        .authorize("room-ops", &[ann.client_id.clone()])
        .await
        .unwrap();

    let mut first = server.connect();
    let session_id = first.login("ann", "Ann").await.unwrap();
    first.expect(kinds::JOIN).await.unwrap();

    // last device drops, then the user is straight back
    let session = server.hub.sessions().get(&session_id).unwrap();
    for conn_id in session.connection_ids() {
        session.detach(&conn_id);
    }
    let mut second = server.connect();
    let fresh = second.login("ann", "Ann").await.unwrap();
    assert_ne!(fresh, session_id);
    second.expect(kinds::JOIN).await.unwrap();

    // let the old account finish its teardown
    for _ in 0..50 {
        if server.hub.sessions().get(&session_id).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let room = server.hub.rooms().get_room("room-ops").await.unwrap().unwrap();
    let state = room.state().await.unwrap();
    assert_eq!(state.online, vec![ann.client_id.clone()]);

    second
        .send(
            kinds::ROOM,
            json!({ "roomId": "room-ops", "event": { "type": "initialize", "data": null } }),
        )
        .await;
    let snapshot = second.expect_room_event(kinds::INITIALIZE).await.unwrap();
    assert_eq!(snapshot.data["roomId"], "room-ops");
}
