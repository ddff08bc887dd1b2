//! WebSocket transport adapter.
//!
//! Moves frames between a [`WebSocketStream`] and the [`ClientEnd`] of a
//! [`Connection`](super::Connection). Text frames carry one JSON event each.

use crate::network::{ClientEnd, Outbound};
use futures_util::{SinkExt, StreamExt};
use presence_proto::Event;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

/// Pump frames until either side closes. Dropping the inbound sender on exit
/// tells the server side the client is gone.
pub async fn pump<S>(stream: WebSocketStream<S>, end: ClientEnd)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ClientEnd { id, tx, mut rx } = end;
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Event::parse(&text) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(conn_id = %id, error = %e, "Dropping malformed frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!(conn_id = %id, "Ignoring binary WebSocket frame");
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %id, error = %e, "WebSocket read failed");
                    break;
                }
            },
            outbound = rx.recv() => match outbound {
                Some(Outbound::Event(event)) => {
                    let text = match event.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn_id = %id, error = %e, "Unencodable event dropped");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        debug!(conn_id = %id, error = %e, "WebSocket write failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
        }
    }
    let _ = sink.close().await;
    debug!(conn_id = %id, "WebSocket closed");
}
