//! Chat messages, read markers and history requests.
//!
//! ```text
//! {type:"chat", data:{type:"msg",     data:{message}}}  -> broadcast to online
//! {type:"chat", data:{type:"confirm", data:{msgId}}}    -> read marker
//! {type:"chat", data:{type:"log",     data:null}}       -> tail to requester
//! ```

use super::super::RoomActor;
use crate::rooms::chat::compose;
use presence_proto::{Event, kinds};
use serde_json::{Value, json};
use tracing::{debug, warn};

const MSG: &str = "msg";
const CONFIRM: &str = "confirm";
const LOG: &str = "log";

impl RoomActor {
    pub(crate) async fn handle_chat(&mut self, account_id: &str, event: &Event) {
        let inner = match event.inner() {
            Ok(inner) => inner,
            Err(e) => {
                debug!(room_id = %self.id, error = %e, "Malformed chat event");
                return;
            }
        };
        match inner.kind() {
            MSG => self.handle_chat_message(account_id, &inner.data).await,
            CONFIRM => self.handle_chat_confirm(account_id, &inner.data).await,
            LOG => {
                let tail = json!({ "type": LOG, "data": self.log.tail() });
                self.send_to(account_id, Event::new(kinds::CHAT, tail));
            }
            other => debug!(room_id = %self.id, kind = %other, "Unknown chat event"),
        }
    }

    async fn handle_chat_message(&mut self, account_id: &str, data: &Value) {
        let text = data
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| data.as_str())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return;
        }
        let Some(sender) = self.participants.get(account_id) else {
            return;
        };

        let message = compose(account_id, &sender.name, text);
        self.log.push(message.clone());
        if self.persistent {
            let stored = self
                .ctx
                .store
                .append_message(self.log.key(), &message)
                .await;
            if let Err(e) = stored {
                warn!(room_id = %self.id, msg_id = %message.msg_id, error = %e, "Failed to store chat message");
            }
        }

        self.broadcast(
            &Event::new(kinds::CHAT, json!({ "type": MSG, "data": message })),
            None,
        );
    }

    async fn handle_chat_confirm(&mut self, account_id: &str, data: &Value) {
        let Some(msg_id) = data.get("msgId").and_then(Value::as_str) else {
            return;
        };
        if !self.persistent {
            return;
        }
        if let Err(e) = self
            .ctx
            .store
            .mark_read(self.log.key(), account_id, msg_id)
            .await
        {
            warn!(room_id = %self.id, account_id = %account_id, error = %e, "Failed to store read marker");
        }
    }
}
