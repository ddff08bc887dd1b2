//! Room-scoped client events.
//!
//! Clients address a room with `{type:"room", data:{roomId, event}}`; the
//! account unwraps the envelope and forwards `event` here.

use super::super::RoomActor;
use crate::error::RoomError;
use presence_proto::{Event, Identity, kinds};
use serde_json::{Value, json};
use tracing::{debug, warn};

impl RoomActor {
    pub(crate) async fn handle_client_event(&mut self, account_id: &str, event: Event) {
        if !self.participants.contains_key(account_id) {
            warn!(room_id = %self.id, account_id = %account_id, kind = %event.kind, "Room event from non-participant");
            return;
        }

        match event.kind() {
            kinds::INITIALIZE => self.send_snapshot(account_id),
            kinds::PERSIST => self.handle_persist_request(account_id, &event.data).await,
            kinds::IDENTITY => match event.payload::<Identity>() {
                Ok(identity) => self.set_identity(account_id, identity),
                Err(e) => debug!(room_id = %self.id, error = %e, "Malformed identity"),
            },
            kinds::DISCONNECT => self.handle_disconnect(account_id).await,
            kinds::LEAVE => self.handle_leave(account_id).await,
            kinds::LIVE_JOIN => self.handle_live_join(account_id),
            kinds::LIVE_LEAVE => self.handle_live_leave(account_id),
            kinds::CHAT => self.handle_chat(account_id, &event).await,
            kinds::SETTINGS => self.handle_settings(account_id, &event.data).await,
            kinds::INVITE => self.handle_invite(account_id, &event).await,
            kinds::WORKGROUP => self.handle_workgroup(account_id, &event).await,
            other => debug!(room_id = %self.id, kind = %other, "Unknown room event"),
        }
    }

    async fn handle_persist_request(&mut self, account_id: &str, data: &Value) {
        if !self.is_privileged(account_id) {
            self.send_to(account_id, RoomError::NotAuthorized.to_event());
            return;
        }
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| data.as_str())
            .unwrap_or_default()
            .to_string();
        self.handle_persist(&name).await;
    }

    pub(crate) fn set_identity(&mut self, account_id: &str, identity: Identity) {
        if identity.client_id != account_id {
            warn!(room_id = %self.id, account_id = %account_id, claimed = %identity.client_id, "Identity for another participant");
            return;
        }
        if let Some(p) = self.participants.get_mut(account_id) {
            p.name = identity.name.clone();
            if let Some(avatar) = &identity.avatar {
                p.avatar = avatar.clone();
            }
        }
        let data = json!({ "userId": account_id, "identity": identity });
        self.identities.insert(account_id.to_string(), identity);
        self.broadcast(&Event::new(kinds::IDENTITY, data), None);
    }

    fn handle_live_join(&mut self, account_id: &str) {
        if !self.online.iter().any(|id| id == account_id) {
            return;
        }
        if self.live.add(account_id) {
            self.broadcast_live();
        }
    }

    fn handle_live_leave(&mut self, account_id: &str) {
        if self.live.remove(account_id) {
            self.broadcast_live();
        }
    }

    pub(crate) fn broadcast_live(&self) {
        self.broadcast(
            &Event::new(kinds::LIVE, json!({ "peers": self.live.ids() })),
            None,
        );
    }
}
