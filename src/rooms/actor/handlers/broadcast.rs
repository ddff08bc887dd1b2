//! Delivery to bound participants.

use super::super::{Participant, RoomActor, RoomDelivery};
use presence_proto::Event;
use serde_json::{Value, json};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

impl RoomActor {
    /// Send to one participant. Unbound participants are skipped.
    pub(crate) fn send_to(&self, account_id: &str, event: Event) -> bool {
        let Some(link) = self
            .participants
            .get(account_id)
            .and_then(|p| p.link.as_ref())
        else {
            return false;
        };
        let delivery = RoomDelivery::Event {
            room_id: link.client_room_id.clone(),
            event,
        };
        match link.deliver.try_send(delivery) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %self.id, account_id = %account_id, "Delivery queue full, dropping room event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Send to every online participant except `exclude`.
    pub(crate) fn broadcast(&self, event: &Event, exclude: Option<&str>) {
        for account_id in &self.online {
            if exclude == Some(account_id.as_str()) {
                continue;
            }
            if !self.participants.contains_key(account_id) {
                error!(room_id = %self.id, account_id = %account_id, "Online id without participant entry");
                debug_assert!(false, "online id without participant entry");
                continue;
            }
            self.send_to(account_id, event.clone());
        }
    }

    /// Assigned workgroups the participant belongs to, or `null` for
    /// contact rooms.
    pub(crate) fn member_workgroups(&self, account_id: &str) -> Value {
        if self.kind.is_contact() {
            return Value::Null;
        }
        let ids: Vec<&String> = self
            .workgroups
            .iter()
            .filter(|w| self.ctx.workgroups.is_member(account_id, w))
            .collect();
        json!(ids)
    }

    pub(crate) fn participant_json(&self, p: &Participant) -> Value {
        json!({
            "clientId": p.account_id,
            "name": p.name,
            "avatar": p.avatar,
            "owner": p.account_id == self.owner_id,
            "admin": p.admin,
            "authed": p.authed,
            "guest": p.guest,
            "workgroups": self.member_workgroups(&p.account_id),
        })
    }
}
