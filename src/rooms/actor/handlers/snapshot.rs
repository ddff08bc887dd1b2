//! The `initialize` bootstrap payload.

use super::super::RoomActor;
use presence_proto::{Event, kinds};
use serde_json::{Map, Value, json};

impl RoomActor {
    pub(crate) fn send_snapshot(&self, account_id: &str) {
        let snapshot = self.build_snapshot(account_id);
        self.send_to(account_id, Event::new(kinds::INITIALIZE, snapshot));
    }

    /// Full room state as seen by `account_id`.
    pub(crate) fn build_snapshot(&self, account_id: &str) -> Value {
        let users: Map<String, Value> = self
            .participants
            .values()
            .map(|p| (p.account_id.clone(), self.participant_json(p)))
            .collect();
        let identities: Map<String, Value> = self
            .identities
            .iter()
            .map(|(id, identity)| (id.clone(), json!(identity)))
            .collect();

        let (id, name, settings, workgroups) = match self.kind.contact() {
            Some(policy) => {
                let other = policy.other(account_id).unwrap_or(&self.id);
                let name = self.participants.get(other).map(|p| p.name.clone());
                (other.to_string(), name, json!({}), Value::Null)
            }
            None => {
                let workgroups: Vec<Value> = self
                    .workgroups
                    .iter()
                    .map(|w| match self.ctx.workgroups.get(w) {
                        Some(workgroup) => json!(workgroup),
                        None => json!({ "clientId": w }),
                    })
                    .collect();
                (
                    self.id.clone(),
                    self.name.clone(),
                    self.settings.to_value(),
                    json!(workgroups),
                )
            }
        };

        json!({
            "id": id,
            "name": name,
            "ownerId": self.owner_id,
            "persistent": self.persistent,
            "isPrivate": self.is_private,
            "settings": settings,
            "guestAvatar": self.ctx.guest_avatar,
            "users": users,
            "online": self.online,
            "identities": identities,
            "peers": self.live.ids(),
            "workgroups": workgroups,
            "lastMessage": self.log.last(),
        })
    }
}
