//! Invite tokens.
//!
//! Ephemeral rooms keep tokens in their [`InviteBook`](crate::rooms::invites::InviteBook);
//! persistent rooms write them to the invite store so a cold room can still
//! admit a guest through the registry.

use super::super::RoomActor;
use crate::error::RoomError;
use crate::rooms::invites::new_token;
use presence_proto::{Event, kinds};
use serde_json::{Value, json};
use tracing::{debug, warn};

const CREATE: &str = "create";
const REVOKE: &str = "revoke";
const TOKEN: &str = "token";
const REVOKED: &str = "revoked";

impl RoomActor {
    pub(crate) async fn handle_invite(&mut self, account_id: &str, event: &Event) {
        if self.kind.is_contact() {
            return;
        }
        let inner = match event.inner() {
            Ok(inner) => inner,
            Err(e) => {
                debug!(room_id = %self.id, error = %e, "Malformed invite event");
                return;
            }
        };

        let may_invite = self.is_privileged(account_id)
            || self.participants.get(account_id).is_some_and(|p| p.authed);
        if !may_invite {
            self.send_to(account_id, RoomError::NotAuthorized.to_event());
            return;
        }

        match inner.kind() {
            CREATE => {
                let single_use = inner
                    .data
                    .get("singleUse")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let token = if self.persistent {
                    let token = new_token();
                    if let Err(e) = self
                        .ctx
                        .store
                        .create_invite(&token, &self.id, single_use, account_id)
                        .await
                    {
                        warn!(room_id = %self.id, error = %e, "Failed to store invite");
                        self.send_to(account_id, RoomError::from(e).to_event());
                        return;
                    }
                    token
                } else {
                    self.invites.mint(single_use, account_id)
                };
                debug!(room_id = %self.id, account_id = %account_id, single_use, "Invite minted");
                let data = json!({
                    "type": TOKEN,
                    "data": { "token": token, "roomId": self.id, "singleUse": single_use },
                });
                self.send_to(account_id, Event::new(kinds::INVITE, data));
            }
            REVOKE => {
                let Some(token) = inner.data.as_str() else {
                    return;
                };
                if !self.invites.revoke(token) && self.persistent {
                    if let Err(e) = self.ctx.store.invalidate_invite(token).await {
                        warn!(room_id = %self.id, error = %e, "Failed to invalidate invite");
                        return;
                    }
                }
                let data = json!({ "type": REVOKED, "data": token });
                self.send_to(account_id, Event::new(kinds::INVITE, data));
            }
            other => debug!(room_id = %self.id, kind = %other, "Unknown invite event"),
        }
    }

    /// Check a token against this room, consuming single-use tokens.
    pub(crate) async fn authenticate_invite(&mut self, token: &str) -> bool {
        if self.invites.redeem(token) {
            return true;
        }
        if !self.persistent {
            return false;
        }
        match self.ctx.store.check_invite(token, &self.id).await {
            Ok(Some(invite)) if invite.is_valid => {
                if invite.single_use {
                    if let Err(e) = self.ctx.store.invalidate_invite(token).await {
                        warn!(room_id = %self.id, error = %e, "Failed to consume single-use invite");
                    }
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(room_id = %self.id, error = %e, "Invite lookup failed");
                false
            }
        }
    }
}
