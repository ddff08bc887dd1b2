//! Authorization grants and persistence promotion.
//!
//! Grants are persisted first and mirrored in memory only once the store
//! accepted them. Revocation is the exception on the in-memory side: the
//! participant's authed flag drops even if the store refused, while the id
//! stays in the authorized list until a revoke actually succeeds.

use super::super::RoomActor;
use crate::error::{RoomError, RoomResult};
use crate::state::uid::{self, AccountId};
use presence_proto::{Event, kinds};
use serde_json::json;
use tracing::{info, warn};

impl RoomActor {
    pub(crate) async fn authorize_user(&mut self, account_id: &str) -> RoomResult<()> {
        if self.authorized.iter().any(|id| id == account_id) {
            return Ok(());
        }
        let guest = uid::has_prefix(account_id, uid::GUEST)
            || self.participants.get(account_id).is_some_and(|p| p.guest);
        if guest {
            return Err(RoomError::NotAuthorized);
        }

        if self.persistent {
            self.ctx
                .store
                .authorize(&self.id, &[account_id.to_string()])
                .await
                .inspect_err(|e| {
                    warn!(room_id = %self.id, account_id = %account_id, error = %e, "Failed to persist authorization");
                })?;
        }
        self.authorized.push(account_id.to_string());
        if let Some(p) = self.participants.get_mut(account_id) {
            p.authed = true;
        }
        Ok(())
    }

    pub(crate) async fn revoke_authorization(&mut self, account_id: &str) -> RoomResult<()> {
        if let Some(p) = self.participants.get_mut(account_id) {
            p.authed = false;
        }
        if self.persistent {
            if let Err(e) = self.ctx.store.revoke(&self.id, account_id).await {
                warn!(room_id = %self.id, account_id = %account_id, error = %e, "Failed to revoke authorization, local grant kept");
                return Err(e.into());
            }
        }
        self.authorized.retain(|id| id != account_id);
        Ok(())
    }

    /// Promote an ephemeral room. Returns `false` if nothing changed.
    pub(crate) async fn handle_persist(&mut self, name: &str) -> bool {
        let name = name.trim();
        if self.persistent || name.is_empty() {
            return false;
        }

        let previous = self.name.replace(name.to_string());
        self.persistent = true;
        if let Err(e) = self
            .ctx
            .store
            .set_room(&self.id, name, &self.owner_id, self.is_private)
            .await
        {
            warn!(room_id = %self.id, error = %e, "Failed to persist room");
            self.persistent = false;
            self.name = previous;
            return false;
        }

        let members: Vec<AccountId> = self
            .participants
            .values()
            .filter(|p| !p.guest)
            .map(|p| p.account_id.clone())
            .collect();
        if !members.is_empty() {
            match self.ctx.store.authorize(&self.id, &members).await {
                Ok(()) => {
                    for account_id in members {
                        if let Some(p) = self.participants.get_mut(&account_id) {
                            p.authed = true;
                        }
                        if !self.authorized.contains(&account_id) {
                            self.authorized.push(account_id);
                        }
                    }
                }
                Err(e) => {
                    warn!(room_id = %self.id, error = %e, "Failed to persist authorizations on promotion");
                }
            }
        }

        for worg_id in self.workgroups.clone() {
            if let Err(e) = self
                .ctx
                .store
                .assign_workgroup(&self.id, &worg_id, &self.owner_id)
                .await
            {
                warn!(room_id = %self.id, worg_id = %worg_id, error = %e, "Failed to persist workgroup assignment");
            }
        }

        info!(room_id = %self.id, name = %name, "Room promoted to persistent");
        self.broadcast(
            &Event::new(
                kinds::PERSISTENT,
                json!({ "persistent": true, "name": name }),
            ),
            None,
        );
        true
    }
}
