//! Workgroup assignment.
//!
//! Assigning a workgroup lets every member connect without an individual
//! grant; the registry is told so it can invite the members' accounts.

use super::super::{RoomActor, RoomNotice};
use crate::error::RoomError;
use crate::state::uid::AccountId;
use presence_proto::{ErrorCode, Event, kinds};
use serde_json::json;
use tracing::{debug, info, warn};

const ASSIGN: &str = "assign";
const DISMISS: &str = "dismiss";
const ASSIGNED: &str = "assigned";
const DISMISSED: &str = "dismissed";

impl RoomActor {
    pub(crate) async fn handle_workgroup(&mut self, account_id: &str, event: &Event) {
        if self.kind.is_contact() {
            return;
        }
        let inner = match event.inner() {
            Ok(inner) => inner,
            Err(e) => {
                debug!(room_id = %self.id, error = %e, "Malformed workgroup event");
                return;
            }
        };
        if !self.is_privileged(account_id) {
            self.send_to(account_id, RoomError::NotAuthorized.to_event());
            return;
        }
        let Some(worg_id) = inner.data.as_str().map(str::to_string) else {
            return;
        };

        match inner.kind() {
            ASSIGN => self.assign_workgroup(account_id, &worg_id).await,
            DISMISS => self.dismiss_workgroup(&worg_id).await,
            other => debug!(room_id = %self.id, kind = %other, "Unknown workgroup event"),
        }
    }

    async fn assign_workgroup(&mut self, account_id: &str, worg_id: &str) {
        let Some(workgroup) = self.ctx.workgroups.get(worg_id) else {
            self.send_to(
                account_id,
                Event::error(ErrorCode::UnknownEvent, Some(json!(worg_id))),
            );
            return;
        };
        if self.workgroups.iter().any(|w| w == worg_id) {
            return;
        }
        if self.persistent {
            if let Err(e) = self
                .ctx
                .store
                .assign_workgroup(&self.id, worg_id, account_id)
                .await
            {
                warn!(room_id = %self.id, worg_id = %worg_id, error = %e, "Failed to store workgroup assignment");
                self.send_to(account_id, RoomError::from(e).to_event());
                return;
            }
        }

        self.workgroups.push(worg_id.to_string());
        info!(room_id = %self.id, worg_id = %worg_id, "Workgroup assigned");
        self.broadcast(
            &Event::new(
                kinds::WORKGROUP,
                json!({ "type": ASSIGNED, "data": workgroup }),
            ),
            None,
        );
        let _ = self.ctx.notices.send(RoomNotice::WorkgroupAssigned {
            room_id: self.id.clone(),
            worg_id: worg_id.to_string(),
        });
    }

    async fn dismiss_workgroup(&mut self, worg_id: &str) {
        if !self.workgroups.iter().any(|w| w == worg_id) {
            return;
        }
        if self.persistent {
            if let Err(e) = self.ctx.store.dismiss_workgroup(&self.id, worg_id).await {
                warn!(room_id = %self.id, worg_id = %worg_id, error = %e, "Failed to store workgroup dismissal");
            }
        }
        self.workgroups.retain(|w| w != worg_id);
        info!(room_id = %self.id, worg_id = %worg_id, "Workgroup dismissed");
        self.broadcast(
            &Event::new(
                kinds::WORKGROUP,
                json!({ "type": DISMISSED, "data": worg_id }),
            ),
            None,
        );

        // participants who were only here through that workgroup
        let index = &self.ctx.workgroups;
        let stranded: Vec<AccountId> = self
            .participants
            .values()
            .filter(|p| !p.guest && !p.authed)
            .filter(|p| !self.authorized.contains(&p.account_id))
            .filter(|p| index.is_member(&p.account_id, worg_id))
            .filter(|p| !index.is_member_of_any(&p.account_id, &self.workgroups))
            .map(|p| p.account_id.clone())
            .collect();
        for account_id in stranded {
            self.remove_user(&account_id).await;
        }
    }
}
