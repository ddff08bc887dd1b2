//! Participant membership and presence.
//!
//! - `add_user`: participant entry plus `join` announce
//! - `connect` / `release`: bind and unbind a live delivery channel
//! - `disconnect`: go offline if authorized, otherwise leave entirely
//! - `leave`: give up authorization, staying only through a workgroup

use super::super::{
    ConnectRequest, Link, MemberProfile, Participant, RoomActor, RoomBinding, RoomDelivery,
};
use crate::error::{RoomError, RoomResult};
use crate::rooms::policy::{ContactPolicy, RoomKind};
use crate::store::RelationRecord;
use presence_proto::{Event, Identity, kinds};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

impl RoomActor {
    pub(crate) async fn handle_add_user(&mut self, profile: MemberProfile) {
        if self.participants.contains_key(&profile.account_id) {
            return;
        }
        if self
            .kind
            .contact()
            .is_some_and(|policy| !policy.is_member(&profile.account_id))
        {
            warn!(room_id = %self.id, account_id = %profile.account_id, "Refusing third participant in contact room");
            return;
        }

        let avatar = self.resolve_avatar(&profile).await;
        let participant = Participant {
            account_id: profile.account_id.clone(),
            name: profile.name.clone(),
            avatar: avatar.clone(),
            admin: profile.admin,
            guest: profile.guest,
            // ephemeral rooms trust everyone who made it in
            authed: !profile.guest && !self.persistent,
            link: None,
        };
        let announce = self.participant_json(&participant);
        self.identities.insert(
            profile.account_id.clone(),
            Identity {
                client_id: profile.account_id.clone(),
                name: profile.name,
                avatar: Some(avatar),
                email: None,
            },
        );
        self.participants
            .insert(profile.account_id.clone(), participant);

        if self.kind.announces_presence() {
            self.broadcast(
                &Event::new(kinds::JOIN, announce),
                Some(profile.account_id.as_str()),
            );
        }
        debug!(room_id = %self.id, account_id = %profile.account_id, guest = profile.guest, "Participant added");
    }

    /// Provided avatar, then the cached identity, then a generated default.
    async fn resolve_avatar(&self, profile: &MemberProfile) -> String {
        if let Some(avatar) = &profile.avatar {
            return avatar.clone();
        }
        if profile.guest {
            return self.ctx.guest_avatar.clone();
        }
        if let Some(avatar) = self
            .ctx
            .identities
            .get(&profile.account_id)
            .await
            .and_then(|i| i.avatar)
        {
            return avatar;
        }
        self.ctx
            .identities
            .default_avatar(&profile.name)
            .await
            .unwrap_or_default()
    }

    pub(crate) fn handle_connect(&mut self, request: ConnectRequest) -> RoomResult<RoomBinding> {
        let account_id = request.account_id;
        let client_room_id = self.kind.client_room_id(&self.id, &account_id);
        let Some(participant) = self.participants.get_mut(&account_id) else {
            warn!(room_id = %self.id, account_id = %account_id, "Connect from non-participant");
            return Err(RoomError::NotInRoom);
        };

        if let Some(link) = participant.link.as_mut() {
            if !link.deliver.same_channel(&request.deliver) {
                // a new account instance took over before the old one let go
                link.deliver = request.deliver;
                participant.authed |= request.authed;
                participant.admin |= request.admin;
                debug!(room_id = %self.id, account_id = %account_id, "Participant rebound");
            }
        } else {
            participant.link = Some(Link {
                deliver: request.deliver,
                client_room_id: client_room_id.clone(),
            });
            participant.authed |= request.authed;
            participant.admin |= request.admin;
            let (admin, authed) = (participant.admin, participant.authed);
            let online = json!({
                "clientId": account_id,
                "admin": admin,
                "authed": authed,
                "workgroups": self.member_workgroups(&account_id),
            });
            self.online.push(account_id.clone());
            self.empty_deadline = None;
            if self.kind.announces_presence() {
                self.broadcast(&Event::new(kinds::ONLINE, online), None);
            }
            debug!(room_id = %self.id, account_id = %account_id, online = self.online.len(), "Participant bound");
        }

        Ok(self.binding_for(&account_id, client_room_id))
    }

    fn binding_for(&self, account_id: &str, client_room_id: String) -> RoomBinding {
        let name = match self.kind.contact() {
            Some(policy) => policy
                .other(account_id)
                .and_then(|other| self.participants.get(other))
                .map(|p| p.name.clone()),
            None => self.name.clone(),
        };
        RoomBinding {
            room_id: self.id.clone(),
            client_room_id,
            name,
            persistent: self.persistent,
            is_private: self.is_private,
            contact: self.kind.is_contact(),
            handle: self.handle.clone(),
        }
    }

    /// Whether `deliver` names the participant's live binding. `None` always
    /// matches.
    pub(crate) fn is_current_link(
        &self,
        account_id: &str,
        deliver: Option<&mpsc::Sender<RoomDelivery>>,
    ) -> bool {
        let Some(deliver) = deliver else {
            return true;
        };
        match self.participants.get(account_id).and_then(|p| p.link.as_ref()) {
            Some(link) => link.deliver.same_channel(deliver),
            None => true,
        }
    }

    pub(crate) async fn handle_disconnect(&mut self, account_id: &str) {
        if !self.participants.contains_key(account_id) {
            return;
        }
        let keep = self.kind.is_contact() || self.authorized.iter().any(|id| id == account_id);
        if keep {
            self.release(account_id);
        } else {
            self.remove_user(account_id).await;
        }
    }

    /// Drop the live binding, keeping the participant entry.
    pub(crate) fn release(&mut self, account_id: &str) {
        let Some(link) = self
            .participants
            .get_mut(account_id)
            .and_then(|p| p.link.take())
        else {
            return;
        };
        self.online.retain(|id| id != account_id);
        if self.live.remove(account_id) {
            self.broadcast_live();
        }
        if self.kind.announces_presence() {
            self.broadcast(&Event::new(kinds::OFFLINE, json!(account_id)), None);
        }
        let _ = link.deliver.try_send(RoomDelivery::Released {
            room_id: link.client_room_id,
        });
        debug!(room_id = %self.id, account_id = %account_id, online = self.online.len(), "Participant released");
        self.check_online();
    }

    /// Remove a participant entirely, authorization included.
    pub(crate) async fn remove_user(&mut self, account_id: &str) {
        self.release(account_id);
        if self.participants.remove(account_id).is_none() {
            return;
        }
        self.identities.remove(account_id);
        if self.authorized.iter().any(|id| id == account_id) {
            let _ = self.revoke_authorization(account_id).await;
        }
        if self.kind.announces_presence() {
            self.broadcast(&Event::new(kinds::LEAVE, json!(account_id)), None);
        }
        debug!(room_id = %self.id, account_id = %account_id, "Participant removed");
    }

    pub(crate) async fn handle_leave(&mut self, account_id: &str) {
        if self.kind.is_contact() {
            self.release(account_id);
            return;
        }

        let authorized = if self.persistent {
            match self
                .ctx
                .store
                .check_authorized(&self.id, account_id)
                .await
            {
                Ok(authorized) => authorized,
                Err(e) => {
                    warn!(room_id = %self.id, account_id = %account_id, error = %e, "Authorization check failed, removing");
                    self.remove_user(account_id).await;
                    return;
                }
            }
        } else {
            self.authorized.iter().any(|id| id == account_id)
        };

        if authorized {
            let _ = self.revoke_authorization(account_id).await;
        } else if let Some(p) = self.participants.get_mut(account_id) {
            p.authed = false;
        }

        let via = self
            .workgroups
            .iter()
            .find(|w| self.ctx.workgroups.is_member(account_id, w))
            .cloned();
        match via {
            Some(worg_id) => self.broadcast(
                &Event::new(
                    kinds::AUTHED,
                    json!({ "userId": account_id, "worgId": worg_id, "authed": false }),
                ),
                None,
            ),
            None => self.remove_user(account_id).await,
        }
    }

    /// Attach the relation behind a contact room and make both accounts
    /// authorized participants.
    pub(crate) async fn handle_set_relation(&mut self, relation: RelationRecord) -> RoomResult<()> {
        let policy = ContactPolicy::from_relation(&relation);
        match &self.kind {
            RoomKind::Contact(current) if current.relation_id == policy.relation_id => {}
            _ => {
                warn!(room_id = %self.id, relation_id = %policy.relation_id, "Relation does not belong to this room");
                return Err(RoomError::NotAuthorized);
            }
        }

        let members = policy.members();
        let missing: Vec<String> = members
            .iter()
            .filter(|id| !self.authorized.contains(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.ctx
                .store
                .authorize(&self.id, &missing)
                .await
                .inspect_err(|e| {
                    warn!(room_id = %self.id, error = %e, "Failed to authorize contact pair");
                })?;
            self.authorized.extend(missing);
        }

        for account_id in members {
            if self.participants.contains_key(&account_id) {
                continue;
            }
            let identity = self.ctx.identities.get(&account_id).await;
            let (name, avatar) = match identity {
                Some(i) => (i.name, i.avatar.unwrap_or_default()),
                None => (account_id.clone(), String::new()),
            };
            self.identities.insert(
                account_id.clone(),
                Identity {
                    client_id: account_id.clone(),
                    name: name.clone(),
                    avatar: Some(avatar.clone()),
                    email: None,
                },
            );
            self.participants.insert(
                account_id.clone(),
                Participant {
                    account_id,
                    name,
                    avatar,
                    admin: false,
                    guest: false,
                    authed: true,
                    link: None,
                },
            );
        }
        Ok(())
    }
}
