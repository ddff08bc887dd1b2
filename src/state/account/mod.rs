//! Per-account controller.
//!
//! An [`AccountActor`] runs one task per logged-in account. It reads the
//! session's inbound events, commands from the hub and deliveries from the
//! rooms it is bound to, and owns the account's room bindings and contact
//! list. Nothing else touches that state.
//!
//! ```text
//!   Session ──► events ──┐
//!   Hub ──► commands ────┼──► AccountActor ──► RoomRegistry / RoomHandle
//!   Rooms ──► deliveries ┘         │
//!                                  └──► Session::send ──► connections
//! ```
//!
//! Startup is best-effort: room memberships, relations and workgroup
//! contacts are loaded in that order and a failing step is logged and
//! skipped.

mod contacts;
mod handlers;

pub use contacts::{Contact, ContactBook};

use crate::identity::IdentityCache;
use crate::rooms::{MemberProfile, RoomBinding, RoomDelivery, RoomRegistry};
use crate::state::session::{Session, SessionEvent};
use crate::state::uid::{AccountId, SessionId};
use crate::store::{RoomMembership, Store};
use crate::telemetry;
use crate::workgroups::WorkgroupIndex;
use futures_util::future::join_all;
use presence_proto::{Event, Identity, kinds};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

const COMMAND_CAPACITY: usize = 64;
const DELIVERY_CAPACITY: usize = 512;

/// Who the account is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    pub account_id: AccountId,
    pub login: String,
    pub name: String,
    pub avatar: Option<String>,
    pub admin: bool,
    pub guest: bool,
    /// The room a guest was invited to.
    pub guest_room: Option<String>,
}

impl AccountProfile {
    /// What rooms get to know about this account.
    pub fn member(&self) -> MemberProfile {
        MemberProfile {
            account_id: self.account_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            admin: self.admin,
            guest: self.guest,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            client_id: self.account_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            email: None,
        }
    }
}

/// Collaborators shared by every account.
#[derive(Clone)]
pub struct AccountContext {
    pub store: Arc<dyn Store>,
    pub identities: Arc<IdentityCache>,
    pub workgroups: Arc<WorkgroupIndex>,
    pub rooms: Arc<RoomRegistry>,
    /// Told the session id once the account has shut down.
    pub teardown: mpsc::UnboundedSender<SessionId>,
}

/// Requests from the hub.
#[derive(Debug)]
pub enum AccountCommand {
    /// A workgroup this account belongs to was assigned to a room.
    WorkgroupJoin { room_id: String },
    /// A contact opened the 1:1 chat.
    ContactJoin { contact_id: AccountId },
    ContactAdd { contact_id: AccountId },
    ContactRemove { contact_id: AccountId },
    Inspect { reply_tx: oneshot::Sender<AccountState> },
}

/// Point-in-time view of an account, for bookkeeping and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub account_id: AccountId,
    /// Client room ids, sorted.
    pub rooms: Vec<String>,
    /// Contact ids in insertion order.
    pub contacts: Vec<AccountId>,
}

/// Handle to a running account.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    account_id: AccountId,
    session_id: SessionId,
    tx: mpsc::Sender<AccountCommand>,
    cancel: CancellationToken,
}

impl AccountHandle {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue a command without waiting. Returns `false` if the account is
    /// gone or saturated.
    pub fn notify(&self, command: AccountCommand) -> bool {
        self.tx.try_send(command).is_ok()
    }

    pub async fn state(&self) -> Option<AccountState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AccountCommand::Inspect { reply_tx })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Stop dispatching and shut the account down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle with no task behind it; commands land in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(
        account_id: &str,
        session_id: &str,
    ) -> (Self, mpsc::Receiver<AccountCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = Self {
            account_id: account_id.to_string(),
            session_id: session_id.to_string(),
            tx,
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct AccountActor {
    profile: AccountProfile,
    session: Arc<Session>,
    ctx: AccountContext,
    // keyed by the id the client knows the room by
    rooms: HashMap<String, RoomBinding>,
    contacts: ContactBook,
    deliver_tx: mpsc::Sender<RoomDelivery>,
    cancel: CancellationToken,
    closing: bool,
}

impl AccountActor {
    /// Spawn the account task for an open session.
    pub fn spawn(
        profile: AccountProfile,
        session: Arc<Session>,
        events: mpsc::Receiver<SessionEvent>,
        ctx: AccountContext,
    ) -> AccountHandle {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (deliver_tx, deliveries) = mpsc::channel(DELIVERY_CAPACITY);
        let cancel = CancellationToken::new();
        let account_id = profile.account_id.clone();
        let session_id = session.id().to_string();

        let actor = AccountActor {
            contacts: ContactBook::new(account_id.clone()),
            profile,
            session,
            ctx,
            rooms: HashMap::new(),
            deliver_tx,
            cancel: cancel.clone(),
            closing: false,
        };
        let span = telemetry::account_span(&account_id);
        tokio::spawn(actor.run(commands, deliveries, events).instrument(span));

        AccountHandle {
            account_id,
            session_id,
            tx,
            cancel,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<AccountCommand>,
        mut deliveries: mpsc::Receiver<RoomDelivery>,
        mut events: mpsc::Receiver<SessionEvent>,
    ) {
        let cancel = self.cancel.clone();
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            started = self.start() => started,
        };

        if started {
            while !self.closing {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(command) = commands.recv() => self.handle_command(command).await,
                    Some(delivery) = deliveries.recv() => self.handle_delivery(delivery),
                    event = events.recv() => match event {
                        Some(event) => self.handle_session_event(event).await,
                        None => break,
                    },
                }
            }
        }

        self.shutdown().await;
    }

    /// Load startup state. Returns `false` when the account cannot come up.
    async fn start(&mut self) -> bool {
        if self.profile.guest {
            return self.join_guest_room().await;
        }
        self.load_rooms().await;
        self.load_relations().await;
        self.load_contacts().await;
        info!(
            rooms = self.rooms.len(),
            contacts = self.contacts.len(),
            "Account loaded"
        );
        true
    }

    async fn join_guest_room(&mut self) -> bool {
        let Some(room_id) = self.profile.guest_room.clone() else {
            warn!("Guest account without a room");
            return false;
        };
        let member = self.profile.member();
        match self
            .ctx
            .rooms
            .guest_join_room(&member, &room_id, self.deliver_tx.clone())
            .await
        {
            Ok(binding) => {
                self.joined(binding);
                true
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Guest could not join");
                self.session.send(&e.to_event());
                false
            }
        }
    }

    async fn load_rooms(&mut self) {
        let account_id = self.profile.account_id.clone();
        let worgs = self.ctx.workgroups.get_member_of_list(&account_id);
        let memberships = match self
            .ctx
            .store
            .get_rooms_for_account(&account_id, &worgs)
            .await
        {
            Ok(memberships) => memberships,
            Err(e) => {
                warn!(error = %e, "Failed to load room list");
                return;
            }
        };

        let member = self.profile.member();
        let rooms = &self.ctx.rooms;
        let deliver = &self.deliver_tx;
        let results = join_all(memberships.iter().map(|m: &RoomMembership| {
            let member = &member;
            async move {
                if m.via_workgroup {
                    rooms
                        .connect_workgroup(member, &m.room_id, deliver.clone())
                        .await
                } else {
                    rooms.connect(member, &m.room_id, deliver.clone()).await
                }
            }
        }))
        .await;

        for (membership, result) in memberships.iter().zip(results) {
            match result {
                Ok(binding) => self.joined(binding),
                Err(e) => {
                    warn!(room_id = %membership.room_id, error = %e, "Failed to connect to room")
                }
            }
        }
    }

    async fn load_relations(&mut self) {
        let account_id = self.profile.account_id.clone();
        let relations = match self.ctx.store.get_relations_for(&account_id).await {
            Ok(relations) => relations,
            Err(e) => {
                warn!(error = %e, "Failed to load relations");
                return;
            }
        };

        let mut counterparts = Vec::with_capacity(relations.len());
        for relation in &relations {
            let Some(other) = relation.other(&account_id) else {
                continue;
            };
            let state = match self
                .ctx
                .store
                .relation_state(&relation.client_id, &account_id)
                .await
            {
                Ok(state) => Some(state),
                Err(e) => {
                    debug!(relation_id = %relation.client_id, error = %e, "No relation state");
                    None
                }
            };
            self.contacts.set_relation(other, state);
            counterparts.push(other.to_string());
        }

        let missing = self.contacts.missing(&counterparts);
        for identity in self.ctx.identities.get_list(&missing).await {
            self.add_contact(identity);
        }

        // rooms someone already has open come back up on this side too
        for relation in &relations {
            let (Some(other), Some(room_id)) = (relation.other(&account_id), &relation.room_id)
            else {
                continue;
            };
            if !self.ctx.rooms.is_active(room_id) {
                continue;
            }
            let other = other.to_string();
            if let Err(e) = self.open_contact_chat(&other, false).await {
                warn!(contact_id = %other, error = %e, "Failed to reopen contact chat");
            }
        }
    }

    async fn load_contacts(&mut self) {
        let ids = self
            .ctx
            .workgroups
            .get_contact_list(&self.profile.account_id, None);
        let missing = self.contacts.missing(&ids);
        for identity in self.ctx.identities.get_list(&missing).await {
            self.add_contact(identity);
        }
    }

    /// Record a new binding and tell the clients.
    fn joined(&mut self, binding: RoomBinding) {
        let joined = json!({
            "clientId": binding.client_room_id,
            "persistent": binding.persistent,
            "name": binding.name,
            "isPrivate": binding.is_private,
        });
        self.session.send(&Event::new(kinds::JOIN, joined));
        debug!(room_id = %binding.room_id, client_room_id = %binding.client_room_id, "Joined room");
        self.rooms.insert(binding.client_room_id.clone(), binding);
    }

    fn add_contact(&mut self, identity: Identity) {
        if let Some(contact) = self.contacts.add(identity) {
            let event = Event::new(kinds::CONTACT_ADD, json!(contact));
            self.session.send(&event);
        }
    }

    fn remove_contact(&mut self, contact_id: &str) {
        if self.contacts.remove(contact_id) {
            self.session.send(&Event::new(kinds::CONTACT_REMOVE, json!(contact_id)));
        }
    }

    async fn handle_command(&mut self, command: AccountCommand) {
        match command {
            AccountCommand::WorkgroupJoin { room_id } => self.handle_workgroup_join(&room_id).await,
            AccountCommand::ContactJoin { contact_id } => {
                if let Err(e) = self.open_contact_chat(&contact_id, false).await {
                    warn!(contact_id = %contact_id, error = %e, "Failed to join contact chat");
                }
            }
            AccountCommand::ContactAdd { contact_id } => {
                if self.contacts.contains(&contact_id) {
                    return;
                }
                match self.ctx.identities.get(&contact_id).await {
                    Some(identity) => self.add_contact(identity),
                    None => debug!(contact_id = %contact_id, "No identity for new contact"),
                }
            }
            AccountCommand::ContactRemove { contact_id } => {
                let still_visible = self
                    .ctx
                    .workgroups
                    .get_contact_list(&self.profile.account_id, None)
                    .contains(&contact_id);
                if !still_visible {
                    self.remove_contact(&contact_id);
                }
            }
            AccountCommand::Inspect { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }
        }
    }

    async fn handle_workgroup_join(&mut self, room_id: &str) {
        if self.rooms.values().any(|b| b.room_id == room_id) {
            return;
        }
        let member = self.profile.member();
        match self
            .ctx
            .rooms
            .connect_workgroup(&member, room_id, self.deliver_tx.clone())
            .await
        {
            Ok(binding) => self.joined(binding),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to join workgroup room"),
        }
    }

    fn handle_delivery(&mut self, delivery: RoomDelivery) {
        match delivery {
            RoomDelivery::Event { room_id, event } => {
                self.session.send(&room_envelope(&room_id, &event));
            }
            RoomDelivery::Released { room_id } => {
                let Some(binding) = self.rooms.remove(&room_id) else {
                    return;
                };
                debug!(room_id = %binding.room_id, "Room released");
                if binding.contact || self.contacts.contains(&room_id) {
                    return;
                }
                self.session.send(&Event::new(kinds::CLOSE, json!(room_id)));
            }
        }
    }

    fn snapshot(&self) -> AccountState {
        let mut rooms: Vec<String> = self.rooms.keys().cloned().collect();
        rooms.sort();
        AccountState {
            account_id: self.profile.account_id.clone(),
            rooms,
            contacts: self.contacts.ids().to_vec(),
        }
    }

    async fn shutdown(&mut self) {
        let account_id = self.profile.account_id.clone();
        let bindings: Vec<RoomBinding> = self.rooms.drain().map(|(_, b)| b).collect();
        let deliver = &self.deliver_tx;
        join_all(bindings.iter().map(|binding| {
            let account_id = &account_id;
            async move {
                if let Err(e) = binding.handle.disconnect_link(account_id, deliver).await {
                    debug!(room_id = %binding.room_id, error = %e, "Room gone before disconnect");
                }
            }
        }))
        .await;

        self.session.close();
        let _ = self.ctx.teardown.send(self.session.id().to_string());
        info!(rooms = bindings.len(), "Account closed");
    }
}

/// `{type:"room", data:{roomId, event}}`
pub(crate) fn room_envelope(room_id: &str, event: &Event) -> Event {
    Event::new(kinds::ROOM, json!({ "roomId": room_id, "event": event }))
}
