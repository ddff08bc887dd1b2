//! Actor model for room state.
//!
//! Each live room is a [`RoomActor`] running on its own task. The actor owns
//! every piece of room state (participants, presence, authorization, chat
//! tail, invites, settings, live peers) and processes [`RoomCommand`]s one at
//! a time, so a broadcast is always emitted after the mutation it reports and
//! no observer can see a notification for state it cannot yet query.
//!
//! # Lifecycle
//!
//! `loading → open → (empty-pending) → closed`. [`RoomActor::open`] returns
//! only after a persistent room has loaded its authorizations and resolved
//! missing avatars. When the last online participant goes away a grace timer
//! starts; a reconnect cancels it, otherwise the room sends
//! [`RoomNotice::Empty`] and the registry evicts it.

use crate::error::RoomResult;
use crate::identity::IdentityCache;
use crate::rooms::chat::ChatLog;
use crate::rooms::invites::InviteBook;
use crate::rooms::live::LivePeers;
use crate::rooms::policy::RoomKind;
use crate::rooms::settings::RoomSettings;
use crate::rooms::RoomHandle;
use crate::state::uid::AccountId;
use crate::store::Store;
use crate::telemetry;
use crate::workgroups::WorkgroupIndex;
use futures_util::future::join_all;
use presence_proto::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{Instrument, debug, info, warn};

mod handlers;
mod types;

pub use types::*;

const COMMAND_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    Open,
    Closed,
}

/// Collaborators shared by every room.
#[derive(Clone)]
pub struct RoomContext {
    pub store: Arc<dyn Store>,
    pub identities: Arc<IdentityCache>,
    pub workgroups: Arc<WorkgroupIndex>,
    pub notices: mpsc::UnboundedSender<RoomNotice>,
    pub empty_timeout: Duration,
    pub guest_avatar: String,
    pub log_tail: usize,
}

/// A bound participant's delivery channel.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub deliver: mpsc::Sender<RoomDelivery>,
    pub client_room_id: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub account_id: AccountId,
    pub name: String,
    pub avatar: String,
    pub admin: bool,
    pub guest: bool,
    pub authed: bool,
    pub link: Option<Link>,
}

/// The room actor.
pub struct RoomActor {
    id: String,
    owner_id: String,
    name: Option<String>,
    is_private: bool,
    persistent: bool,
    kind: RoomKind,
    participants: HashMap<AccountId, Participant>,
    // bind order; always a subset of `participants`
    online: Vec<AccountId>,
    authorized: Vec<AccountId>,
    identities: HashMap<AccountId, Identity>,
    settings: RoomSettings,
    log: ChatLog,
    invites: InviteBook,
    live: LivePeers,
    workgroups: Vec<String>,
    empty_deadline: Option<Instant>,
    handle: RoomHandle,
    ctx: RoomContext,
    state: ActorState,
}

impl RoomActor {
    /// Load the room and spawn its task. Returning is the room's `open`
    /// signal; a persistent room whose authorizations cannot be read never
    /// opens.
    pub async fn open(
        config: RoomConfig,
        kind: RoomKind,
        ctx: RoomContext,
    ) -> RoomResult<RoomHandle> {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = RoomHandle::new(config.id.clone(), tx);
        let log = ChatLog::new(kind.log_key(&config.id), ctx.log_tail);

        let mut actor = Self {
            id: config.id,
            owner_id: config.owner_id,
            name: config.name,
            is_private: config.is_private,
            persistent: config.persistent,
            kind,
            participants: HashMap::new(),
            online: Vec::new(),
            authorized: Vec::new(),
            identities: HashMap::new(),
            settings: RoomSettings::new(),
            log,
            invites: InviteBook::new(),
            live: LivePeers::new(),
            workgroups: Vec::new(),
            empty_deadline: None,
            handle: handle.clone(),
            ctx,
            state: ActorState::Open,
        };

        if actor.persistent {
            actor.load().await?;
        }
        // a room nobody ever binds to must still be evicted
        actor.check_online();

        info!(
            room_id = %actor.id,
            persistent = actor.persistent,
            contact = actor.kind.is_contact(),
            participants = actor.participants.len(),
            "Room opened"
        );
        let span = telemetry::room_span(&actor.id);
        tokio::spawn(actor.run(rx).instrument(span));
        Ok(handle)
    }

    async fn load(&mut self) -> RoomResult<()> {
        let store = self.ctx.store.clone();
        let (authorizations, settings, workgroups, messages) = tokio::join!(
            store.load_authorizations(&self.id),
            store.get_settings(&self.id),
            store.get_assigned_workgroups(&self.id),
            store.last_messages(self.log.key(), self.ctx.log_tail),
        );

        let authorizations = authorizations.inspect_err(|e| {
            warn!(room_id = %self.id, error = %e, "Failed to load room authorizations");
        })?;

        match settings {
            Ok(map) => self.settings = RoomSettings::from_map(map),
            Err(e) => warn!(room_id = %self.id, error = %e, "Failed to load room settings"),
        }
        match workgroups {
            Ok(ids) if !self.kind.is_contact() => self.workgroups = ids,
            Ok(_) => {}
            Err(e) => warn!(room_id = %self.id, error = %e, "Failed to load assigned workgroups"),
        }
        match messages {
            Ok(messages) => self.log.load(messages),
            Err(e) => warn!(room_id = %self.id, error = %e, "Failed to load chat history"),
        }

        let identities = self.ctx.identities.clone();
        let resolved = join_all(authorizations.into_iter().map(|user| {
            let identities = &identities;
            async move {
                let avatar = match user.avatar.clone() {
                    Some(avatar) => Some(avatar),
                    None => identities.get(&user.client_id).await.and_then(|i| i.avatar),
                };
                (user, avatar)
            }
        }))
        .await;

        for (user, avatar) in resolved {
            let avatar = avatar.unwrap_or_default();
            self.identities.insert(
                user.client_id.clone(),
                Identity {
                    client_id: user.client_id.clone(),
                    name: user.name.clone(),
                    avatar: Some(avatar.clone()),
                    email: None,
                },
            );
            self.authorized.push(user.client_id.clone());
            self.participants.insert(
                user.client_id.clone(),
                Participant {
                    account_id: user.client_id,
                    name: user.name,
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

    /// The main actor loop.
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        loop {
            let deadline = self.empty_deadline;
            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_empty_timeout();
                }
            }
            debug_assert!(
                self.online.iter().all(|id| self.participants.contains_key(id)),
                "online list must be a subset of participants"
            );
            if self.state == ActorState::Closed {
                break;
            }
        }
        debug!(room_id = %self.id, "Room actor stopped");
    }

    async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::AddUser { profile, reply_tx } => {
                self.handle_add_user(profile).await;
                let _ = reply_tx.send(());
            }
            RoomCommand::Connect { request, reply_tx } => {
                let _ = reply_tx.send(self.handle_connect(request));
            }
            RoomCommand::Disconnect {
                account_id,
                deliver,
                reply_tx,
            } => {
                if self.is_current_link(&account_id, deliver.as_ref()) {
                    self.handle_disconnect(&account_id).await;
                } else {
                    debug!(room_id = %self.id, account_id = %account_id, "Stale disconnect ignored");
                }
                if let Some(tx) = reply_tx {
                    let _ = tx.send(());
                }
            }
            RoomCommand::Authorize {
                account_id,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.authorize_user(&account_id).await);
            }
            RoomCommand::Revoke {
                account_id,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.revoke_authorization(&account_id).await);
            }
            RoomCommand::Client { account_id, event } => {
                self.handle_client_event(&account_id, event).await;
            }
            RoomCommand::AuthenticateInvite { token, reply_tx } => {
                let _ = reply_tx.send(self.authenticate_invite(&token).await);
            }
            RoomCommand::SetRelation { relation, reply_tx } => {
                let _ = reply_tx.send(self.handle_set_relation(relation).await);
            }
            RoomCommand::Persist { name, reply_tx } => {
                let _ = reply_tx.send(self.handle_persist(&name).await);
            }
            RoomCommand::Inspect { reply_tx } => {
                let _ = reply_tx.send(self.inspect());
            }
            RoomCommand::CloseIfIdle { reply_tx } => {
                let idle = self.online.is_empty();
                if idle {
                    self.handle_close();
                }
                let _ = reply_tx.send(idle);
            }
            RoomCommand::Close { reply_tx } => {
                self.handle_close();
                if let Some(tx) = reply_tx {
                    let _ = tx.send(());
                }
            }
        }
    }

    /// Start the grace timer once nobody is online.
    fn check_online(&mut self) {
        if self.online.is_empty() && self.empty_deadline.is_none() {
            debug!(room_id = %self.id, "Room empty, eviction pending");
            self.empty_deadline = Some(Instant::now() + self.ctx.empty_timeout);
        }
    }

    fn handle_empty_timeout(&mut self) {
        self.empty_deadline = None;
        if !self.online.is_empty() {
            return;
        }
        info!(room_id = %self.id, "Room stayed empty");
        let _ = self.ctx.notices.send(RoomNotice::Empty {
            room_id: self.id.clone(),
        });
    }

    fn handle_close(&mut self) {
        let bound: Vec<AccountId> = self.online.drain(..).collect();
        for account_id in bound {
            if let Some(link) = self
                .participants
                .get_mut(&account_id)
                .and_then(|p| p.link.take())
            {
                let _ = link.deliver.try_send(RoomDelivery::Released {
                    room_id: link.client_room_id,
                });
            }
        }
        self.empty_deadline = None;
        self.state = ActorState::Closed;
        info!(room_id = %self.id, "Room closed");
    }

    fn inspect(&self) -> RoomState {
        let mut participants: Vec<AccountId> = self.participants.keys().cloned().collect();
        participants.sort();
        let mut authed: Vec<AccountId> = self
            .participants
            .values()
            .filter(|p| p.authed)
            .map(|p| p.account_id.clone())
            .collect();
        authed.sort();
        RoomState {
            id: self.id.clone(),
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            persistent: self.persistent,
            contact: self.kind.is_contact(),
            participants,
            online: self.online.clone(),
            authorized: self.authorized.clone(),
            authed,
            live: self.live.ids().to_vec(),
            workgroups: self.workgroups.clone(),
            empty_pending: self.empty_deadline.is_some(),
        }
    }

    /// Owner or administrator.
    fn is_privileged(&self, account_id: &str) -> bool {
        account_id == self.owner_id
            || self
                .participants
                .get(account_id)
                .is_some_and(|p| p.admin)
    }
}
