//! The Hub: owner of every long-lived registry.
//!
//! The gateway hands authenticated connections to the hub, which finds or
//! creates the account's session and starts its account. Three background
//! loops keep the pieces in step:
//!
//! - session teardown: a closed session removes its account, its workgroup
//!   memberships and (for guests) its identity;
//! - registry notices: room-driven requests routed to the target account;
//! - workgroup events: membership changes turned into contact updates.

use crate::config::Config;
use crate::identity::{AuthOracle, IdentityCache, InitialsAvatar};
use crate::network::Connection;
use crate::rooms::{AccountNotice, RoomOptions, RoomRegistry};
use crate::state::account::{AccountActor, AccountCommand, AccountContext, AccountProfile};
use crate::state::managers::{AccountManager, SessionManager, SessionSlot};
use crate::state::session::Session;
use crate::state::uid::{self, SessionId};
use crate::store::Store;
use crate::workgroups::{WorkgroupEvent, WorkgroupIndex};
use presence_proto::{Event, Identity, WorkgroupSnapshot, kinds};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub struct Hub {
    store: Arc<dyn Store>,
    identities: Arc<IdentityCache>,
    workgroups: Arc<WorkgroupIndex>,
    rooms: Arc<RoomRegistry>,
    sessions: SessionManager,
    accounts: AccountManager,
    oracle: Box<dyn AuthOracle>,
    auth_timeout: Duration,
    teardown: mpsc::UnboundedSender<SessionId>,
}

impl Hub {
    /// Build the hub and spawn its background loops.
    pub fn new(store: Arc<dyn Store>, oracle: Box<dyn AuthOracle>, config: &Config) -> Arc<Self> {
        let identities = Arc::new(IdentityCache::new(
            Arc::clone(&store),
            Arc::new(InitialsAvatar),
        ));
        let workgroups = Arc::new(WorkgroupIndex::new());
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let rooms = RoomRegistry::new(
            Arc::clone(&store),
            Arc::clone(&identities),
            Arc::clone(&workgroups),
            RoomOptions::from_config(config),
            notice_tx,
        );
        let (teardown, teardown_rx) = mpsc::unbounded_channel();
        let worg_events = workgroups.subscribe();

        let hub = Arc::new(Self {
            store,
            identities,
            workgroups,
            rooms,
            sessions: SessionManager::new(),
            accounts: AccountManager::new(),
            oracle,
            auth_timeout: config.timeouts.auth(),
            teardown,
        });

        tokio::spawn(run_teardown(Arc::downgrade(&hub), teardown_rx));
        tokio::spawn(run_account_notices(Arc::downgrade(&hub), notice_rx));
        tokio::spawn(run_workgroup_events(Arc::downgrade(&hub), worg_events));
        hub
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn identities(&self) -> &Arc<IdentityCache> {
        &self.identities
    }

    pub fn workgroups(&self) -> &Arc<WorkgroupIndex> {
        &self.workgroups
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    pub fn oracle(&self) -> &dyn AuthOracle {
        self.oracle.as_ref()
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    // ========================================================================
    // Login paths
    // ========================================================================

    /// Reattach a connection to a live session found by the caller.
    pub fn resume(&self, session: &Arc<Session>, conn: Connection) -> bool {
        let conn_id = conn.id().to_string();
        if !session.attach(conn) {
            debug!(session_id = %session.id(), "Session closed while resuming");
            return false;
        }
        session.send_to(Event::bare(kinds::READY), &conn_id);
        info!(session_id = %session.id(), conn_id = %conn_id, "Session resumed");
        true
    }

    /// Log a registered account in on `conn`, reconciling its workgroups
    /// first. Joins the account's live session if there is one.
    pub fn login(
        &self,
        profile: AccountProfile,
        workgroups: &WorkgroupSnapshot,
        conn: Connection,
    ) -> Arc<Session> {
        self.workgroups.add_user(&profile.account_id, workgroups);
        self.enter(profile, conn)
    }

    /// Log a guest in. Guests only exist in memory.
    pub fn login_guest(&self, profile: AccountProfile, conn: Connection) -> Arc<Session> {
        self.identities.set_guest(Identity {
            client_id: profile.account_id.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
            email: None,
        });
        self.enter(profile, conn)
    }

    fn enter(&self, profile: AccountProfile, conn: Connection) -> Arc<Session> {
        let conn_id = conn.id().to_string();
        let account_id = profile.account_id.clone();

        match self.sessions.open(&account_id) {
            SessionSlot::Existing(session) => {
                debug!(account_id = %account_id, session_id = %session.id(), "Joining live session");
                self.attach_ready(&session, conn, &conn_id);
                session
            }
            SessionSlot::Created(session, events) => {
                let teardown = self.teardown.clone();
                session.on_close(Box::new(move |session_id| {
                    let _ = teardown.send(session_id);
                }));
                // attach before the account starts so its startup events reach
                // this connection
                self.attach_ready(&session, conn, &conn_id);
                let handle = AccountActor::spawn(
                    profile,
                    Arc::clone(&session),
                    events,
                    self.account_context(),
                );
                self.accounts.insert(handle);
                if session.is_closed() {
                    // the connection dropped before the account was registered
                    self.end_session(session.id());
                    if let Some(handle) = self.accounts.remove_for_session(&account_id, session.id()) {
                        handle.close();
                    }
                }
                info!(account_id = %account_id, session_id = %session.id(), "Session created");
                session
            }
        }
    }

    fn attach_ready(&self, session: &Arc<Session>, conn: Connection, conn_id: &str) {
        if session.attach(conn) {
            session.send_to(Event::bare(kinds::READY), conn_id);
        } else {
            warn!(session_id = %session.id(), conn_id = %conn_id, "Session closed during login");
        }
    }

    fn account_context(&self) -> AccountContext {
        AccountContext {
            store: Arc::clone(&self.store),
            identities: Arc::clone(&self.identities),
            workgroups: Arc::clone(&self.workgroups),
            rooms: Arc::clone(&self.rooms),
            teardown: self.teardown.clone(),
        }
    }

    /// Close every account. Used on shutdown.
    pub fn close_all(&self) {
        for account_id in self.accounts.ids() {
            if let Some(handle) = self.accounts.get(&account_id) {
                handle.close();
            }
        }
    }

    // ========================================================================
    // Background work
    // ========================================================================

    fn end_session(&self, session_id: &str) {
        let Some(session) = self.sessions.remove(session_id) else {
            return;
        };
        let account_id = session.account_id().to_string();
        if let Some(handle) = self.accounts.remove_for_session(&account_id, session_id) {
            handle.close();
        }
        // a newer session may already own the account
        if self.sessions.for_account(&account_id).is_none() {
            self.workgroups.remove_user(&account_id);
            if uid::has_prefix(&account_id, uid::GUEST) {
                self.identities.remove(&account_id);
            }
        }
        info!(account_id = %account_id, session_id = %session_id, "Session ended");
    }

    fn route_notice(&self, notice: AccountNotice) {
        let (account_id, command) = match notice {
            AccountNotice::WorkgroupJoin {
                account_id,
                room_id,
            } => (account_id, AccountCommand::WorkgroupJoin { room_id }),
            AccountNotice::ContactJoin {
                account_id,
                contact_id,
            } => (account_id, AccountCommand::ContactJoin { contact_id }),
        };
        if !self.accounts.notify(&account_id, command) {
            debug!(account_id = %account_id, "Notice for an account that is not online");
        }
    }

    fn on_workgroup_event(&self, event: WorkgroupEvent) {
        match event {
            WorkgroupEvent::UserAdded {
                account_id,
                worg_id,
            } => {
                for member in self.workgroups.get_user_list(&worg_id) {
                    if member == account_id {
                        continue;
                    }
                    self.accounts.notify(
                        &member,
                        AccountCommand::ContactAdd {
                            contact_id: account_id.clone(),
                        },
                    );
                }
            }
            WorkgroupEvent::UserRemoved {
                account_id,
                worg_ids,
            } => {
                for worg_id in &worg_ids {
                    for member in self.workgroups.get_user_list(worg_id) {
                        self.accounts.notify(
                            &member,
                            AccountCommand::ContactRemove {
                                contact_id: account_id.clone(),
                            },
                        );
                    }
                }
            }
        }
    }
}

async fn run_teardown(hub: Weak<Hub>, mut rx: mpsc::UnboundedReceiver<SessionId>) {
    while let Some(session_id) = rx.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.end_session(&session_id);
    }
}

async fn run_account_notices(hub: Weak<Hub>, mut rx: mpsc::UnboundedReceiver<AccountNotice>) {
    while let Some(notice) = rx.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.route_notice(notice);
    }
}

async fn run_workgroup_events(hub: Weak<Hub>, mut rx: broadcast::Receiver<WorkgroupEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.on_workgroup_event(event);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Workgroup events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
