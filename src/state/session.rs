//! Logical session: one account's presence across any number of connections.
//!
//! ```text
//!   conn A ──┐                      ┌──► conn A
//!   conn B ──┼──► events (mpsc) ──► │ Account ──► send() ──┼──► conn B
//!   conn C ──┘                      └──► conn C
//! ```
//!
//! Each attached connection gets a forwarder task that moves its inbound
//! events into the session pipe, so events from one connection keep their
//! order while events from different connections interleave. When the last
//! connection detaches the close hook fires synchronously from `detach`.

use crate::network::{Connection, ConnectionSender};
use crate::state::uid::{self, AccountId, ConnId, SessionId, new_id};
use parking_lot::Mutex;
use presence_proto::{Event, kinds};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// One inbound event and the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub conn_id: ConnId,
    pub event: Event,
}

/// Invoked once, when the last connection detaches.
pub type CloseHook = Box<dyn FnOnce(SessionId) + Send>;

struct Attached {
    sender: ConnectionSender,
    forwarder: JoinHandle<()>,
}

#[derive(Default)]
struct SessionInner {
    connections: HashMap<ConnId, Attached>,
    // attach order, for stable fan-out
    order: Vec<ConnId>,
    on_close: Option<CloseHook>,
    closed: bool,
}

/// A reconnect-durable binding between an account and its live connections.
pub struct Session {
    id: SessionId,
    account_id: AccountId,
    events: mpsc::Sender<SessionEvent>,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a session. The receiver yields inbound events from every
    /// attached connection.
    pub fn new(account_id: AccountId) -> (Arc<Session>, mpsc::Receiver<SessionEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let session = Arc::new(Session {
            id: new_id(uid::SESSION),
            account_id,
            events,
            inner: Mutex::new(SessionInner::default()),
        });
        (session, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Install the close hook. Replaces any previous hook.
    pub fn on_close(&self, hook: CloseHook) {
        self.inner.lock().on_close = Some(hook);
    }

    /// Attach a connection. The client is told the session id so it can
    /// resume later. Returns `false` (and closes the connection) when the
    /// session is already closed.
    pub fn attach(self: &Arc<Self>, conn: Connection) -> bool {
        let (sender, mut inbound) = conn.into_parts();
        let conn_id = sender.id().to_string();

        let mut inner = self.inner.lock();
        if inner.closed {
            sender.close();
            return false;
        }

        let weak: Weak<Session> = Arc::downgrade(self);
        let events = self.events.clone();
        let fwd_id = conn_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let item = SessionEvent {
                    conn_id: fwd_id.clone(),
                    event,
                };
                if events.send(item).await.is_err() {
                    break;
                }
            }
            // transport gone: same as a graceful detach
            if let Some(session) = weak.upgrade() {
                session.detach(&fwd_id);
            }
        });

        sender.send(Event::new(kinds::SESSION, Value::String(self.id.clone())));
        if let Some(old) = inner.connections.insert(
            conn_id.clone(),
            Attached {
                sender,
                forwarder,
            },
        ) {
            old.forwarder.abort();
        }
        inner.order.retain(|id| id != &conn_id);
        inner.order.push(conn_id.clone());
        debug!(session_id = %self.id, conn_id = %conn_id, count = inner.order.len(), "Connection attached");
        true
    }

    /// Detach one connection. Detaching the last one closes the session and
    /// fires the close hook before returning. Unknown ids are ignored.
    pub fn detach(&self, conn_id: &str) {
        let hook = {
            let mut inner = self.inner.lock();
            let Some(attached) = inner.connections.remove(conn_id) else {
                return;
            };
            attached.forwarder.abort();
            inner.order.retain(|id| id != conn_id);
            debug!(session_id = %self.id, conn_id = %conn_id, remaining = inner.order.len(), "Connection detached");

            if !inner.connections.is_empty() || inner.closed {
                return;
            }
            inner.closed = true;
            inner.on_close.take()
        };

        info!(session_id = %self.id, account_id = %self.account_id, "Session closed");
        if let Some(hook) = hook {
            hook(self.id.clone());
        }
    }

    /// Send to every attached connection. Returns how many accepted it.
    pub fn send(&self, event: &Event) -> usize {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.connections.get(id))
            .filter(|c| c.sender.send(event.clone()))
            .count()
    }

    /// Send to one attached connection.
    pub fn send_to(&self, event: Event, conn_id: &str) -> bool {
        self.inner
            .lock()
            .connections
            .get(conn_id)
            .is_some_and(|c| c.sender.send(event))
    }

    /// Detach and close every connection. The close hook does not fire.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.on_close = None;
        inner.order.clear();
        for (_, attached) in inner.connections.drain() {
            attached.forwarder.abort();
            attached.sender.close();
        }
    }

    pub fn connection_ids(&self) -> Vec<ConnId> {
        self.inner.lock().order.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}
