//! Session lookup by id and by account.

use crate::state::dashmap_ext::DashMapExt;
use crate::state::session::{Session, SessionEvent};
use crate::state::uid::{AccountId, SessionId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outcome of [`SessionManager::open`].
#[derive(Debug)]
pub enum SessionSlot {
    /// The account already has a live session; attach to it.
    Existing(Arc<Session>),
    /// A fresh session. The caller owns its event stream and must start the
    /// account on it.
    Created(Arc<Session>, mpsc::Receiver<SessionEvent>),
}

/// Tracks every live session.
///
/// An account never has more than one session: [`open`](Self::open) holds
/// the account's index entry while it decides, so two concurrent logins for
/// the same account converge on one session.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
    by_account: DashMap<AccountId, Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the account's live session or create one.
    pub fn open(&self, account_id: &str) -> SessionSlot {
        match self.by_account.entry(account_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    return SessionSlot::Existing(Arc::clone(entry.get()));
                }
                // closed but not torn down yet
                let stale = entry.get().id().to_string();
                self.sessions.remove(&stale);
                let (session, events) = Session::new(account_id.to_string());
                entry.insert(Arc::clone(&session));
                self.sessions
                    .insert(session.id().to_string(), Arc::clone(&session));
                debug!(account_id = %account_id, stale = %stale, "Replaced closed session");
                SessionSlot::Created(session, events)
            }
            Entry::Vacant(entry) => {
                let (session, events) = Session::new(account_id.to_string());
                entry.insert(Arc::clone(&session));
                self.sessions
                    .insert(session.id().to_string(), Arc::clone(&session));
                SessionSlot::Created(session, events)
            }
        }
    }

    /// Live session by id. Closed sessions are never resumed.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get_cloned(session_id)
            .filter(|session| !session.is_closed())
    }

    pub fn for_account(&self, account_id: &str) -> Option<Arc<Session>> {
        self.by_account
            .get_cloned(account_id)
            .filter(|session| !session.is_closed())
    }

    /// Drop a session from both maps. The account index is only cleared if
    /// it still points at this session.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(session_id)?;
        self.by_account
            .remove_if(session.account_id(), |_, current| current.id() == session_id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Connection;

    fn created(slot: SessionSlot) -> Arc<Session> {
        match slot {
            SessionSlot::Created(session, _) => session,
            SessionSlot::Existing(_) => panic!("expected a new session"),
        }
    }

    #[tokio::test]
    async fn one_session_per_account() {
        let sessions = SessionManager::new();
        let first = created(sessions.open("acc-1"));
        let (conn, _end) = Connection::channel("conn-1".into());
        first.attach(conn);

        match sessions.open("acc-1") {
            SessionSlot::Existing(s) => assert_eq!(s.id(), first.id()),
            SessionSlot::Created(..) => panic!("second session for one account"),
        }
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.get(first.id()).unwrap().id(), first.id());
        assert_eq!(sessions.for_account("acc-1").unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn closed_sessions_are_replaced() {
        let sessions = SessionManager::new();
        let first = created(sessions.open("acc-1"));
        first.close();
        assert!(sessions.get(first.id()).is_none());

        let second = created(sessions.open("acc-1"));
        assert_ne!(first.id(), second.id());
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn remove_keeps_newer_index_entry() {
        let sessions = SessionManager::new();
        let first = created(sessions.open("acc-1"));
        first.close();
        let second = created(sessions.open("acc-1"));

        assert!(sessions.remove(first.id()).is_none());
        assert!(sessions.remove(second.id()).is_some());
        assert!(sessions.for_account("acc-1").is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_resolve_to_none() {
        let sessions = SessionManager::new();
        assert!(sessions.get("session-missing").is_none());
        assert!(sessions.remove("session-missing").is_none());
        assert!(sessions.is_empty());
    }
}
