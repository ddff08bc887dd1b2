//! Workgroup membership index.
//!
//! Holds the global workgroup catalog (deduplicated by external id) and the
//! two membership maps, `workgroup -> accounts` and `account -> workgroups`,
//! which are kept mirror images of each other. Membership changes are
//! published as [`WorkgroupEvent`]s; accounts subscribe to keep their contact
//! lists current.

use parking_lot::RwLock;
use presence_proto::{WorkgroupRef, WorkgroupSnapshot};
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 1024;

/// Membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkgroupEvent {
    UserAdded {
        account_id: String,
        worg_id: String,
    },
    UserRemoved {
        account_id: String,
        worg_ids: Vec<String>,
    },
}

#[derive(Default)]
struct IndexState {
    by_fid: HashMap<String, WorkgroupRef>,
    by_client_id: HashMap<String, WorkgroupRef>,
    worg_users: HashMap<String, Vec<String>>,
    user_worgs: HashMap<String, Vec<String>>,
    streams: HashMap<String, Vec<String>>,
}

impl IndexState {
    /// Add to the catalog unless the external id is already known. Returns the
    /// catalogued client id.
    fn catalog(&mut self, worg: &WorkgroupRef) -> Option<String> {
        if worg.f_id.is_empty() || worg.client_id.is_empty() {
            warn!(worg = ?worg, "Ignoring workgroup without ids");
            return None;
        }
        if let Some(known) = self.by_fid.get(&worg.f_id) {
            return Some(known.client_id.clone());
        }
        debug!(f_id = %worg.f_id, client_id = %worg.client_id, name = %worg.name, "Workgroup added");
        self.by_fid.insert(worg.f_id.clone(), worg.clone());
        self.by_client_id.insert(worg.client_id.clone(), worg.clone());
        self.worg_users.entry(worg.client_id.clone()).or_default();
        Some(worg.client_id.clone())
    }

    fn is_member(&self, account_id: &str, worg_id: &str) -> bool {
        self.worg_users
            .get(worg_id)
            .is_some_and(|users| users.iter().any(|u| u == account_id))
    }

    fn unlink(&mut self, account_id: &str, worg_id: &str) {
        if let Some(users) = self.worg_users.get_mut(worg_id) {
            users.retain(|u| u != account_id);
        }
        if let Some(worgs) = self.user_worgs.get_mut(account_id) {
            worgs.retain(|w| w != worg_id);
        }
    }
}

/// Bidirectional account/workgroup membership index.
pub struct WorkgroupIndex {
    state: RwLock<IndexState>,
    events: broadcast::Sender<WorkgroupEvent>,
}

impl Default for WorkgroupIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkgroupIndex {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(IndexState::default()),
            events,
        }
    }

    /// Receive membership changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkgroupEvent> {
        self.events.subscribe()
    }

    /// Merge `snapshot` into the catalog and reconcile the account's membership.
    ///
    /// Emits `UserAdded` for each new membership and one `UserRemoved` listing
    /// every membership the snapshot no longer contains. Returns the account's
    /// membership after reconciliation.
    pub fn add_user(&self, account_id: &str, snapshot: &WorkgroupSnapshot) -> Vec<String> {
        let mut events = Vec::new();
        let members = {
            let mut state = self.state.write();
            for worg in &snapshot.available {
                state.catalog(worg);
            }

            let mut wanted: Vec<String> = Vec::with_capacity(snapshot.member.len());
            for worg in &snapshot.member {
                match state.catalog(worg) {
                    Some(id) if !wanted.contains(&id) => wanted.push(id),
                    _ => {}
                }
            }

            for worg_id in &wanted {
                if state.is_member(account_id, worg_id) {
                    continue;
                }
                state
                    .worg_users
                    .entry(worg_id.clone())
                    .or_default()
                    .push(account_id.to_string());
                state
                    .user_worgs
                    .entry(account_id.to_string())
                    .or_default()
                    .push(worg_id.clone());
                events.push(WorkgroupEvent::UserAdded {
                    account_id: account_id.to_string(),
                    worg_id: worg_id.clone(),
                });
            }

            let stale: Vec<String> = state
                .user_worgs
                .get(account_id)
                .map(|current| {
                    current
                        .iter()
                        .filter(|w| !wanted.contains(w))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for worg_id in &stale {
                state.unlink(account_id, worg_id);
            }
            if !stale.is_empty() {
                events.push(WorkgroupEvent::UserRemoved {
                    account_id: account_id.to_string(),
                    worg_ids: stale,
                });
            }

            state
                .streams
                .insert(account_id.to_string(), snapshot.stream.clone());
            state.user_worgs.entry(account_id.to_string()).or_default();
            wanted
        };

        self.publish(events);
        members
    }

    /// Drop every membership of the account. Returns the prior membership.
    pub fn remove_user(&self, account_id: &str) -> Vec<String> {
        let prior = {
            let mut state = self.state.write();
            state.streams.remove(account_id);
            let prior = state.user_worgs.remove(account_id).unwrap_or_default();
            for worg_id in &prior {
                if let Some(users) = state.worg_users.get_mut(worg_id) {
                    users.retain(|u| u != account_id);
                }
            }
            prior
        };

        if !prior.is_empty() {
            self.publish(vec![WorkgroupEvent::UserRemoved {
                account_id: account_id.to_string(),
                worg_ids: prior.clone(),
            }]);
        }
        prior
    }

    /// Accounts in a workgroup.
    pub fn get_user_list(&self, worg_id: &str) -> Vec<String> {
        self.state
            .read()
            .worg_users
            .get(worg_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Workgroup client ids the account belongs to.
    pub fn get_member_of_list(&self, account_id: &str) -> Vec<String> {
        self.state
            .read()
            .user_worgs
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Full workgroup records the account belongs to.
    pub fn get_user_workgroup_list(&self, account_id: &str) -> Vec<WorkgroupRef> {
        let state = self.state.read();
        state
            .user_worgs
            .get(account_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.by_client_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Co-members of the account across `worgs`, or across all its workgroups
    /// when `worgs` is `None`. Deduplicated, never contains the account itself.
    pub fn get_contact_list(&self, account_id: &str, worgs: Option<&[String]>) -> Vec<String> {
        let state = self.state.read();
        let own;
        let worgs = match worgs {
            Some(worgs) => worgs,
            None => {
                own = state.user_worgs.get(account_id).cloned().unwrap_or_default();
                &own
            }
        };

        let mut seen = HashSet::new();
        let mut contacts = Vec::new();
        for worg_id in worgs {
            let Some(users) = state.worg_users.get(worg_id) else {
                continue;
            };
            for user in users {
                if user != account_id && seen.insert(user.as_str()) {
                    contacts.push(user.clone());
                }
            }
        }
        contacts
    }

    /// Workgroup names streamed to the account.
    pub fn get_stream_list(&self, account_id: &str) -> Vec<String> {
        self.state
            .read()
            .streams
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, worg_id: &str) -> Option<WorkgroupRef> {
        self.state.read().by_client_id.get(worg_id).cloned()
    }

    pub fn is_member(&self, account_id: &str, worg_id: &str) -> bool {
        self.state.read().is_member(account_id, worg_id)
    }

    /// Whether the account belongs to any of `worgs`.
    pub fn is_member_of_any(&self, account_id: &str, worgs: &[String]) -> bool {
        let state = self.state.read();
        worgs.iter().any(|w| state.is_member(account_id, w))
    }

    /// Number of catalogued workgroups.
    pub fn len(&self) -> usize {
        self.state.read().by_fid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, events: Vec<WorkgroupEvent>) {
        for event in events {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
    }
}
