//! In-process store.
//!
//! Backs `database.backend = "memory"` and the test-suite. Every mutating call
//! bumps a write counter, and individual operations can be made to fail so
//! that degraded paths are reachable from tests.

use super::{
    AccountRecord, AccountStore, AuthorizedUser, InviteRecord, InviteStore, MessageRecord,
    MessageStore, RelationRecord, RelationState, RelationStore, RoomMembership, RoomRecord,
    RoomStore,
};
use crate::db::DbError;
use crate::state::uid::{self, new_id};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Authorize,
    Revoke,
    SetRoom,
    CreateRelation,
    LoadRelations,
    LoadRooms,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    logins: HashMap<String, String>,
    rooms: HashMap<String, RoomRecord>,
    settings: HashMap<String, Map<String, Value>>,
    // room id -> ordered authorized account ids
    authorized: HashMap<String, Vec<String>>,
    assigned: HashMap<String, Vec<String>>,
    relations: HashMap<String, RelationRecord>,
    invites: HashMap<String, InviteRecord>,
    logs: HashMap<String, Vec<MessageRecord>>,
    // (log key, account id) -> last read msg id
    read: HashMap<(String, String), String>,
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writes: AtomicUsize,
    failing: Mutex<HashSet<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make `point` fail (or succeed again).
    pub fn set_failing(&self, point: FailPoint, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(point);
        } else {
            set.remove(&point);
        }
    }

    /// Number of stored relations.
    pub fn relation_count(&self) -> usize {
        self.inner.lock().relations.len()
    }

    /// Authorized account ids of a room, in grant order.
    pub fn authorized_ids(&self, room_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .authorized
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, point: FailPoint) -> Result<(), DbError> {
        if self.failing.lock().contains(&point) {
            return Err(DbError::Internal(format!("injected failure: {point:?}")));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account_by_login(&self, login: &str) -> Result<Option<AccountRecord>, DbError> {
        let inner = self.inner.lock();
        Ok(inner
            .logins
            .get(login)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn get_account(&self, client_id: &str) -> Result<Option<AccountRecord>, DbError> {
        Ok(self.inner.lock().accounts.get(client_id).cloned())
    }

    async fn get_accounts(&self, client_ids: &[String]) -> Result<Vec<AccountRecord>, DbError> {
        let inner = self.inner.lock();
        Ok(client_ids
            .iter()
            .filter_map(|id| inner.accounts.get(id).cloned())
            .collect())
    }

    async fn create_account(
        &self,
        login: &str,
        _pass: Option<&str>,
        name: &str,
    ) -> Result<AccountRecord, DbError> {
        let mut inner = self.inner.lock();
        if inner.logins.contains_key(login) {
            return Err(DbError::AccountExists(login.to_string()));
        }
        let record = AccountRecord {
            client_id: new_id(uid::ACCOUNT),
            login: login.to_string(),
            name: name.to_string(),
            avatar: None,
            created: chrono::Utc::now().timestamp(),
        };
        inner
            .logins
            .insert(login.to_string(), record.client_id.clone());
        inner
            .accounts
            .insert(record.client_id.clone(), record.clone());
        self.wrote();
        Ok(record)
    }

    async fn update_account_name(&self, client_id: &str, name: &str) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        let account = inner
            .accounts
            .get_mut(client_id)
            .ok_or_else(|| DbError::AccountNotFound(client_id.to_string()))?;
        account.name = name.to_string();
        self.wrote();
        Ok(())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, DbError> {
        Ok(self.inner.lock().rooms.get(room_id).cloned())
    }

    async fn set_room(
        &self,
        room_id: &str,
        name: &str,
        owner_id: &str,
        is_private: bool,
    ) -> Result<RoomRecord, DbError> {
        self.check(FailPoint::SetRoom)?;
        let record = RoomRecord {
            client_id: room_id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            is_private,
        };
        self.inner
            .lock()
            .rooms
            .insert(room_id.to_string(), record.clone());
        self.wrote();
        Ok(record)
    }

    async fn rename_room(&self, room_id: &str, name: &str) -> Result<(), DbError> {
        if let Some(room) = self.inner.lock().rooms.get_mut(room_id) {
            room.name = name.to_string();
        }
        self.wrote();
        Ok(())
    }

    async fn get_settings(&self, room_id: &str) -> Result<Map<String, Value>, DbError> {
        Ok(self
            .inner
            .lock()
            .settings
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_setting(&self, room_id: &str, key: &str, value: &Value) -> Result<(), DbError> {
        self.inner
            .lock()
            .settings
            .entry(room_id.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        self.wrote();
        Ok(())
    }

    async fn authorize(&self, room_id: &str, account_ids: &[String]) -> Result<(), DbError> {
        self.check(FailPoint::Authorize)?;
        let mut inner = self.inner.lock();
        let list = inner.authorized.entry(room_id.to_string()).or_default();
        for id in account_ids {
            if !list.contains(id) {
                list.push(id.clone());
            }
        }
        self.wrote();
        Ok(())
    }

    async fn revoke(&self, room_id: &str, account_id: &str) -> Result<(), DbError> {
        self.check(FailPoint::Revoke)?;
        if let Some(list) = self.inner.lock().authorized.get_mut(room_id) {
            list.retain(|id| id != account_id);
        }
        self.wrote();
        Ok(())
    }

    async fn check_authorized(&self, room_id: &str, account_id: &str) -> Result<bool, DbError> {
        Ok(self
            .inner
            .lock()
            .authorized
            .get(room_id)
            .is_some_and(|list| list.iter().any(|id| id == account_id)))
    }

    async fn load_authorizations(&self, room_id: &str) -> Result<Vec<AuthorizedUser>, DbError> {
        let inner = self.inner.lock();
        let Some(ids) = inner.authorized.get(room_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .map(|id| match inner.accounts.get(id) {
                Some(acc) => AuthorizedUser {
                    client_id: id.clone(),
                    name: acc.name.clone(),
                    avatar: acc.avatar.clone(),
                },
                None => AuthorizedUser {
                    client_id: id.clone(),
                    name: String::new(),
                    avatar: None,
                },
            })
            .collect())
    }

    async fn get_rooms_for_account(
        &self,
        account_id: &str,
        workgroup_ids: &[String],
    ) -> Result<Vec<RoomMembership>, DbError> {
        self.check(FailPoint::LoadRooms)?;
        let inner = self.inner.lock();
        let mut out: Vec<RoomMembership> = Vec::new();
        for (room_id, room) in &inner.rooms {
            // contact rooms are reached through relations, never listed here
            if room.is_private {
                continue;
            }
            let direct = inner
                .authorized
                .get(room_id)
                .is_some_and(|l| l.iter().any(|id| id == account_id));
            let via_workgroup = !direct
                && inner
                    .assigned
                    .get(room_id)
                    .is_some_and(|l| l.iter().any(|w| workgroup_ids.contains(w)));
            if direct || via_workgroup {
                out.push(RoomMembership {
                    room_id: room_id.clone(),
                    via_workgroup,
                });
            }
        }
        out.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(out)
    }

    async fn assign_workgroup(&self, room_id: &str, worg_id: &str, _by: &str) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        let list = inner.assigned.entry(room_id.to_string()).or_default();
        if !list.iter().any(|w| w == worg_id) {
            list.push(worg_id.to_string());
        }
        self.wrote();
        Ok(())
    }

    async fn dismiss_workgroup(&self, room_id: &str, worg_id: &str) -> Result<(), DbError> {
        if let Some(list) = self.inner.lock().assigned.get_mut(room_id) {
            list.retain(|w| w != worg_id);
        }
        self.wrote();
        Ok(())
    }

    async fn get_assigned_workgroups(&self, room_id: &str) -> Result<Vec<String>, DbError> {
        Ok(self
            .inner
            .lock()
            .assigned
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn get_relation(&self, a: &str, b: &str) -> Result<Option<RelationRecord>, DbError> {
        Ok(self
            .inner
            .lock()
            .relations
            .values()
            .find(|r| {
                (r.account_a == a && r.account_b == b) || (r.account_a == b && r.account_b == a)
            })
            .cloned())
    }

    async fn get_relation_by_id(
        &self,
        relation_id: &str,
    ) -> Result<Option<RelationRecord>, DbError> {
        Ok(self.inner.lock().relations.get(relation_id).cloned())
    }

    async fn create_relation(&self, a: &str, b: &str) -> Result<RelationRecord, DbError> {
        self.check(FailPoint::CreateRelation)?;
        let record = RelationRecord {
            client_id: new_id(uid::RELATION),
            account_a: a.to_string(),
            account_b: b.to_string(),
            room_id: None,
        };
        self.inner
            .lock()
            .relations
            .insert(record.client_id.clone(), record.clone());
        self.wrote();
        Ok(record)
    }

    async fn assign_relation_room(&self, relation_id: &str, room_id: &str) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        let relation = inner
            .relations
            .get_mut(relation_id)
            .ok_or_else(|| DbError::Internal(format!("no relation {relation_id}")))?;
        relation.room_id = Some(room_id.to_string());
        self.wrote();
        Ok(())
    }

    async fn get_relations_for(&self, account_id: &str) -> Result<Vec<RelationRecord>, DbError> {
        self.check(FailPoint::LoadRelations)?;
        let mut out: Vec<RelationRecord> = self
            .inner
            .lock()
            .relations
            .values()
            .filter(|r| r.account_a == account_id || r.account_b == account_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(out)
    }
}

#[async_trait]
impl InviteStore for MemoryStore {
    async fn create_invite(
        &self,
        token: &str,
        room_id: &str,
        single_use: bool,
        created_by: &str,
    ) -> Result<(), DbError> {
        self.inner.lock().invites.insert(
            token.to_string(),
            InviteRecord {
                token: token.to_string(),
                room_id: room_id.to_string(),
                single_use,
                is_valid: true,
                created_by: created_by.to_string(),
            },
        );
        self.wrote();
        Ok(())
    }

    async fn check_invite(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<Option<InviteRecord>, DbError> {
        Ok(self
            .inner
            .lock()
            .invites
            .get(token)
            .filter(|inv| inv.room_id == room_id)
            .cloned())
    }

    async fn invalidate_invite(&self, token: &str) -> Result<(), DbError> {
        if let Some(inv) = self.inner.lock().invites.get_mut(token) {
            inv.is_valid = false;
        }
        self.wrote();
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(&self, log_key: &str, message: &MessageRecord) -> Result<(), DbError> {
        self.inner
            .lock()
            .logs
            .entry(log_key.to_string())
            .or_default()
            .push(message.clone());
        self.wrote();
        Ok(())
    }

    async fn last_messages(
        &self,
        log_key: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let inner = self.inner.lock();
        let Some(log) = inner.logs.get(log_key) else {
            return Ok(Vec::new());
        };
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn mark_read(
        &self,
        log_key: &str,
        account_id: &str,
        msg_id: &str,
    ) -> Result<(), DbError> {
        self.inner.lock().read.insert(
            (log_key.to_string(), account_id.to_string()),
            msg_id.to_string(),
        );
        self.wrote();
        Ok(())
    }

    async fn relation_state(
        &self,
        relation_id: &str,
        account_id: &str,
    ) -> Result<RelationState, DbError> {
        let inner = self.inner.lock();
        let last_read = inner
            .read
            .get(&(relation_id.to_string(), account_id.to_string()))
            .cloned();
        let Some(log) = inner.logs.get(relation_id) else {
            return Ok(RelationState {
                last_read,
                ..Default::default()
            });
        };
        let after = match &last_read {
            Some(id) => log
                .iter()
                .position(|m| &m.msg_id == id)
                .map(|p| p + 1)
                .unwrap_or(0),
            None => 0,
        };
        let unread = log[after..]
            .iter()
            .filter(|m| m.from_id != account_id)
            .count() as u64;
        Ok(RelationState {
            unread,
            last_read,
            last_message: log.last().cloned(),
        })
    }
}
