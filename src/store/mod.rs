//! Persistent store views consumed by the core.
//!
//! The core never talks SQL. It calls the narrow traits below, which are
//! implemented by [`crate::db::Database`] (SQLite through sqlx) and by
//! [`MemoryStore`] (process memory, used by tests and throwaway deployments).
//!
//! ```text
//!   Gateway ──► AccountStore
//!   Account ──► RoomStore, RelationStore, MessageStore
//!   Room    ──► RoomStore, InviteStore, MessageStore
//! ```

mod memory;

pub use memory::{FailPoint, MemoryStore};

use crate::db::DbError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub client_id: String,
    pub login: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created: i64,
}

/// Stored room configuration. Only persistent rooms are ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub client_id: String,
    pub name: String,
    pub owner_id: String,
    pub is_private: bool,
}

/// An account granted access to a persistent room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// A persistent room an account can reach, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    pub room_id: String,
    /// Reached through an assigned workgroup rather than individual authorization.
    pub via_workgroup: bool,
}

/// Pairing between two accounts backing a 1:1 room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRecord {
    pub client_id: String,
    pub account_a: String,
    pub account_b: String,
    pub room_id: Option<String>,
}

impl RelationRecord {
    /// The account on the other side of the pair, if `account_id` is part of it.
    pub fn other(&self, account_id: &str) -> Option<&str> {
        if self.account_a == account_id {
            Some(&self.account_b)
        } else if self.account_b == account_id {
            Some(&self.account_a)
        } else {
            None
        }
    }
}

/// Stored invite token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRecord {
    pub token: String,
    pub room_id: String,
    pub single_use: bool,
    pub is_valid: bool,
    pub created_by: String,
}

/// One chat log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub msg_id: String,
    pub from_id: String,
    pub name: String,
    pub message: String,
    pub time: i64,
}

/// Unread state of a relation log for one of its accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationState {
    pub unread: u64,
    pub last_read: Option<String>,
    pub last_message: Option<MessageRecord>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account_by_login(&self, login: &str) -> Result<Option<AccountRecord>, DbError>;
    async fn get_account(&self, client_id: &str) -> Result<Option<AccountRecord>, DbError>;
    async fn get_accounts(&self, client_ids: &[String]) -> Result<Vec<AccountRecord>, DbError>;
    async fn create_account(
        &self,
        login: &str,
        pass: Option<&str>,
        name: &str,
    ) -> Result<AccountRecord, DbError>;
    async fn update_account_name(&self, client_id: &str, name: &str) -> Result<(), DbError>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, DbError>;
    async fn set_room(
        &self,
        room_id: &str,
        name: &str,
        owner_id: &str,
        is_private: bool,
    ) -> Result<RoomRecord, DbError>;
    async fn rename_room(&self, room_id: &str, name: &str) -> Result<(), DbError>;
    async fn get_settings(&self, room_id: &str) -> Result<Map<String, Value>, DbError>;
    async fn set_setting(&self, room_id: &str, key: &str, value: &Value) -> Result<(), DbError>;
    async fn authorize(&self, room_id: &str, account_ids: &[String]) -> Result<(), DbError>;
    async fn revoke(&self, room_id: &str, account_id: &str) -> Result<(), DbError>;
    async fn check_authorized(&self, room_id: &str, account_id: &str) -> Result<bool, DbError>;
    async fn load_authorizations(&self, room_id: &str) -> Result<Vec<AuthorizedUser>, DbError>;
    async fn get_rooms_for_account(
        &self,
        account_id: &str,
        workgroup_ids: &[String],
    ) -> Result<Vec<RoomMembership>, DbError>;
    async fn assign_workgroup(&self, room_id: &str, worg_id: &str, by: &str) -> Result<(), DbError>;
    async fn dismiss_workgroup(&self, room_id: &str, worg_id: &str) -> Result<(), DbError>;
    async fn get_assigned_workgroups(&self, room_id: &str) -> Result<Vec<String>, DbError>;
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn get_relation(&self, a: &str, b: &str) -> Result<Option<RelationRecord>, DbError>;
    async fn get_relation_by_id(&self, relation_id: &str)
    -> Result<Option<RelationRecord>, DbError>;
    async fn create_relation(&self, a: &str, b: &str) -> Result<RelationRecord, DbError>;
    async fn assign_relation_room(&self, relation_id: &str, room_id: &str) -> Result<(), DbError>;
    async fn get_relations_for(&self, account_id: &str) -> Result<Vec<RelationRecord>, DbError>;
}

#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn create_invite(
        &self,
        token: &str,
        room_id: &str,
        single_use: bool,
        created_by: &str,
    ) -> Result<(), DbError>;
    async fn check_invite(&self, token: &str, room_id: &str)
    -> Result<Option<InviteRecord>, DbError>;
    async fn invalidate_invite(&self, token: &str) -> Result<(), DbError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(&self, log_key: &str, message: &MessageRecord) -> Result<(), DbError>;
    /// Last `limit` messages, oldest first.
    async fn last_messages(&self, log_key: &str, limit: usize)
    -> Result<Vec<MessageRecord>, DbError>;
    async fn mark_read(&self, log_key: &str, account_id: &str, msg_id: &str)
    -> Result<(), DbError>;
    async fn relation_state(
        &self,
        relation_id: &str,
        account_id: &str,
    ) -> Result<RelationState, DbError>;
}

/// Everything the core needs from storage.
pub trait Store: AccountStore + RoomStore + RelationStore + InviteStore + MessageStore {}

impl<T> Store for T where T: AccountStore + RoomStore + RelationStore + InviteStore + MessageStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_other_side() {
        let rel = RelationRecord {
            client_id: "rel-1".into(),
            account_a: "acc-a".into(),
            account_b: "acc-b".into(),
            room_id: None,
        };
        assert_eq!(rel.other("acc-a"), Some("acc-b"));
        assert_eq!(rel.other("acc-b"), Some("acc-a"));
        assert_eq!(rel.other("acc-c"), None);
    }
}
