//! Chat log repository.
//!
//! Logs are keyed by room id, or by relation id for 1:1 rooms, so that the
//! history of a pair survives its room being recreated.

use super::{Database, DbError};
use crate::store::{MessageRecord, MessageStore, RelationState};
use async_trait::async_trait;
use sqlx::SqlitePool;

type MessageRow = (String, String, String, String, i64);

fn from_row((msg_id, from_id, name, message, time): MessageRow) -> MessageRecord {
    MessageRecord {
        msg_id,
        from_id,
        name,
        message,
        time,
    }
}

/// Repository for chat log operations.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, log_key: &str, msg: &MessageRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO messages (log_key, msg_id, from_id, name, message, time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log_key)
        .bind(&msg.msg_id)
        .bind(&msg.from_id)
        .bind(&msg.name)
        .bind(&msg.message)
        .bind(msg.time)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Last `limit` messages, oldest first.
    pub async fn last(&self, log_key: &str, limit: usize) -> Result<Vec<MessageRecord>, DbError> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT msg_id, from_id, name, message, time FROM messages
            WHERE log_key = ? ORDER BY seq DESC LIMIT ?
            "#,
        )
        .bind(log_key)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;
        rows.reverse();
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn mark_read(&self, log_key: &str, account_id: &str, msg_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO read_markers (log_key, account_id, msg_id) VALUES (?, ?, ?)
            ON CONFLICT(log_key, account_id) DO UPDATE SET msg_id = excluded.msg_id
            "#,
        )
        .bind(log_key)
        .bind(account_id)
        .bind(msg_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Unread count (messages from the other side after the read marker) and last message.
    pub async fn relation_state(
        &self,
        relation_id: &str,
        account_id: &str,
    ) -> Result<RelationState, DbError> {
        let last_read: Option<String> = sqlx::query_scalar(
            "SELECT msg_id FROM read_markers WHERE log_key = ? AND account_id = ?",
        )
        .bind(relation_id)
        .bind(account_id)
        .fetch_optional(self.pool)
        .await?;

        let unread: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE log_key = ? AND from_id != ?
              AND seq > COALESCE((SELECT seq FROM messages WHERE msg_id = ?), 0)
            "#,
        )
        .bind(relation_id)
        .bind(account_id)
        .bind(last_read.as_deref())
        .fetch_one(self.pool)
        .await?;

        let last_message = self.last(relation_id, 1).await?.pop();

        Ok(RelationState {
            unread: unread.max(0) as u64,
            last_read,
            last_message,
        })
    }
}

#[async_trait]
impl MessageStore for Database {
    async fn append_message(&self, log_key: &str, message: &MessageRecord) -> Result<(), DbError> {
        self.messages().append(log_key, message).await
    }

    async fn last_messages(
        &self,
        log_key: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, DbError> {
        self.messages().last(log_key, limit).await
    }

    async fn mark_read(
        &self,
        log_key: &str,
        account_id: &str,
        msg_id: &str,
    ) -> Result<(), DbError> {
        self.messages().mark_read(log_key, account_id, msg_id).await
    }

    async fn relation_state(
        &self,
        relation_id: &str,
        account_id: &str,
    ) -> Result<RelationState, DbError> {
        self.messages().relation_state(relation_id, account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, from: &str, time: i64) -> MessageRecord {
        MessageRecord {
            msg_id: id.into(),
            from_id: from.into(),
            name: from.into(),
            message: format!("message {id}"),
            time,
        }
    }

    #[tokio::test]
    async fn test_last_is_oldest_first() {
        let db = Database::new(":memory:").await.unwrap();
        for (i, id) in ["m1", "m2", "m3"].iter().enumerate() {
            db.append_message("room-1", &msg(id, "acc-a", i as i64)).await.unwrap();
        }
        let last = db.last_messages("room-1", 2).await.unwrap();
        let ids: Vec<_> = last.iter().map(|m| m.msg_id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_relation_unread() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("presence.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();

        db.append_message("rel-1", &msg("m1", "acc-b", 1)).await.unwrap();
        db.append_message("rel-1", &msg("m2", "acc-a", 2)).await.unwrap();
        db.append_message("rel-1", &msg("m3", "acc-b", 3)).await.unwrap();

        let state = db.relation_state("rel-1", "acc-a").await.unwrap();
        assert_eq!(state.unread, 2);
        assert_eq!(state.last_message.as_ref().unwrap().msg_id, "m3");

        db.mark_read("rel-1", "acc-a", "m1").await.unwrap();
        let state = db.relation_state("rel-1", "acc-a").await.unwrap();
        assert_eq!(state.unread, 1);
        assert_eq!(state.last_read.as_deref(), Some("m1"));
    }
}
