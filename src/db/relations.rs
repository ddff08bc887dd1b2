//! Relation repository.
//!
//! A relation pairs two accounts. Pairs are stored with the lexically
//! smaller id in `account_a`, so the UNIQUE constraint holds for the
//! unordered pair no matter which side created it.

use super::{Database, DbError};
use crate::state::uid::{self, new_id};
use crate::store::{RelationRecord, RelationStore};
use async_trait::async_trait;
use sqlx::SqlitePool;

type RelationRow = (String, String, String, Option<String>);

fn from_row((client_id, account_a, account_b, room_id): RelationRow) -> RelationRecord {
    RelationRecord {
        client_id,
        account_a,
        account_b,
        room_id,
    }
}

fn ordered<'s>(a: &'s str, b: &'s str) -> (&'s str, &'s str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Repository for relation operations.
pub struct RelationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RelationRepository<'a> {
    /// Create a new relation repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_pair(&self, a: &str, b: &str) -> Result<Option<RelationRecord>, DbError> {
        let (a, b) = ordered(a, b);
        let row = sqlx::query_as::<_, RelationRow>(
            "SELECT client_id, account_a, account_b, room_id FROM relations WHERE account_a = ? AND account_b = ?",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn find(&self, relation_id: &str) -> Result<Option<RelationRecord>, DbError> {
        let row = sqlx::query_as::<_, RelationRow>(
            "SELECT client_id, account_a, account_b, room_id FROM relations WHERE client_id = ?",
        )
        .bind(relation_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Create the relation for a pair, or return the one that already exists.
    pub async fn create(&self, a: &str, b: &str) -> Result<RelationRecord, DbError> {
        let (a, b) = ordered(a, b);
        sqlx::query(
            r#"
            INSERT INTO relations (client_id, account_a, account_b, room_id, created_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(account_a, account_b) DO NOTHING
            "#,
        )
        .bind(new_id(uid::RELATION))
        .bind(a)
        .bind(b)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        self.find_pair(a, b)
            .await?
            .ok_or_else(|| DbError::Internal(format!("relation {a}/{b} vanished after insert")))
    }

    pub async fn set_room(&self, relation_id: &str, room_id: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE relations SET room_id = ? WHERE client_id = ?")
            .bind(room_id)
            .bind(relation_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn for_account(&self, account_id: &str) -> Result<Vec<RelationRecord>, DbError> {
        let rows = sqlx::query_as::<_, RelationRow>(
            r#"
            SELECT client_id, account_a, account_b, room_id FROM relations
            WHERE account_a = ? OR account_b = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}

#[async_trait]
impl RelationStore for Database {
    async fn get_relation(&self, a: &str, b: &str) -> Result<Option<RelationRecord>, DbError> {
        self.relations().find_pair(a, b).await
    }

    async fn get_relation_by_id(
        &self,
        relation_id: &str,
    ) -> Result<Option<RelationRecord>, DbError> {
        self.relations().find(relation_id).await
    }

    async fn create_relation(&self, a: &str, b: &str) -> Result<RelationRecord, DbError> {
        self.relations().create(a, b).await
    }

    async fn assign_relation_room(&self, relation_id: &str, room_id: &str) -> Result<(), DbError> {
        self.relations().set_room(relation_id, room_id).await
    }

    async fn get_relations_for(&self, account_id: &str) -> Result<Vec<RelationRecord>, DbError> {
        self.relations().for_account(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_unordered_and_unique() {
        let db = Database::new(":memory:").await.unwrap();
        let first = db.create_relation("acc-b", "acc-a").await.unwrap();
        let second = db.create_relation("acc-a", "acc-b").await.unwrap();
        assert_eq!(first.client_id, second.client_id);
        assert_eq!(first.account_a, "acc-a");

        let found = db.get_relation("acc-b", "acc-a").await.unwrap().unwrap();
        assert_eq!(found, first);
        assert_eq!(db.get_relations_for("acc-b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_assign_room() {
        let db = Database::new(":memory:").await.unwrap();
        let rel = db.create_relation("acc-a", "acc-b").await.unwrap();
        assert!(rel.room_id.is_none());
        db.assign_relation_room(&rel.client_id, "cont-1").await.unwrap();
        let rel = db.get_relation_by_id(&rel.client_id).await.unwrap().unwrap();
        assert_eq!(rel.room_id.as_deref(), Some("cont-1"));
    }
}
