//! Invite token repository.

use super::{Database, DbError};
use crate::store::{InviteRecord, InviteStore};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository for invite operations.
pub struct InviteRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InviteRepository<'a> {
    /// Create a new invite repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        token: &str,
        room_id: &str,
        single_use: bool,
        created_by: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO invites (token, room_id, single_use, is_valid, created_by, created_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(token)
        .bind(room_id)
        .bind(single_use)
        .bind(created_by)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Look up a token scoped to a room. Invalidated tokens are still returned.
    pub async fn find_for_room(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<Option<InviteRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, bool, bool, String)>(
            r#"
            SELECT token, room_id, single_use, is_valid, created_by
            FROM invites WHERE token = ? AND room_id = ?
            "#,
        )
        .bind(token)
        .bind(room_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(
            |(token, room_id, single_use, is_valid, created_by)| InviteRecord {
                token,
                room_id,
                single_use,
                is_valid,
                created_by,
            },
        ))
    }

    pub async fn invalidate(&self, token: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE invites SET is_valid = 0 WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl InviteStore for Database {
    async fn create_invite(
        &self,
        token: &str,
        room_id: &str,
        single_use: bool,
        created_by: &str,
    ) -> Result<(), DbError> {
        self.invites()
            .create(token, room_id, single_use, created_by)
            .await
    }

    async fn check_invite(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<Option<InviteRecord>, DbError> {
        self.invites().find_for_room(token, room_id).await
    }

    async fn invalidate_invite(&self, token: &str) -> Result<(), DbError> {
        self.invites().invalidate(token).await
    }
}
