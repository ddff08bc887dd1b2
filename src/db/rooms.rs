//! Room repository: persistent room configs, settings, authorizations and
//! assigned workgroups.

use super::{Database, DbError};
use crate::store::{AuthorizedUser, RoomMembership, RoomRecord, RoomStore};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

/// Repository for room operations.
pub struct RoomRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoomRepository<'a> {
    /// Create a new room repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, room_id: &str) -> Result<Option<RoomRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, bool)>(
            "SELECT client_id, name, owner_id, is_private FROM rooms WHERE client_id = ?",
        )
        .bind(room_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(client_id, name, owner_id, is_private)| RoomRecord {
            client_id,
            name,
            owner_id,
            is_private,
        }))
    }

    /// Insert or update a room config.
    pub async fn upsert(
        &self,
        room_id: &str,
        name: &str,
        owner_id: &str,
        is_private: bool,
    ) -> Result<RoomRecord, DbError> {
        sqlx::query(
            r#"
            INSERT INTO rooms (client_id, name, owner_id, is_private, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(client_id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(room_id)
        .bind(name)
        .bind(owner_id)
        .bind(is_private)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        Ok(RoomRecord {
            client_id: room_id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            is_private,
        })
    }

    pub async fn rename(&self, room_id: &str, name: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE rooms SET name = ? WHERE client_id = ?")
            .bind(name)
            .bind(room_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Load all settings. Values are stored as JSON text.
    pub async fn settings(&self, room_id: &str) -> Result<Map<String, Value>, DbError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM room_settings WHERE room_id = ?",
        )
        .bind(room_id)
        .fetch_all(self.pool)
        .await?;

        let mut out = Map::new();
        for (key, raw) in rows {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    out.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(room_id = %room_id, key = %key, error = %e, "Skipping unreadable room setting");
                }
            }
        }
        Ok(out)
    }

    pub async fn set_setting(&self, room_id: &str, key: &str, value: &Value) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO room_settings (room_id, key, value) VALUES (?, ?, ?)
            ON CONFLICT(room_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(room_id)
        .bind(key)
        .bind(value.to_string())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Grant access to several accounts in one transaction.
    pub async fn authorize(&self, room_id: &str, account_ids: &[String]) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for account_id in account_ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO room_authorizations (room_id, account_id, granted_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(room_id)
            .bind(account_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn revoke(&self, room_id: &str, account_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM room_authorizations WHERE room_id = ? AND account_id = ?")
            .bind(room_id)
            .bind(account_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_authorized(&self, room_id: &str, account_id: &str) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM room_authorizations WHERE room_id = ? AND account_id = ?",
        )
        .bind(room_id)
        .bind(account_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Authorized accounts joined with their identity, in grant order.
    pub async fn authorizations(&self, room_id: &str) -> Result<Vec<AuthorizedUser>, DbError> {
        let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
            r#"
            SELECT ra.account_id, a.name, a.avatar
            FROM room_authorizations ra
            LEFT JOIN accounts a ON a.client_id = ra.account_id
            WHERE ra.room_id = ?
            ORDER BY ra.granted_at, ra.rowid
            "#,
        )
        .bind(room_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(client_id, name, avatar)| AuthorizedUser {
                client_id,
                name: name.unwrap_or_default(),
                avatar,
            })
            .collect())
    }

    /// Non-private rooms reachable by an account, directly or through a workgroup.
    pub async fn for_account(
        &self,
        account_id: &str,
        workgroup_ids: &[String],
    ) -> Result<Vec<RoomMembership>, DbError> {
        let direct: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.client_id FROM rooms r
            JOIN room_authorizations ra ON ra.room_id = r.client_id
            WHERE ra.account_id = ? AND r.is_private = 0
            ORDER BY r.client_id
            "#,
        )
        .bind(account_id)
        .fetch_all(self.pool)
        .await?;

        let mut out: Vec<RoomMembership> = direct
            .into_iter()
            .map(|room_id| RoomMembership {
                room_id,
                via_workgroup: false,
            })
            .collect();

        for worg_id in workgroup_ids {
            let rooms: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT r.client_id FROM rooms r
                JOIN room_workgroups rw ON rw.room_id = r.client_id
                WHERE rw.worg_id = ? AND r.is_private = 0
                "#,
            )
            .bind(worg_id)
            .fetch_all(self.pool)
            .await?;
            for room_id in rooms {
                if !out.iter().any(|m| m.room_id == room_id) {
                    out.push(RoomMembership {
                        room_id,
                        via_workgroup: true,
                    });
                }
            }
        }
        Ok(out)
    }

    pub async fn assign_workgroup(&self, room_id: &str, worg_id: &str, by: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO room_workgroups (room_id, worg_id, assigned_by, assigned_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(room_id)
        .bind(worg_id)
        .bind(by)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn dismiss_workgroup(&self, room_id: &str, worg_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM room_workgroups WHERE room_id = ? AND worg_id = ?")
            .bind(room_id)
            .bind(worg_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn workgroups(&self, room_id: &str) -> Result<Vec<String>, DbError> {
        Ok(sqlx::query_scalar(
            "SELECT worg_id FROM room_workgroups WHERE room_id = ? ORDER BY assigned_at, rowid",
        )
        .bind(room_id)
        .fetch_all(self.pool)
        .await?)
    }
}

#[async_trait]
impl RoomStore for Database {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, DbError> {
        self.rooms().find(room_id).await
    }

    async fn set_room(
        &self,
        room_id: &str,
        name: &str,
        owner_id: &str,
        is_private: bool,
    ) -> Result<RoomRecord, DbError> {
        self.rooms().upsert(room_id, name, owner_id, is_private).await
    }

    async fn rename_room(&self, room_id: &str, name: &str) -> Result<(), DbError> {
        self.rooms().rename(room_id, name).await
    }

    async fn get_settings(&self, room_id: &str) -> Result<Map<String, Value>, DbError> {
        self.rooms().settings(room_id).await
    }

    async fn set_setting(&self, room_id: &str, key: &str, value: &Value) -> Result<(), DbError> {
        self.rooms().set_setting(room_id, key, value).await
    }

    async fn authorize(&self, room_id: &str, account_ids: &[String]) -> Result<(), DbError> {
        self.rooms().authorize(room_id, account_ids).await
    }

    async fn revoke(&self, room_id: &str, account_id: &str) -> Result<(), DbError> {
        self.rooms().revoke(room_id, account_id).await
    }

    async fn check_authorized(&self, room_id: &str, account_id: &str) -> Result<bool, DbError> {
        self.rooms().is_authorized(room_id, account_id).await
    }

    async fn load_authorizations(&self, room_id: &str) -> Result<Vec<AuthorizedUser>, DbError> {
        self.rooms().authorizations(room_id).await
    }

    async fn get_rooms_for_account(
        &self,
        account_id: &str,
        workgroup_ids: &[String],
    ) -> Result<Vec<RoomMembership>, DbError> {
        self.rooms().for_account(account_id, workgroup_ids).await
    }

    async fn assign_workgroup(&self, room_id: &str, worg_id: &str, by: &str) -> Result<(), DbError> {
        self.rooms().assign_workgroup(room_id, worg_id, by).await
    }

    async fn dismiss_workgroup(&self, room_id: &str, worg_id: &str) -> Result<(), DbError> {
        self.rooms().dismiss_workgroup(room_id, worg_id).await
    }

    async fn get_assigned_workgroups(&self, room_id: &str) -> Result<Vec<String>, DbError> {
        self.rooms().workgroups(room_id).await
    }
}
