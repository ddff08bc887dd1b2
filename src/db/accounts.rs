//! Account repository.
//!
//! Accounts are keyed by an opaque client id and looked up by login. A
//! password given at creation is stored as an Argon2 hash.

use super::{Database, DbError};
use crate::state::uid::{self, new_id};
use crate::store::{AccountRecord, AccountStore};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use sqlx::SqlitePool;

type AccountRow = (String, String, String, Option<String>, i64);

fn from_row((client_id, login, name, avatar, created): AccountRow) -> AccountRecord {
    AccountRecord {
        client_id,
        login,
        name,
        avatar,
        created,
    }
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_login(&self, login: &str) -> Result<Option<AccountRecord>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT client_id, login, name, avatar, created_at FROM accounts WHERE login = ?",
        )
        .bind(login)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn find_by_id(&self, client_id: &str) -> Result<Option<AccountRecord>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT client_id, login, name, avatar, created_at FROM accounts WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Create an account. Fails with [`DbError::AccountExists`] on a taken login.
    pub async fn create(
        &self,
        login: &str,
        password: Option<&str>,
        name: &str,
    ) -> Result<AccountRecord, DbError> {
        if self.find_by_login(login).await?.is_some() {
            return Err(DbError::AccountExists(login.to_string()));
        }

        let password_hash = password.map(hash_password).transpose()?;
        let record = AccountRecord {
            client_id: new_id(uid::ACCOUNT),
            login: login.to_string(),
            name: name.to_string(),
            avatar: None,
            created: chrono::Utc::now().timestamp(),
        };

        sqlx::query(
            r#"
            INSERT INTO accounts (client_id, login, name, avatar, password_hash, created_at)
            VALUES (?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&record.client_id)
        .bind(&record.login)
        .bind(&record.name)
        .bind(password_hash)
        .bind(record.created)
        .execute(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn set_name(&self, client_id: &str, name: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE accounts SET name = ? WHERE client_id = ?")
            .bind(name)
            .bind(client_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AccountNotFound(client_id.to_string()));
        }
        Ok(())
    }
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| DbError::InvalidPassword)?;
    Ok(hash.to_string())
}

#[async_trait]
impl AccountStore for Database {
    async fn get_account_by_login(&self, login: &str) -> Result<Option<AccountRecord>, DbError> {
        self.accounts().find_by_login(login).await
    }

    async fn get_account(&self, client_id: &str) -> Result<Option<AccountRecord>, DbError> {
        self.accounts().find_by_id(client_id).await
    }

    async fn get_accounts(&self, client_ids: &[String]) -> Result<Vec<AccountRecord>, DbError> {
        let repo = self.accounts();
        let mut out = Vec::with_capacity(client_ids.len());
        for id in client_ids {
            if let Some(acc) = repo.find_by_id(id).await? {
                out.push(acc);
            }
        }
        Ok(out)
    }

    async fn create_account(
        &self,
        login: &str,
        pass: Option<&str>,
        name: &str,
    ) -> Result<AccountRecord, DbError> {
        self.accounts().create(login, pass, name).await
    }

    async fn update_account_name(&self, client_id: &str, name: &str) -> Result<(), DbError> {
        self.accounts().set_name(client_id, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = Database::new(":memory:").await.unwrap();
        let acc = db.create_account("ann", Some("hunter2"), "Ann").await.unwrap();
        assert!(acc.client_id.starts_with("acc-"));

        let by_login = db.get_account_by_login("ann").await.unwrap().unwrap();
        assert_eq!(by_login, acc);

        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM accounts WHERE login = 'ann'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert!(hash.unwrap().starts_with("$argon2"));
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        db.create_account("ann", None, "Ann").await.unwrap();
        let err = db.create_account("ann", None, "Other").await.unwrap_err();
        assert!(matches!(err, DbError::AccountExists(_)));
    }

    #[tokio::test]
    async fn test_rename() {
        let db = Database::new(":memory:").await.unwrap();
        let acc = db.create_account("bob", None, "Bob").await.unwrap();
        db.update_account_name(&acc.client_id, "Robert").await.unwrap();
        let accs = db.get_accounts(&[acc.client_id.clone()]).await.unwrap();
        assert_eq!(accs[0].name, "Robert");
        assert!(db.update_account_name("acc-none", "x").await.is_err());
    }
}
