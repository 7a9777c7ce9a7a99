use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use vigil_core::{
    error::StorageError, repositories::AccountRepository, Account, AccountId, Error, NewAccount,
};

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteAccount {
    id: String,
    email: String,
    password_hash: Option<String>,
    is_active: bool,
    email_verified_at: Option<i64>,
    failed_login_attempts: i64,
    locked_until: Option<i64>,
    last_failed_login_at: Option<i64>,
    two_factor_enabled: bool,
    refresh_token_hash: Option<String>,
    refresh_token_expires_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteAccount> for Account {
    fn from(account: SqliteAccount) -> Self {
        Account {
            id: AccountId::new(&account.id),
            email: account.email,
            password_hash: account.password_hash,
            is_active: account.is_active,
            email_verified_at: account.email_verified_at.and_then(from_unix),
            failed_login_attempts: account.failed_login_attempts.max(0) as u32,
            locked_until: account.locked_until.and_then(from_unix),
            last_failed_login_at: account.last_failed_login_at.and_then(from_unix),
            two_factor_enabled: account.two_factor_enabled,
            refresh_token_hash: account.refresh_token_hash,
            refresh_token_expires_at: account.refresh_token_expires_at.and_then(from_unix),
            created_at: from_unix(account.created_at).unwrap_or_default(),
            updated_at: from_unix(account.updated_at).unwrap_or_default(),
        }
    }
}

fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            INSERT INTO accounts (id, email, password_hash, email_verified_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING *
            "#,
        )
        .bind(account.id.as_str())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.email_verified_at.map(|dt| dt.timestamp()))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create account");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|a| a.into()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>("SELECT * FROM accounts WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|a| a.into()))
    }

    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            "SELECT * FROM accounts WHERE refresh_token_hash = ?1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|a| a.into()))
    }

    async fn update_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET password_hash = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(password_hash)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn record_failed_login(&self, id: &AccountId, now: DateTime<Utc>) -> Result<u32, Error> {
        // Single statement so racing failures each see a distinct count
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_attempts = failed_login_attempts + 1,
                last_failed_login_at = ?2,
                updated_at = ?2
            WHERE id = ?1
            RETURNING failed_login_attempts
            "#,
        )
        .bind(id.as_str())
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?
        .ok_or(Error::Storage(StorageError::NotFound))?;

        let attempts: i64 = row
            .try_get("failed_login_attempts")
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(attempts.max(0) as u32)
    }

    async fn clear_failed_logins(&self, id: &AccountId) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_attempts = 0, locked_until = NULL, updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn lock(
        &self,
        id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        // Conditional so only one of N racing failures performs the
        // transition (and notifies)
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET locked_until = ?2, updated_at = ?3
            WHERE id = ?1 AND (locked_until IS NULL OR locked_until <= ?3)
            "#,
        )
        .bind(id.as_str())
        .bind(locked_until.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_refresh_token(
        &self,
        id: &AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = ?2, refresh_token_expires_at = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(token_hash)
        .bind(expires_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: &AccountId,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        // Compare-and-swap: exactly one concurrent rotation of the same
        // token wins; the losers see a stale old_hash and zero rows
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = ?3, refresh_token_expires_at = ?4, updated_at = ?5
            WHERE id = ?1 AND refresh_token_hash = ?2
            "#,
        )
        .bind(id.as_str())
        .bind(old_hash)
        .bind(new_hash)
        .bind(expires_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: &AccountId) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = NULL, refresh_token_expires_at = NULL, updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn set_two_factor_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET two_factor_enabled = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(enabled)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn mark_email_verified(&self, id: &AccountId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET email_verified_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(at.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(is_active)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        sqlx::query("DELETE FROM accounts WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }
}
