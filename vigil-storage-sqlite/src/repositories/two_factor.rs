use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use vigil_core::{
    error::StorageError, repositories::TwoFactorRepository, AccountId, Error, TwoFactorRecord,
};

pub struct SqliteTwoFactorRepository {
    pool: SqlitePool,
}

impl SqliteTwoFactorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteTwoFactorRecord {
    account_id: String,
    encrypted_secret: Vec<u8>,
    is_enabled: bool,
    failed_attempts: i64,
    locked_until: Option<i64>,
    last_used_step: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteTwoFactorRecord> for TwoFactorRecord {
    fn from(record: SqliteTwoFactorRecord) -> Self {
        TwoFactorRecord {
            account_id: AccountId::new(&record.account_id),
            encrypted_secret: record.encrypted_secret,
            is_enabled: record.is_enabled,
            failed_attempts: record.failed_attempts.max(0) as u32,
            locked_until: record.locked_until.and_then(|t| DateTime::from_timestamp(t, 0)),
            last_used_step: record.last_used_step,
            created_at: DateTime::from_timestamp(record.created_at, 0).unwrap_or_default(),
            updated_at: DateTime::from_timestamp(record.updated_at, 0).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TwoFactorRepository for SqliteTwoFactorRepository {
    async fn upsert(&self, record: TwoFactorRecord) -> Result<TwoFactorRecord, Error> {
        let row = sqlx::query_as::<_, SqliteTwoFactorRecord>(
            r#"
            INSERT INTO two_factor
                (account_id, encrypted_secret, is_enabled, failed_attempts,
                 locked_until, last_used_step, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(account_id) DO UPDATE SET
                encrypted_secret = excluded.encrypted_secret,
                is_enabled = excluded.is_enabled,
                failed_attempts = excluded.failed_attempts,
                locked_until = excluded.locked_until,
                last_used_step = excluded.last_used_step,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(record.account_id.as_str())
        .bind(&record.encrypted_secret)
        .bind(record.is_enabled)
        .bind(record.failed_attempts as i64)
        .bind(record.locked_until.map(|t| t.timestamp()))
        .bind(record.last_used_step)
        .bind(record.created_at.timestamp())
        .bind(record.updated_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to upsert two-factor record");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        Ok(row.into())
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<TwoFactorRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteTwoFactorRecord>(
            "SELECT * FROM two_factor WHERE account_id = ?1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|r| r.into()))
    }

    async fn set_enabled(
        &self,
        account_id: &AccountId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE two_factor SET is_enabled = ?2, updated_at = ?3 WHERE account_id = ?1")
            .bind(account_id.as_str())
            .bind(enabled)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let row = sqlx::query(
            r#"
            UPDATE two_factor
            SET failed_attempts = failed_attempts + 1, updated_at = ?2
            WHERE account_id = ?1
            RETURNING failed_attempts
            "#,
        )
        .bind(account_id.as_str())
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?
        .ok_or(Error::Storage(StorageError::NotFound))?;

        let attempts: i64 = row
            .try_get("failed_attempts")
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(attempts.max(0) as u32)
    }

    async fn clear_failed_attempts(&self, account_id: &AccountId) -> Result<(), Error> {
        sqlx::query(
            "UPDATE two_factor SET failed_attempts = 0, locked_until = NULL WHERE account_id = ?1",
        )
        .bind(account_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn lock(
        &self,
        account_id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE two_factor
            SET locked_until = ?2, updated_at = ?3
            WHERE account_id = ?1 AND (locked_until IS NULL OR locked_until <= ?3)
            "#,
        )
        .bind(account_id.as_str())
        .bind(locked_until.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_last_used_step(
        &self,
        account_id: &AccountId,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        // Strictly monotonic: a step at or below the stored one is a replay
        let result = sqlx::query(
            r#"
            UPDATE two_factor
            SET last_used_step = ?2, updated_at = ?3
            WHERE account_id = ?1 AND last_used_step < ?2
            "#,
        )
        .bind(account_id.as_str())
        .bind(step)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_backup_codes(
        &self,
        account_id: &AccountId,
        code_hashes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        sqlx::query("DELETE FROM two_factor_backup_codes WHERE account_id = ?1")
            .bind(account_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        for hash in code_hashes {
            sqlx::query(
                "INSERT INTO two_factor_backup_codes (account_id, code_hash, created_at) VALUES (?1, ?2, ?3)",
            )
            .bind(account_id.as_str())
            .bind(&hash)
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn consume_backup_code(
        &self,
        account_id: &AccountId,
        code_hash: &str,
    ) -> Result<bool, Error> {
        // Atomic delete: each code succeeds for exactly one caller
        let result = sqlx::query(
            "DELETE FROM two_factor_backup_codes WHERE account_id = ?1 AND code_hash = ?2",
        )
        .bind(account_id.as_str())
        .bind(code_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_backup_codes(&self, account_id: &AccountId) -> Result<u32, Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM two_factor_backup_codes WHERE account_id = ?1",
        )
        .bind(account_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(count.max(0) as u32)
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<(), Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        sqlx::query("DELETE FROM two_factor WHERE account_id = ?1")
            .bind(account_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        sqlx::query("DELETE FROM two_factor_backup_codes WHERE account_id = ?1")
            .bind(account_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        tx.commit()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }
}
