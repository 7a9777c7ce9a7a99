use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    error::StorageError, repositories::LoginHistoryRepository, AccountId, AuthMethod, Error,
    LoginHistoryEntry,
};

pub struct SqliteLoginHistoryRepository {
    pool: SqlitePool,
}

impl SqliteLoginHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteLoginHistoryEntry {
    account_id: Option<String>,
    success: bool,
    failure_reason: Option<String>,
    ip_address: Option<String>,
    auth_method: String,
    created_at: i64,
}

impl TryFrom<SqliteLoginHistoryEntry> for LoginHistoryEntry {
    type Error = Error;

    fn try_from(entry: SqliteLoginHistoryEntry) -> Result<Self, Error> {
        let auth_method = AuthMethod::from_str(&entry.auth_method).ok_or_else(|| {
            Error::Storage(StorageError::Database(format!(
                "unknown auth method: {}",
                entry.auth_method
            )))
        })?;
        Ok(LoginHistoryEntry {
            account_id: entry.account_id.map(|id| AccountId::new(&id)),
            success: entry.success,
            failure_reason: entry.failure_reason,
            ip_address: entry.ip_address,
            auth_method,
            created_at: DateTime::from_timestamp(entry.created_at, 0).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl LoginHistoryRepository for SqliteLoginHistoryRepository {
    async fn record(&self, entry: LoginHistoryEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO login_history
                (account_id, success, failure_reason, ip_address, auth_method, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.account_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(entry.success)
        .bind(&entry.failure_reason)
        .bind(&entry.ip_address)
        .bind(entry.auth_method.as_str())
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record login attempt");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        Ok(())
    }

    async fn list_for_account(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<LoginHistoryEntry>, Error> {
        let rows = sqlx::query_as::<_, SqliteLoginHistoryEntry>(
            r#"
            SELECT account_id, success, failure_reason, ip_address, auth_method, created_at
            FROM login_history
            WHERE account_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        rows.into_iter().map(LoginHistoryEntry::try_from).collect()
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_history WHERE created_at < ?1")
            .bind(before.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
