use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    error::StorageError, repositories::SessionRepository, AccountId, Error, Session, SessionId,
};

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSession {
    id: String,
    account_id: String,
    token_hash: String,
    access_token_hash: Option<String>,
    access_token_expires_at: Option<i64>,
    device_info: Option<String>,
    ip_address: Option<String>,
    last_active_at: i64,
    expires_at: i64,
    created_at: i64,
}

impl From<SqliteSession> for Session {
    fn from(session: SqliteSession) -> Self {
        Session {
            id: SessionId::new(&session.id),
            account_id: AccountId::new(&session.account_id),
            token_hash: session.token_hash,
            access_token_hash: session.access_token_hash,
            access_token_expires_at: session
                .access_token_expires_at
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            device_info: session.device_info,
            ip_address: session.ip_address,
            last_active_at: DateTime::from_timestamp(session.last_active_at, 0)
                .unwrap_or_default(),
            expires_at: DateTime::from_timestamp(session.expires_at, 0).unwrap_or_default(),
            created_at: DateTime::from_timestamp(session.created_at, 0).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        let row = sqlx::query_as::<_, SqliteSession>(
            r#"
            INSERT INTO sessions
                (id, account_id, token_hash, device_info, ip_address,
                 last_active_at, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.account_id.as_str())
        .bind(&session.token_hash)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.last_active_at.timestamp())
        .bind(session.expires_at.timestamp())
        .bind(session.created_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create session");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, SqliteSession>("SELECT * FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|s| s.into()))
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, Error> {
        let row =
            sqlx::query_as::<_, SqliteSession>("SELECT * FROM sessions WHERE token_hash = ?1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.map(|s| s.into()))
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query_as::<_, SqliteSession>(
            "SELECT * FROM sessions WHERE account_id = ?1 ORDER BY last_active_at DESC",
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(rows.into_iter().map(|s| s.into()).collect())
    }

    async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE sessions SET last_active_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(at.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn set_access_token(
        &self,
        id: &SessionId,
        access_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET access_token_hash = ?2, access_token_expires_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(access_token_hash)
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        // RETURNING hands back the deleted rows so the caller can revoke
        // their outstanding access tokens
        let rows = sqlx::query_as::<_, SqliteSession>(
            "DELETE FROM sessions WHERE account_id = ?1 RETURNING *",
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(rows.into_iter().map(|s| s.into()).collect())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
