use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    error::StorageError, repositories::RevokedTokenRepository, AccountId, Error, RevocationReason,
    RevokedToken,
};

pub struct SqliteRevokedTokenRepository {
    pool: SqlitePool,
}

impl SqliteRevokedTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteRevokedToken {
    token_hash: String,
    account_id: String,
    reason: String,
    expires_at: i64,
    revoked_at: i64,
}

impl TryFrom<SqliteRevokedToken> for RevokedToken {
    type Error = Error;

    fn try_from(token: SqliteRevokedToken) -> Result<Self, Error> {
        let reason = RevocationReason::from_str(&token.reason).ok_or_else(|| {
            Error::Storage(StorageError::Database(format!(
                "unknown revocation reason: {}",
                token.reason
            )))
        })?;
        Ok(RevokedToken {
            token_hash: token.token_hash,
            account_id: AccountId::new(&token.account_id),
            reason,
            expires_at: DateTime::from_timestamp(token.expires_at, 0).unwrap_or_default(),
            revoked_at: DateTime::from_timestamp(token.revoked_at, 0).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl RevokedTokenRepository for SqliteRevokedTokenRepository {
    async fn revoke(&self, token: RevokedToken) -> Result<(), Error> {
        // OR IGNORE makes double revocation a no-op
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO revoked_tokens
                (token_hash, account_id, reason, expires_at, revoked_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.account_id.as_str())
        .bind(token.reason.as_str())
        .bind(token.expires_at.timestamp())
        .bind(token.revoked_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to revoke token");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        Ok(())
    }

    async fn revoke_all(&self, tokens: Vec<RevokedToken>) -> Result<(), Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        for token in tokens {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO revoked_tokens
                    (token_hash, account_id, reason, expires_at, revoked_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&token.token_hash)
            .bind(token.account_id.as_str())
            .bind(token.reason.as_str())
            .bind(token.expires_at.timestamp())
            .bind(token.revoked_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        // An entry past the token's own expiry is as good as absent
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM revoked_tokens WHERE token_hash = ?1 AND expires_at > ?2",
        )
        .bind(token_hash)
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(row.is_some())
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<RevokedToken>, Error> {
        let rows = sqlx::query_as::<_, SqliteRevokedToken>(
            "SELECT * FROM revoked_tokens WHERE account_id = ?1 ORDER BY revoked_at DESC",
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        rows.into_iter().map(RevokedToken::try_from).collect()
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
