use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    error::StorageError, repositories::SecureTokenRepository, AccountId, Error, SecureToken,
    TokenPurpose,
};

pub struct SqliteSecureTokenRepository {
    pool: SqlitePool,
}

impl SqliteSecureTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSecureToken {
    token_hash: String,
    account_id: String,
    purpose: String,
    used_at: Option<i64>,
    expires_at: i64,
    created_at: i64,
}

impl TryFrom<SqliteSecureToken> for SecureToken {
    type Error = Error;

    fn try_from(token: SqliteSecureToken) -> Result<Self, Error> {
        let purpose = TokenPurpose::from_str(&token.purpose).ok_or_else(|| {
            Error::Storage(StorageError::Database(format!(
                "unknown token purpose: {}",
                token.purpose
            )))
        })?;
        Ok(SecureToken {
            token_hash: token.token_hash,
            account_id: AccountId::new(&token.account_id),
            purpose,
            used_at: token.used_at.and_then(|t| DateTime::from_timestamp(t, 0)),
            expires_at: DateTime::from_timestamp(token.expires_at, 0).unwrap_or_default(),
            created_at: DateTime::from_timestamp(token.created_at, 0).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl SecureTokenRepository for SqliteSecureTokenRepository {
    async fn create(&self, token: SecureToken) -> Result<SecureToken, Error> {
        let row = sqlx::query_as::<_, SqliteSecureToken>(
            r#"
            INSERT INTO secure_tokens
                (token_hash, account_id, purpose, used_at, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.account_id.as_str())
        .bind(token.purpose.as_str())
        .bind(token.used_at.map(|t| t.timestamp()))
        .bind(token.expires_at.timestamp())
        .bind(token.created_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create secure token");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        row.try_into()
    }

    async fn peek(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SecureToken>, Error> {
        let row = sqlx::query_as::<_, SqliteSecureToken>(
            "SELECT * FROM secure_tokens WHERE token_hash = ?1 AND purpose = ?2",
        )
        .bind(token_hash)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        row.map(SecureToken::try_from).transpose()
    }

    async fn consume(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        // Conditional on used_at so only one consumer ever wins
        let result = sqlx::query(
            r#"
            UPDATE secure_tokens
            SET used_at = ?3
            WHERE token_hash = ?1 AND purpose = ?2 AND used_at IS NULL
            "#,
        )
        .bind(token_hash)
        .bind(purpose.as_str())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_for_account(
        &self,
        account_id: &AccountId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE secure_tokens
            SET used_at = ?3
            WHERE account_id = ?1 AND purpose = ?2 AND used_at IS NULL
            "#,
        )
        .bind(account_id.as_str())
        .bind(purpose.as_str())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM secure_tokens WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
