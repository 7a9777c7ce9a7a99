//! Token revocation registry
//!
//! JWTs are stateless, so invalidating one before expiry requires a
//! blacklist. Entries are keyed by token hash and carry the token's natural
//! expiry; once that passes the entry is garbage and the cleanup sweep will
//! reclaim it. Revoking an already-revoked token is a no-op.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    crypto,
    error::Error,
    repositories::RevokedTokenRepository,
    AccountId, Clock, RevocationReason, RevokedToken, Session,
};

pub struct RevocationService<R: RevokedTokenRepository> {
    revoked: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R: RevokedTokenRepository> RevocationService<R> {
    pub fn new(revoked: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { revoked, clock }
    }

    /// Blacklist a raw token until its natural expiry.
    pub async fn revoke_token(
        &self,
        raw_token: &str,
        account_id: &AccountId,
        reason: RevocationReason,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.revoke_hash(&crypto::hash_token(raw_token), account_id, reason, expires_at)
            .await
    }

    /// Blacklist a token already in hashed form.
    pub async fn revoke_hash(
        &self,
        token_hash: &str,
        account_id: &AccountId,
        reason: RevocationReason,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.revoked
            .revoke(RevokedToken {
                token_hash: token_hash.to_string(),
                account_id: account_id.clone(),
                reason,
                expires_at,
                revoked_at: self.clock.now(),
            })
            .await?;
        tracing::info!(account_id = %account_id, reason = %reason, "Token revoked");
        Ok(())
    }

    /// Blacklist the outstanding access tokens of a batch of (just deleted)
    /// sessions. Sessions that never recorded an access token, or whose
    /// token has already expired, contribute nothing.
    pub async fn revoke_session_tokens(
        &self,
        sessions: &[Session],
        reason: RevocationReason,
    ) -> Result<usize, Error> {
        let now = self.clock.now();
        let entries: Vec<RevokedToken> = sessions
            .iter()
            .filter_map(|s| {
                let hash = s.access_token_hash.clone()?;
                let expires_at = s.access_token_expires_at?;
                (expires_at > now).then(|| RevokedToken {
                    token_hash: hash,
                    account_id: s.account_id.clone(),
                    reason,
                    expires_at,
                    revoked_at: now,
                })
            })
            .collect();

        let count = entries.len();
        if count > 0 {
            self.revoked.revoke_all(entries).await?;
        }
        Ok(count)
    }

    /// Whether a raw token has a live revocation entry. Entries past their
    /// natural expiry no longer count, even before the cleanup sweep runs.
    pub async fn is_revoked(&self, raw_token: &str) -> Result<bool, Error> {
        self.revoked
            .is_revoked(&crypto::hash_token(raw_token), self.clock.now())
            .await
    }

    pub async fn is_hash_revoked(&self, token_hash: &str) -> Result<bool, Error> {
        self.revoked.is_revoked(token_hash, self.clock.now()).await
    }

    /// Drop entries whose underlying token has expired anyway.
    pub async fn cleanup_expired(&self) -> Result<u64, Error> {
        let purged = self.revoked.cleanup_expired(self.clock.now()).await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired revocation entries");
        }
        Ok(purged)
    }
}
