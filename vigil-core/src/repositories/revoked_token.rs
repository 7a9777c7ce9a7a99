use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountId, Error, RevokedToken};

/// Registry of revoked token hashes, consulted on every access-token
/// verification. Entries only need to live until the underlying token's own
/// expiry, after which `cleanup_expired` reclaims them.
#[async_trait]
pub trait RevokedTokenRepository: Send + Sync + 'static {
    /// Insert a revocation entry. Revoking a token that is already revoked
    /// is a no-op, not an error.
    async fn revoke(&self, token: RevokedToken) -> Result<(), Error>;

    /// Insert many entries in one round trip, with the same idempotency.
    async fn revoke_all(&self, tokens: Vec<RevokedToken>) -> Result<(), Error>;

    /// Whether a live revocation entry exists for this hash. Entries whose
    /// `expires_at` has passed are treated as absent even before cleanup
    /// reclaims them.
    async fn is_revoked(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, Error>;
    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<RevokedToken>, Error>;

    /// Remove entries whose `expires_at` is at or before `now`, returning
    /// how many were deleted.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
