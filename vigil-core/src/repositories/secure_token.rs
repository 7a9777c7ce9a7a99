use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountId, Error, SecureToken, TokenPurpose};

/// Repository for one-time, purpose-scoped tokens such as the two-factor
/// challenge issued between password verification and code entry.
#[async_trait]
pub trait SecureTokenRepository: Send + Sync + 'static {
    async fn create(&self, token: SecureToken) -> Result<SecureToken, Error>;

    /// Look up a token by hash and purpose without consuming it. Returns the
    /// row even if used or expired; the caller decides what that means.
    async fn peek(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SecureToken>, Error>;

    /// Mark the token used, but only if it is currently unused. Returns
    /// `true` when this call consumed it. A second consumer sees `false`.
    async fn consume(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Invalidate all unused tokens of a purpose for an account, e.g. when a
    /// fresh challenge supersedes outstanding ones.
    async fn invalidate_for_account(
        &self,
        account_id: &AccountId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Remove tokens whose `expires_at` is at or before `now`, returning how
    /// many were deleted.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
