use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountId, Error, Session, SessionId};

/// Repository for server-side session records.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    async fn create(&self, session: Session) -> Result<Session, Error>;
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, Error>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, Error>;
    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error>;

    /// Stamp `last_active_at`. Callers throttle this; the repository writes
    /// unconditionally.
    async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), Error>;

    /// Record the latest access token minted for this session so that a bulk
    /// revocation can push it to the revoked-token registry.
    async fn set_access_token(
        &self,
        id: &SessionId,
        access_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    async fn delete(&self, id: &SessionId) -> Result<(), Error>;

    /// Delete every session for the account, returning the deleted rows so
    /// the caller can revoke their outstanding access tokens.
    async fn delete_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error>;

    /// Remove sessions whose `expires_at` is at or before `now`, returning
    /// how many were deleted.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
