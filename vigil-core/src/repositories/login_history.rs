use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountId, Error, LoginHistoryEntry};

/// Append-only log of authentication attempts.
#[async_trait]
pub trait LoginHistoryRepository: Send + Sync + 'static {
    async fn record(&self, entry: LoginHistoryEntry) -> Result<(), Error>;

    /// Most recent entries for an account, newest first.
    async fn list_for_account(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<LoginHistoryEntry>, Error>;

    /// Remove entries older than `before`, returning how many were deleted.
    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
