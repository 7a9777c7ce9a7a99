use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AccountId, Error, TwoFactorRecord};

/// Repository for TOTP enrollment records and hashed backup codes.
#[async_trait]
pub trait TwoFactorRepository: Send + Sync + 'static {
    /// Insert or replace the enrollment record for an account. Re-enrolling
    /// overwrites a pending (not yet confirmed) record.
    async fn upsert(&self, record: TwoFactorRecord) -> Result<TwoFactorRecord, Error>;

    async fn find_by_account(&self, account_id: &AccountId)
        -> Result<Option<TwoFactorRecord>, Error>;

    /// Flip `is_enabled` after a successful enrollment confirmation.
    async fn set_enabled(
        &self,
        account_id: &AccountId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Atomically increment the failed-code counter, returning the
    /// post-increment count.
    async fn record_failed_attempt(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<u32, Error>;

    /// Reset the failed-code counter and clear any lock.
    async fn clear_failed_attempts(&self, account_id: &AccountId) -> Result<(), Error>;

    /// Lock two-factor verification until `locked_until`, only if not
    /// already locked at `now`. Returns `true` when this call locked.
    async fn lock(
        &self,
        account_id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Advance `last_used_step` to `step`, only if `step` is strictly
    /// greater than the stored value. Returns `true` on advance; `false`
    /// means the step was already used and the code is a replay.
    async fn advance_last_used_step(
        &self,
        account_id: &AccountId,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Replace the account's backup codes with the given hashes.
    async fn replace_backup_codes(
        &self,
        account_id: &AccountId,
        code_hashes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Atomically delete the backup code matching `code_hash`. Returns
    /// `true` when a code was consumed; each code can succeed at most once.
    async fn consume_backup_code(
        &self,
        account_id: &AccountId,
        code_hash: &str,
    ) -> Result<bool, Error>;

    /// How many unused backup codes remain.
    async fn count_backup_codes(&self, account_id: &AccountId) -> Result<u32, Error>;

    /// Remove the enrollment record and all backup codes.
    async fn delete_for_account(&self, account_id: &AccountId) -> Result<(), Error>;
}
