use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Account, AccountId, Error, NewAccount};

/// Repository for account records, including the brute-force counters and the
/// current refresh token that live on the account row.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    async fn create(&self, account: NewAccount) -> Result<Account, Error>;
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    /// Resolve the account currently holding this refresh token hash.
    async fn find_by_refresh_token_hash(&self, token_hash: &str)
        -> Result<Option<Account>, Error>;

    /// Replace the stored password hash and bump `updated_at`.
    async fn update_password_hash(
        &self,
        id: &AccountId,
        password_hash: &str,
    ) -> Result<(), Error>;

    /// Atomically increment `failed_login_attempts` and stamp
    /// `last_failed_login_at`, returning the post-increment count.
    ///
    /// Must be a single statement in the backing store so that concurrent
    /// failures each observe a distinct count.
    async fn record_failed_login(&self, id: &AccountId, now: DateTime<Utc>) -> Result<u32, Error>;

    /// Reset `failed_login_attempts` to zero and clear `locked_until`.
    async fn clear_failed_logins(&self, id: &AccountId) -> Result<(), Error>;

    /// Set `locked_until`, but only if the account is not already locked at
    /// `now`. Returns `true` when this call performed the transition, so the
    /// caller can emit the lockout notification exactly once.
    async fn lock(
        &self,
        id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Store a new refresh token hash, replacing whatever was there.
    async fn set_refresh_token(
        &self,
        id: &AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Compare-and-swap the refresh token hash: replace `old_hash` with
    /// `new_hash` only if `old_hash` is still the stored value. Returns
    /// `true` on success. Under concurrent rotation of the same token,
    /// exactly one caller wins; the rest see `false`.
    async fn swap_refresh_token(
        &self,
        id: &AccountId,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Clear the stored refresh token, if any.
    async fn clear_refresh_token(&self, id: &AccountId) -> Result<(), Error>;

    /// Flip the `two_factor_enabled` flag on the account row.
    async fn set_two_factor_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), Error>;

    async fn mark_email_verified(&self, id: &AccountId, at: DateTime<Utc>) -> Result<(), Error>;
    async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), Error>;
    async fn delete(&self, id: &AccountId) -> Result<(), Error>;
}
