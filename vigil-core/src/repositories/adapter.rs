//! Adapters that implement individual repository traits on top of a
//! [`RepositoryProvider`].
//!
//! Services are generic over single repository traits so they can be unit
//! tested against in-memory mocks. At assembly time each service is handed
//! one of these adapters, which holds the shared provider and forwards calls
//! to the relevant repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;

use crate::repositories::{
    AccountRepository, AccountRepositoryProvider, IpBlockRepository, IpBlockRepositoryProvider,
    LoginHistoryRepository, LoginHistoryRepositoryProvider, RevokedTokenRepository,
    RevokedTokenRepositoryProvider, SecureTokenRepository, SecureTokenRepositoryProvider,
    SessionRepository, SessionRepositoryProvider, TwoFactorRepository,
    TwoFactorRepositoryProvider,
};
use crate::{
    Account, AccountId, BlockType, Error, IpBlockEntry, LoginHistoryEntry, NewAccount,
    RevokedToken, SecureToken, Session, SessionId, TokenPurpose, TwoFactorRecord,
};

/// Forwards [`AccountRepository`] calls to the provider's account repository.
pub struct AccountRepositoryAdapter<P: AccountRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: AccountRepositoryProvider> AccountRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: AccountRepositoryProvider> AccountRepository for AccountRepositoryAdapter<P> {
    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        self.provider.account().create(account).await
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_email(email).await
    }

    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, Error> {
        self.provider
            .account()
            .find_by_refresh_token_hash(token_hash)
            .await
    }

    async fn update_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        self.provider
            .account()
            .update_password_hash(id, password_hash)
            .await
    }

    async fn record_failed_login(&self, id: &AccountId, now: DateTime<Utc>) -> Result<u32, Error> {
        self.provider.account().record_failed_login(id, now).await
    }

    async fn clear_failed_logins(&self, id: &AccountId) -> Result<(), Error> {
        self.provider.account().clear_failed_logins(id).await
    }

    async fn lock(
        &self,
        id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider.account().lock(id, locked_until, now).await
    }

    async fn set_refresh_token(
        &self,
        id: &AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.provider
            .account()
            .set_refresh_token(id, token_hash, expires_at)
            .await
    }

    async fn swap_refresh_token(
        &self,
        id: &AccountId,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .account()
            .swap_refresh_token(id, old_hash, new_hash, expires_at)
            .await
    }

    async fn clear_refresh_token(&self, id: &AccountId) -> Result<(), Error> {
        self.provider.account().clear_refresh_token(id).await
    }

    async fn set_two_factor_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), Error> {
        self.provider
            .account()
            .set_two_factor_enabled(id, enabled)
            .await
    }

    async fn mark_email_verified(&self, id: &AccountId, at: DateTime<Utc>) -> Result<(), Error> {
        self.provider.account().mark_email_verified(id, at).await
    }

    async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), Error> {
        self.provider.account().set_active(id, is_active).await
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        self.provider.account().delete(id).await
    }
}

/// Forwards [`SessionRepository`] calls to the provider's session repository.
pub struct SessionRepositoryAdapter<P: SessionRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: SessionRepositoryProvider> SessionRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: SessionRepositoryProvider> SessionRepository for SessionRepositoryAdapter<P> {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.provider.session().create(session).await
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        self.provider.session().find_by_id(id).await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, Error> {
        self.provider.session().find_by_token_hash(token_hash).await
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        self.provider.session().list_for_account(account_id).await
    }

    async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        self.provider.session().touch(id, at).await
    }

    async fn set_access_token(
        &self,
        id: &SessionId,
        access_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.provider
            .session()
            .set_access_token(id, access_token_hash, expires_at)
            .await
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        self.provider.session().delete(id).await
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        self.provider.session().delete_for_account(account_id).await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.session().cleanup_expired(now).await
    }
}

/// Forwards [`RevokedTokenRepository`] calls to the provider's registry.
pub struct RevokedTokenRepositoryAdapter<P: RevokedTokenRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: RevokedTokenRepositoryProvider> RevokedTokenRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: RevokedTokenRepositoryProvider> RevokedTokenRepository
    for RevokedTokenRepositoryAdapter<P>
{
    async fn revoke(&self, token: RevokedToken) -> Result<(), Error> {
        self.provider.revoked_tokens().revoke(token).await
    }

    async fn revoke_all(&self, tokens: Vec<RevokedToken>) -> Result<(), Error> {
        self.provider.revoked_tokens().revoke_all(tokens).await
    }

    async fn is_revoked(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        self.provider
            .revoked_tokens()
            .is_revoked(token_hash, now)
            .await
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<RevokedToken>, Error> {
        self.provider
            .revoked_tokens()
            .list_for_account(account_id)
            .await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.revoked_tokens().cleanup_expired(now).await
    }
}

/// Forwards [`SecureTokenRepository`] calls to the provider's token store.
pub struct SecureTokenRepositoryAdapter<P: SecureTokenRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: SecureTokenRepositoryProvider> SecureTokenRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: SecureTokenRepositoryProvider> SecureTokenRepository for SecureTokenRepositoryAdapter<P> {
    async fn create(&self, token: SecureToken) -> Result<SecureToken, Error> {
        self.provider.secure_tokens().create(token).await
    }

    async fn peek(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SecureToken>, Error> {
        self.provider.secure_tokens().peek(token_hash, purpose).await
    }

    async fn consume(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .secure_tokens()
            .consume(token_hash, purpose, now)
            .await
    }

    async fn invalidate_for_account(
        &self,
        account_id: &AccountId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.provider
            .secure_tokens()
            .invalidate_for_account(account_id, purpose, now)
            .await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.secure_tokens().cleanup_expired(now).await
    }
}

/// Forwards [`TwoFactorRepository`] calls to the provider's two-factor store.
pub struct TwoFactorRepositoryAdapter<P: TwoFactorRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: TwoFactorRepositoryProvider> TwoFactorRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: TwoFactorRepositoryProvider> TwoFactorRepository for TwoFactorRepositoryAdapter<P> {
    async fn upsert(&self, record: TwoFactorRecord) -> Result<TwoFactorRecord, Error> {
        self.provider.two_factor().upsert(record).await
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<TwoFactorRecord>, Error> {
        self.provider.two_factor().find_by_account(account_id).await
    }

    async fn set_enabled(
        &self,
        account_id: &AccountId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.provider
            .two_factor()
            .set_enabled(account_id, enabled, now)
            .await
    }

    async fn record_failed_attempt(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<u32, Error> {
        self.provider
            .two_factor()
            .record_failed_attempt(account_id, now)
            .await
    }

    async fn clear_failed_attempts(&self, account_id: &AccountId) -> Result<(), Error> {
        self.provider
            .two_factor()
            .clear_failed_attempts(account_id)
            .await
    }

    async fn lock(
        &self,
        account_id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .two_factor()
            .lock(account_id, locked_until, now)
            .await
    }

    async fn advance_last_used_step(
        &self,
        account_id: &AccountId,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .two_factor()
            .advance_last_used_step(account_id, step, now)
            .await
    }

    async fn replace_backup_codes(
        &self,
        account_id: &AccountId,
        code_hashes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.provider
            .two_factor()
            .replace_backup_codes(account_id, code_hashes, now)
            .await
    }

    async fn consume_backup_code(
        &self,
        account_id: &AccountId,
        code_hash: &str,
    ) -> Result<bool, Error> {
        self.provider
            .two_factor()
            .consume_backup_code(account_id, code_hash)
            .await
    }

    async fn count_backup_codes(&self, account_id: &AccountId) -> Result<u32, Error> {
        self.provider
            .two_factor()
            .count_backup_codes(account_id)
            .await
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<(), Error> {
        self.provider
            .two_factor()
            .delete_for_account(account_id)
            .await
    }
}

/// Forwards [`IpBlockRepository`] calls to the provider's blocklist.
pub struct IpBlockRepositoryAdapter<P: IpBlockRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: IpBlockRepositoryProvider> IpBlockRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: IpBlockRepositoryProvider> IpBlockRepository for IpBlockRepositoryAdapter<P> {
    async fn create(&self, entry: IpBlockEntry) -> Result<IpBlockEntry, Error> {
        self.provider.ip_blocks().create(entry).await
    }

    async fn find_exact(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        self.provider.ip_blocks().find_exact(ip, now).await
    }

    async fn list_active_ranges(&self, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        self.provider.ip_blocks().list_active_ranges(now).await
    }

    async fn list_all(&self) -> Result<Vec<IpBlockEntry>, Error> {
        self.provider.ip_blocks().list_all().await
    }

    async fn upsert_auto_block(
        &self,
        ip: IpAddr,
        block_type: BlockType,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IpBlockEntry, Error> {
        self.provider
            .ip_blocks()
            .upsert_auto_block(ip, block_type, expires_at, now)
            .await
    }

    async fn deactivate(&self, id: &str) -> Result<(), Error> {
        self.provider.ip_blocks().deactivate(id).await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.ip_blocks().cleanup_expired(now).await
    }
}

/// Forwards [`LoginHistoryRepository`] calls to the provider's history log.
pub struct LoginHistoryRepositoryAdapter<P: LoginHistoryRepositoryProvider> {
    provider: Arc<P>,
}

impl<P: LoginHistoryRepositoryProvider> LoginHistoryRepositoryAdapter<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: LoginHistoryRepositoryProvider> LoginHistoryRepository
    for LoginHistoryRepositoryAdapter<P>
{
    async fn record(&self, entry: LoginHistoryEntry) -> Result<(), Error> {
        self.provider.login_history().record(entry).await
    }

    async fn list_for_account(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<LoginHistoryEntry>, Error> {
        self.provider
            .login_history()
            .list_for_account(account_id, limit)
            .await
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.login_history().cleanup_before(before).await
    }
}
