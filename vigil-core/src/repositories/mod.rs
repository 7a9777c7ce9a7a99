//! Repository traits for the data access layer
//!
//! Services talk to these traits; storage backends implement them. Counter
//! mutations (`record_failed_login`, `lock`, `consume_backup_code`,
//! `advance_last_used_step`, the refresh-token swap) are specified as single
//! atomic statements in the backing store, never read-modify-write in
//! application code, so their invariants hold across concurrent requests and
//! multiple service instances.
//!
//! # Trait hierarchy
//!
//! - Individual `*Repository` traits define the operations for each domain
//! - Individual `*RepositoryProvider` traits expose each repository type
//! - [`RepositoryProvider`] combines them all plus lifecycle methods

pub mod account;
pub mod adapter;
pub mod ip_block;
pub mod login_history;
pub mod revoked_token;
pub mod secure_token;
pub mod session;
pub mod two_factor;

pub use account::AccountRepository;
pub use adapter::{
    AccountRepositoryAdapter, IpBlockRepositoryAdapter, LoginHistoryRepositoryAdapter,
    RevokedTokenRepositoryAdapter, SecureTokenRepositoryAdapter, SessionRepositoryAdapter,
    TwoFactorRepositoryAdapter,
};
pub use ip_block::IpBlockRepository;
pub use login_history::LoginHistoryRepository;
pub use revoked_token::RevokedTokenRepository;
pub use secure_token::SecureTokenRepository;
pub use session::SessionRepository;
pub use two_factor::TwoFactorRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for account repository access.
pub trait AccountRepositoryProvider: Send + Sync + 'static {
    type AccountRepo: AccountRepository;

    fn account(&self) -> &Self::AccountRepo;
}

/// Provider trait for session repository access.
pub trait SessionRepositoryProvider: Send + Sync + 'static {
    type SessionRepo: SessionRepository;

    fn session(&self) -> &Self::SessionRepo;
}

/// Provider trait for revoked-token registry access.
pub trait RevokedTokenRepositoryProvider: Send + Sync + 'static {
    type RevokedTokenRepo: RevokedTokenRepository;

    fn revoked_tokens(&self) -> &Self::RevokedTokenRepo;
}

/// Provider trait for one-time secure-token access.
pub trait SecureTokenRepositoryProvider: Send + Sync + 'static {
    type SecureTokenRepo: SecureTokenRepository;

    fn secure_tokens(&self) -> &Self::SecureTokenRepo;
}

/// Provider trait for two-factor repository access.
pub trait TwoFactorRepositoryProvider: Send + Sync + 'static {
    type TwoFactorRepo: TwoFactorRepository;

    fn two_factor(&self) -> &Self::TwoFactorRepo;
}

/// Provider trait for IP blocklist access.
pub trait IpBlockRepositoryProvider: Send + Sync + 'static {
    type IpBlockRepo: IpBlockRepository;

    fn ip_blocks(&self) -> &Self::IpBlockRepo;
}

/// Provider trait for login-history access.
pub trait LoginHistoryRepositoryProvider: Send + Sync + 'static {
    type LoginHistoryRepo: LoginHistoryRepository;

    fn login_history(&self) -> &Self::LoginHistoryRepo;
}

/// Provider trait that storage implementations must implement to provide all
/// repositories, plus lifecycle methods for schema setup and health checks.
#[async_trait]
pub trait RepositoryProvider:
    AccountRepositoryProvider
    + SessionRepositoryProvider
    + RevokedTokenRepositoryProvider
    + SecureTokenRepositoryProvider
    + TwoFactorRepositoryProvider
    + IpBlockRepositoryProvider
    + LoginHistoryRepositoryProvider
{
    /// Prepare the backing schema.
    async fn migrate(&self) -> Result<(), Error>;

    /// Check connectivity to the backing store.
    async fn health_check(&self) -> Result<(), Error>;
}
