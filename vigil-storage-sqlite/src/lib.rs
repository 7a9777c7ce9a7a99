//! SQLite storage backend for the vigil account-security subsystem
//!
//! Implements every repository trait from `vigil-core` on top of a shared
//! `sqlx` connection pool. Timestamps are stored as unix seconds (`INTEGER`);
//! enums are stored as their lowercase string tags. All counter and
//! consume-style mutations are single SQL statements, so the atomicity
//! contracts of the traits hold across concurrent connections.

pub mod repositories;

pub use repositories::{
    SqliteAccountRepository, SqliteIpBlockRepository, SqliteLoginHistoryRepository,
    SqliteRepositoryProvider, SqliteRevokedTokenRepository, SqliteSecureTokenRepository,
    SqliteSessionRepository, SqliteTwoFactorRepository,
};
