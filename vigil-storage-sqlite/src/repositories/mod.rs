//! Repository implementations for SQLite storage

pub mod account;
pub mod ip_block;
pub mod login_history;
pub mod revoked_token;
pub mod secure_token;
pub mod session;
pub mod two_factor;

pub use account::SqliteAccountRepository;
pub use ip_block::SqliteIpBlockRepository;
pub use login_history::SqliteLoginHistoryRepository;
pub use revoked_token::SqliteRevokedTokenRepository;
pub use secure_token::SqliteSecureTokenRepository;
pub use session::SqliteSessionRepository;
pub use two_factor::SqliteTwoFactorRepository;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use vigil_core::{
    error::StorageError,
    repositories::{
        AccountRepositoryProvider, IpBlockRepositoryProvider, LoginHistoryRepositoryProvider,
        RepositoryProvider, RevokedTokenRepositoryProvider, SecureTokenRepositoryProvider,
        SessionRepositoryProvider, TwoFactorRepositoryProvider,
    },
    Error,
};

/// Schema, applied in order on `migrate`. Statements are idempotent so the
/// call is safe on every startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        email_verified_at INTEGER,
        failed_login_attempts INTEGER NOT NULL DEFAULT 0,
        locked_until INTEGER,
        last_failed_login_at INTEGER,
        two_factor_enabled INTEGER NOT NULL DEFAULT 0,
        refresh_token_hash TEXT,
        refresh_token_expires_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email)",
    "CREATE INDEX IF NOT EXISTS idx_accounts_refresh_token ON accounts(refresh_token_hash)",
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        token_hash TEXT NOT NULL UNIQUE,
        access_token_hash TEXT,
        access_token_expires_at INTEGER,
        device_info TEXT,
        ip_address TEXT,
        last_active_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_account ON sessions(account_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
    r#"
    CREATE TABLE IF NOT EXISTS revoked_tokens (
        token_hash TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        revoked_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expires ON revoked_tokens(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_revoked_tokens_account ON revoked_tokens(account_id)",
    r#"
    CREATE TABLE IF NOT EXISTS secure_tokens (
        token_hash TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        purpose TEXT NOT NULL,
        used_at INTEGER,
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_secure_tokens_account ON secure_tokens(account_id, purpose)",
    r#"
    CREATE TABLE IF NOT EXISTS two_factor (
        account_id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        encrypted_secret BLOB NOT NULL,
        is_enabled INTEGER NOT NULL DEFAULT 0,
        failed_attempts INTEGER NOT NULL DEFAULT 0,
        locked_until INTEGER,
        last_used_step INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS two_factor_backup_codes (
        account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        code_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (account_id, code_hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ip_blocklist (
        id TEXT PRIMARY KEY,
        ip_address TEXT,
        cidr_range TEXT,
        block_type TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0,
        expires_at INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ip_blocklist_address ON ip_blocklist(ip_address)",
    r#"
    CREATE TABLE IF NOT EXISTS login_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id TEXT,
        success INTEGER NOT NULL,
        failure_reason TEXT,
        ip_address TEXT,
        auth_method TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_login_history_account ON login_history(account_id, created_at)",
];

/// Repository provider implementation for SQLite
///
/// Implements all the individual repository provider traits as well as the
/// unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    account: Arc<SqliteAccountRepository>,
    session: Arc<SqliteSessionRepository>,
    revoked_tokens: Arc<SqliteRevokedTokenRepository>,
    secure_tokens: Arc<SqliteSecureTokenRepository>,
    two_factor: Arc<SqliteTwoFactorRepository>,
    ip_blocks: Arc<SqliteIpBlockRepository>,
    login_history: Arc<SqliteLoginHistoryRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let account = Arc::new(SqliteAccountRepository::new(pool.clone()));
        let session = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let revoked_tokens = Arc::new(SqliteRevokedTokenRepository::new(pool.clone()));
        let secure_tokens = Arc::new(SqliteSecureTokenRepository::new(pool.clone()));
        let two_factor = Arc::new(SqliteTwoFactorRepository::new(pool.clone()));
        let ip_blocks = Arc::new(SqliteIpBlockRepository::new(pool.clone()));
        let login_history = Arc::new(SqliteLoginHistoryRepository::new(pool.clone()));

        Self {
            pool,
            account,
            session,
            revoked_tokens,
            secure_tokens,
            two_factor,
            ip_blocks,
            login_history,
        }
    }

    /// Connect to a SQLite database by URL (e.g. `sqlite://vigil.db`).
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new().connect(url).await.map_err(|e| {
            Error::Storage(StorageError::Connection(e.to_string()))
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // Concrete accessors, handy when the provider traits are not in scope

    pub fn account_repo(&self) -> &SqliteAccountRepository {
        &self.account
    }

    pub fn session_repo(&self) -> &SqliteSessionRepository {
        &self.session
    }

    pub fn revoked_repo(&self) -> &SqliteRevokedTokenRepository {
        &self.revoked_tokens
    }

    pub fn secure_token_repo(&self) -> &SqliteSecureTokenRepository {
        &self.secure_tokens
    }

    pub fn two_factor_repo(&self) -> &SqliteTwoFactorRepository {
        &self.two_factor
    }

    pub fn ip_block_repo(&self) -> &SqliteIpBlockRepository {
        &self.ip_blocks
    }

    pub fn login_history_repo(&self) -> &SqliteLoginHistoryRepository {
        &self.login_history
    }
}

impl AccountRepositoryProvider for SqliteRepositoryProvider {
    type AccountRepo = SqliteAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.account
    }
}

impl SessionRepositoryProvider for SqliteRepositoryProvider {
    type SessionRepo = SqliteSessionRepository;

    fn session(&self) -> &Self::SessionRepo {
        &self.session
    }
}

impl RevokedTokenRepositoryProvider for SqliteRepositoryProvider {
    type RevokedTokenRepo = SqliteRevokedTokenRepository;

    fn revoked_tokens(&self) -> &Self::RevokedTokenRepo {
        &self.revoked_tokens
    }
}

impl SecureTokenRepositoryProvider for SqliteRepositoryProvider {
    type SecureTokenRepo = SqliteSecureTokenRepository;

    fn secure_tokens(&self) -> &Self::SecureTokenRepo {
        &self.secure_tokens
    }
}

impl TwoFactorRepositoryProvider for SqliteRepositoryProvider {
    type TwoFactorRepo = SqliteTwoFactorRepository;

    fn two_factor(&self) -> &Self::TwoFactorRepo {
        &self.two_factor
    }
}

impl IpBlockRepositoryProvider for SqliteRepositoryProvider {
    type IpBlockRepo = SqliteIpBlockRepository;

    fn ip_blocks(&self) -> &Self::IpBlockRepo {
        &self.ip_blocks
    }
}

impl LoginHistoryRepositoryProvider for SqliteRepositoryProvider {
    type LoginHistoryRepo = SqliteLoginHistoryRepository;

    fn login_history(&self) -> &Self::LoginHistoryRepo {
        &self.login_history
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run schema migration");
                Error::Storage(StorageError::Migration(e.to_string()))
            })?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
