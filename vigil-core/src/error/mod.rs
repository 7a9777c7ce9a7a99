use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Recoverable, user-facing authentication outcomes.
///
/// All variants here are returned as typed results, never raised as internal
/// faults. `InvalidCredentials` deliberately covers both "unknown identifier"
/// and "wrong password" so callers cannot distinguish the two; lockout and
/// rate-limit variants reveal state on purpose so legitimate users understand
/// why they are blocked.
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    TwoFactorInvalidCode,

    #[error("Two-factor verification is locked")]
    TwoFactorLocked { locked_until: DateTime<Utc> },

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("IP address is blocked")]
    IpBlocked,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid IP address or CIDR range: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("JWT signing failed: {0}")]
    JwtSigning(String),

    #[error("JWT verification failed: {0}")]
    JwtVerification(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Secret encryption failed: {0}")]
    SecretEncryption(String),

    #[error("Secret decryption failed: {0}")]
    SecretDecryption(String),

    #[error("TOTP error: {0}")]
    Totp(String),
}

impl Error {
    /// Whether this error is a user-facing authentication outcome rather than
    /// an internal fault.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Retry-after hint in seconds, present only for rate-limit outcomes.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Error::Auth(AuthError::RateLimited {
                retry_after_seconds,
            }) => Some(*retry_after_seconds),
            _ => None,
        }
    }
}
