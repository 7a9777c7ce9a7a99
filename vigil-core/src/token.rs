//! Revoked-token registry entries and one-time secure tokens
//!
//! The revocation registry is a blacklist of token hashes that must be
//! treated as invalid before their natural expiry. An entry is meaningful
//! only until `expires_at` — once the original token would have expired
//! anyway, the entry is dead weight and may be purged.
//!
//! Secure tokens are one-time, purpose-scoped credentials (currently the
//! short-lived two-factor challenge handed out between the password step and
//! the code step). Only their hash is stored; verification consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Why a token was pushed into the revocation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Logout,
    PasswordChange,
    AdminRevoke,
    RefreshRotation,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Logout => "logout",
            RevocationReason::PasswordChange => "password_change",
            RevocationReason::AdminRevoke => "admin_revoke",
            RevocationReason::RefreshRotation => "refresh_rotation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "logout" => Some(RevocationReason::Logout),
            "password_change" => Some(RevocationReason::PasswordChange),
            "admin_revoke" => Some(RevocationReason::AdminRevoke),
            "refresh_rotation" => Some(RevocationReason::RefreshRotation),
            _ => None,
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blacklisted token hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedToken {
    /// SHA-256 of the raw token. Unique; re-revoking is a no-op.
    pub token_hash: String,

    pub account_id: AccountId,

    pub reason: RevocationReason,

    /// The original token's natural expiry. Past this instant both the token
    /// and this entry are dead.
    pub expires_at: DateTime<Utc>,

    pub revoked_at: DateTime<Utc>,
}

/// What a one-time secure token may be used for.
///
/// Tokens can only be consumed for their own purpose, isolating token types
/// from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Handed out after a correct password when 2FA is enabled; exchanged
    /// (once) together with a valid code for a full session.
    TwoFactorChallenge,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::TwoFactorChallenge => "two_factor_challenge",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "two_factor_challenge" => Some(TokenPurpose::TwoFactorChallenge),
            _ => None,
        }
    }
}

/// A one-time, purpose-scoped token (hash at rest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureToken {
    pub token_hash: String,

    pub account_id: AccountId,

    pub purpose: TokenPurpose,

    /// Set when the token is consumed; a used token never verifies again.
    pub used_at: Option<DateTime<Utc>>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl SecureToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
