//! Two-factor authentication state
//!
//! One record per account. The TOTP secret is sealed with an AEAD before it
//! reaches storage (see [`crate::crypto`]); backup-code hashes live in their
//! own rows so consumption is a single atomic delete. The record carries its
//! own failure counter and lockout, deliberately separate from the login
//! brute-force guard: a compromised password must not grant unlimited code
//! guesses under the login rate limit alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorRecord {
    pub account_id: AccountId,

    /// AEAD-sealed TOTP secret (`nonce || ciphertext`).
    pub encrypted_secret: Vec<u8>,

    /// False while enrollment is pending confirmation.
    pub is_enabled: bool,

    /// Failed code attempts since the last successful verification.
    pub failed_attempts: u32,

    pub locked_until: Option<DateTime<Utc>>,

    /// Highest TOTP step a code has been accepted for. A code never verifies
    /// twice within its validity window.
    pub last_used_step: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TwoFactorRecord {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Material returned by enrollment: shown to the user, never stored raw.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Base32 secret for manual entry.
    pub secret_base32: String,
    /// otpauth:// URL for QR provisioning.
    pub otpauth_url: String,
}
