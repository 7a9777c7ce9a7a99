//! Account identity and security state
//!
//! The account carries all per-identity security fields: the failed-login
//! counter and lockout window, the 2FA flag, and the (hashed) refresh token.
//! `failed_login_attempts` resets to 0 only on a successful *full*
//! authentication, 2FA included when it is enabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, ValidationError},
    id::{generate_prefixed_id, validate_prefixed_id},
};

/// A unique, stable identifier for an account.
///
/// Treat as opaque; the `acct_` prefix exists for log readability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: &str) -> Self {
        AccountId(id.to_string())
    }

    pub fn new_random() -> Self {
        AccountId(generate_prefixed_id("acct"))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "acct")
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    pub email: String,

    /// Argon2 hash of the password; `None` for accounts without a password
    /// credential.
    pub password_hash: Option<String>,

    pub is_active: bool,

    /// When the email was verified; `None` until verification.
    pub email_verified_at: Option<DateTime<Utc>>,

    /// Consecutive failed login attempts since the last full authentication.
    pub failed_login_attempts: u32,

    /// Until when the account is locked out of password login.
    pub locked_until: Option<DateTime<Utc>>,

    pub last_failed_login_at: Option<DateTime<Utc>>,

    pub two_factor_enabled: bool,

    /// SHA-256 hash of the current refresh token; rotated on every use.
    pub refresh_token_hash: Option<String>,

    pub refresh_token_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// Whether the account is locked at the given instant.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Input for creating a new account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub id: AccountId,
    pub email: String,
    pub password_hash: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl NewAccount {
    pub fn new(email: impl Into<String>) -> Result<Self, Error> {
        let email = email.into();
        if !email.contains('@') || email.len() < 3 {
            return Err(ValidationError::InvalidEmail(email).into());
        }
        Ok(Self {
            id: AccountId::new_random(),
            email,
            password_hash: None,
            email_verified_at: None,
        })
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn with_verified_email(mut self, at: DateTime<Utc>) -> Self {
        self.email_verified_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_id_format() {
        let id = AccountId::new_random();
        assert!(id.is_valid());
        assert!(id.as_str().starts_with("acct_"));

        let custom = AccountId::new("not-prefixed");
        assert!(!custom.is_valid());
    }

    #[test]
    fn test_is_locked_window() {
        let now = Utc::now();
        let mut account = test_account();

        assert!(!account.is_locked(now));

        account.locked_until = Some(now + Duration::minutes(15));
        assert!(account.is_locked(now));
        assert!(!account.is_locked(now + Duration::minutes(16)));
    }

    #[test]
    fn test_new_account_rejects_bad_email() {
        assert!(NewAccount::new("not-an-email").is_err());
        assert!(NewAccount::new("a@b").is_ok());
    }

    fn test_account() -> Account {
        let now = Utc::now();
        Account {
            id: AccountId::new_random(),
            email: "test@example.com".to_string(),
            password_hash: None,
            is_active: true,
            email_verified_at: Some(now),
            failed_login_attempts: 0,
            locked_until: None,
            last_failed_login_at: None,
            two_factor_enabled: false,
            refresh_token_hash: None,
            refresh_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
