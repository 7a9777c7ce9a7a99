//! Session management
//!
//! Sessions track authenticated devices. Each row stores only the SHA-256
//! hash of its opaque token; the raw token is handed to the caller once at
//! creation and never persisted. The latest access JWT issued for a session
//! is also recorded (by hash) so that revoking the session can push the token
//! into the revocation registry.
//!
//! | Field                  | Type               | Description                                   |
//! | ---------------------- | ------------------ | --------------------------------------------- |
//! | `id`                   | `SessionId`        | Unique identifier (`sess_` prefix).           |
//! | `account_id`           | `AccountId`        | Owning account.                               |
//! | `token_hash`           | `String`           | SHA-256 of the opaque session token.          |
//! | `access_token_hash`    | `Option<String>`   | SHA-256 of the latest access JWT.             |
//! | `device_info`          | `Option<String>`   | Client-reported device description.           |
//! | `ip_address`           | `Option<String>`   | Client IP at creation.                        |
//! | `last_active_at`       | `DateTime`         | Updated (throttled) on authenticated use.     |
//! | `expires_at`           | `DateTime`         | Hard expiry.                                  |

pub mod jwt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    account::AccountId,
    crypto,
    error::{Error, ValidationError},
    id::{generate_prefixed_id, validate_prefixed_id},
};

pub use jwt::{JwtAlgorithm, JwtClaims, JwtConfig};

/// A unique, stable identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Self {
        SessionId(id.to_string())
    }

    pub fn new_random() -> Self {
        SessionId(generate_prefixed_id("sess"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "sess")
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An opaque session token with 256 bits of entropy.
///
/// Only its hash is stored; the raw value travels to the client once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: &str) -> Self {
        SessionToken(token.to_string())
    }

    pub fn new_random() -> Self {
        SessionToken(crypto::generate_secure_token())
    }

    /// SHA-256 hash used for storage and lookup.
    pub fn hash(&self) -> String {
        crypto::hash_token(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    pub account_id: AccountId,

    /// SHA-256 of the opaque session token. The raw token is never persisted.
    pub token_hash: String,

    /// SHA-256 of the most recently issued access JWT for this session.
    pub access_token_hash: Option<String>,

    pub access_token_expires_at: Option<DateTime<Utc>>,

    pub device_info: Option<String>,

    pub ip_address: Option<String>,

    pub last_active_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Default)]
pub struct SessionBuilder {
    id: Option<SessionId>,
    account_id: Option<AccountId>,
    token_hash: Option<String>,
    device_info: Option<String>,
    ip_address: Option<String>,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionBuilder {
    pub fn id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn account_id(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn token_hash(mut self, token_hash: String) -> Self {
        self.token_hash = Some(token_hash);
        self
    }

    pub fn device_info(mut self, device_info: Option<String>) -> Self {
        self.device_info = device_info;
        self
    }

    pub fn ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn build(self) -> Result<Session, Error> {
        let created_at = self
            .created_at
            .ok_or_else(|| ValidationError::MissingField("created_at is required".to_string()))?;
        Ok(Session {
            id: self.id.unwrap_or_else(SessionId::new_random),
            account_id: self.account_id.ok_or_else(|| {
                ValidationError::MissingField("account_id is required".to_string())
            })?,
            token_hash: self.token_hash.ok_or_else(|| {
                ValidationError::MissingField("token_hash is required".to_string())
            })?,
            access_token_hash: None,
            access_token_expires_at: None,
            device_info: self.device_info,
            ip_address: self.ip_address,
            last_active_at: created_at,
            expires_at: self.expires_at.ok_or_else(|| {
                ValidationError::MissingField("expires_at is required".to_string())
            })?,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_token_hash_is_stable() {
        let token = SessionToken::new_random();
        assert_eq!(token.hash(), token.hash());
        assert_eq!(token.hash().len(), 64);
    }

    #[test]
    fn test_session_builder() {
        let now = Utc::now();
        let token = SessionToken::new_random();
        let session = Session::builder()
            .account_id(AccountId::new_random())
            .token_hash(token.hash())
            .device_info(Some("Firefox on Linux".to_string()))
            .ip_address(Some("127.0.0.1".to_string()))
            .created_at(now)
            .expires_at(now + Duration::days(30))
            .build()
            .unwrap();

        assert!(session.id.is_valid());
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::days(31)));
        assert_eq!(session.last_active_at, now);
    }

    #[test]
    fn test_session_builder_requires_account() {
        let now = Utc::now();
        let result = Session::builder()
            .token_hash("abc".to_string())
            .created_at(now)
            .expires_at(now)
            .build();
        assert!(result.is_err());
    }
}
