//! Authentication outcome types
//!
//! Shared between the credential-issuer state machine (the `vigil` facade)
//! and callers at the HTTP boundary.

use chrono::{DateTime, Utc};

use crate::{account::Account, session::Session};

/// A freshly issued access/refresh token pair.
///
/// Raw token values — the caller sees them here once; storage only ever holds
/// their hashes.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Result of a successful `login` or `complete_two_factor` call.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Full authentication: a session and a token pair were issued.
    Authenticated {
        account: Account,
        session: Session,
        /// Raw opaque session token; never persisted.
        session_token: String,
        tokens: TokenPair,
    },
    /// Credentials were correct but the account requires a second factor.
    /// Exchange the challenge token plus a valid code for a session.
    TwoFactorRequired {
        /// Raw one-time challenge token, short-lived.
        challenge_token: String,
        challenge_expires_at: DateTime<Utc>,
    },
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}
