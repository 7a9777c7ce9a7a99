//! Append-only login audit trail
//!
//! Every login outcome (success or failure, including pre-account rejections
//! like IP blocks) appends one entry. Entries are never mutated; retention is
//! a storage concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// How the authentication was (attempted to be) performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    TotpCode,
    BackupCode,
    Refresh,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::TotpCode => "totp_code",
            AuthMethod::BackupCode => "backup_code",
            AuthMethod::Refresh => "refresh",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "password" => Some(AuthMethod::Password),
            "totp_code" => Some(AuthMethod::TotpCode),
            "backup_code" => Some(AuthMethod::BackupCode),
            "refresh" => Some(AuthMethod::Refresh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginHistoryEntry {
    /// `None` when the identifier did not resolve to an account (recorded so
    /// enumeration attempts still leave a trace).
    pub account_id: Option<AccountId>,

    pub success: bool,

    /// Machine-readable failure tag, e.g. `invalid_credentials`.
    pub failure_reason: Option<String>,

    pub ip_address: Option<String>,

    pub auth_method: AuthMethod,

    pub created_at: DateTime<Utc>,
}

impl LoginHistoryEntry {
    pub fn success(
        account_id: AccountId,
        auth_method: AuthMethod,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: Some(account_id),
            success: true,
            failure_reason: None,
            ip_address,
            auth_method,
            created_at: at,
        }
    }

    pub fn failure(
        account_id: Option<AccountId>,
        auth_method: AuthMethod,
        reason: impl Into<String>,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            success: false,
            failure_reason: Some(reason.into()),
            ip_address,
            auth_method,
            created_at: at,
        }
    }
}
