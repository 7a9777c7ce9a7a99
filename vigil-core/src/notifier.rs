//! Security event notification boundary
//!
//! Delivery (email, webhook, queue) lives outside this subsystem; services
//! talk to a [`Notifier`] trait and treat it as strictly best-effort: a
//! failed notification is logged and swallowed, never allowed to block or
//! fail the security operation that triggered it.

use async_trait::async_trait;

use crate::{account::AccountId, error::Error};

/// Events the subsystem reports to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// A successful login from a (possibly new) device.
    LoginAlert,
    /// The account crossed the failed-attempt threshold and was locked.
    AccountLocked,
    /// Two-factor authentication was enabled.
    TwoFactorEnabled,
    /// The password was changed.
    PasswordChanged,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::LoginAlert => "login_alert",
            SecurityEvent::AccountLocked => "account_locked",
            SecurityEvent::TwoFactorEnabled => "2fa_enabled",
            SecurityEvent::PasswordChanged => "password_changed",
        }
    }
}

/// External notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        event: SecurityEvent,
        account_id: &AccountId,
        data: serde_json::Value,
    ) -> Result<(), Error>;
}

/// Notifier that drops every event. Default when none is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(
        &self,
        _event: SecurityEvent,
        _account_id: &AccountId,
        _data: serde_json::Value,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Fire an event without letting a delivery failure escape.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    event: SecurityEvent,
    account_id: &AccountId,
    data: serde_json::Value,
) {
    if let Err(e) = notifier.send(event, account_id, data).await {
        tracing::warn!(
            event = event.as_str(),
            account_id = %account_id,
            error = %e,
            "Failed to deliver security notification"
        );
    }
}
