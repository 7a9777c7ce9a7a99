//! Brute-force lockout for password login
//!
//! Consecutive failed attempts are counted on the account row by an atomic
//! increment; crossing the threshold locks the account for a fixed window.
//! The lock transition itself is a conditional update in storage, so exactly
//! one of N racing failures performs it and emits the lockout notification.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    config::BruteForceConfig,
    error::{AuthError, Error},
    notifier::{notify_best_effort, Notifier},
    repositories::AccountRepository,
    Account, AccountId, Clock,
};

/// Outcome of recording one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LockoutDecision {
    /// Consecutive failures including this one.
    pub attempts: u32,
    /// Set when the account is locked (by this failure or an earlier one).
    pub locked_until: Option<DateTime<Utc>>,
    /// True only for the failure that performed the lock transition.
    pub newly_locked: bool,
}

pub struct BruteForceService<A: AccountRepository> {
    accounts: Arc<A>,
    config: BruteForceConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl<A: AccountRepository> BruteForceService<A> {
    pub fn new(
        accounts: Arc<A>,
        config: BruteForceConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            accounts,
            config,
            clock,
            notifier,
        }
    }

    /// Reject the attempt up front if the account is locked right now.
    ///
    /// The lockout expires passively: once `locked_until` passes, this check
    /// succeeds again without any reset step.
    pub fn check(&self, account: &Account) -> Result<(), Error> {
        if !self.config.enabled {
            return Ok(());
        }
        if let Some(locked_until) = account.locked_until {
            if locked_until > self.clock.now() {
                return Err(AuthError::AccountLocked { locked_until }.into());
            }
        }
        Ok(())
    }

    /// Record one failed attempt and lock the account if it crossed the
    /// threshold.
    pub async fn record_failure(&self, account_id: &AccountId) -> Result<LockoutDecision, Error> {
        let now = self.clock.now();
        let attempts = self.accounts.record_failed_login(account_id, now).await?;

        if !self.config.enabled || attempts < self.config.max_failed_attempts {
            return Ok(LockoutDecision {
                attempts,
                locked_until: None,
                newly_locked: false,
            });
        }

        let locked_until = now + self.config.lockout_duration;
        let newly_locked = self.accounts.lock(account_id, locked_until, now).await?;

        if newly_locked {
            tracing::warn!(
                account_id = %account_id,
                attempts,
                locked_until = %locked_until,
                "Account locked after repeated failed logins"
            );
            notify_best_effort(
                self.notifier.as_ref(),
                crate::SecurityEvent::AccountLocked,
                account_id,
                serde_json::json!({
                    "failed_attempts": attempts,
                    "locked_until": locked_until.to_rfc3339(),
                }),
            )
            .await;
        }

        Ok(LockoutDecision {
            attempts,
            locked_until: Some(locked_until),
            newly_locked,
        })
    }

    /// Reset the counter after a successful full authentication. When 2FA is
    /// enabled this is called only after the code step, not after the
    /// password step.
    pub async fn record_success(&self, account_id: &AccountId) -> Result<(), Error> {
        self.accounts.clear_failed_logins(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{test_account, MockAccountRepository, RecordingNotifier};
    use crate::{SecurityEvent, TestClock};
    use chrono::Duration;

    fn service(
        repo: Arc<MockAccountRepository>,
        clock: Arc<TestClock>,
        notifier: Arc<RecordingNotifier>,
    ) -> BruteForceService<MockAccountRepository> {
        BruteForceService::new(repo, BruteForceConfig::default(), clock, notifier)
    }

    #[tokio::test]
    async fn test_locks_after_threshold() {
        let account = test_account(None);
        let account_id = account.id.clone();
        let repo = Arc::new(MockAccountRepository::with_account(account));
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(repo.clone(), clock.clone(), notifier.clone());

        for i in 1..=4 {
            let decision = service.record_failure(&account_id).await.unwrap();
            assert_eq!(decision.attempts, i);
            assert!(!decision.newly_locked);
        }

        let decision = service.record_failure(&account_id).await.unwrap();
        assert_eq!(decision.attempts, 5);
        assert!(decision.newly_locked);
        assert_eq!(
            decision.locked_until,
            Some(clock.now() + Duration::minutes(15))
        );
        assert_eq!(notifier.events_of(SecurityEvent::AccountLocked), 1);

        let locked = repo.get(&account_id).unwrap();
        assert!(locked.is_locked(clock.now()));
        assert!(service.check(&locked).is_err());
    }

    #[tokio::test]
    async fn test_lock_notification_fires_once() {
        let account = test_account(None);
        let account_id = account.id.clone();
        let repo = Arc::new(MockAccountRepository::with_account(account));
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(repo, clock, notifier.clone());

        // Failures past the threshold must not re-notify while still locked
        for _ in 0..8 {
            service.record_failure(&account_id).await.unwrap();
        }
        assert_eq!(notifier.events_of(SecurityEvent::AccountLocked), 1);
    }

    #[tokio::test]
    async fn test_lockout_expires_passively() {
        let account = test_account(None);
        let account_id = account.id.clone();
        let repo = Arc::new(MockAccountRepository::with_account(account));
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(repo.clone(), clock.clone(), notifier);

        for _ in 0..5 {
            service.record_failure(&account_id).await.unwrap();
        }
        assert!(service.check(&repo.get(&account_id).unwrap()).is_err());

        clock.advance(Duration::minutes(16));
        assert!(service.check(&repo.get(&account_id).unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let account = test_account(None);
        let account_id = account.id.clone();
        let repo = Arc::new(MockAccountRepository::with_account(account));
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(repo.clone(), clock, notifier);

        for _ in 0..4 {
            service.record_failure(&account_id).await.unwrap();
        }
        service.record_success(&account_id).await.unwrap();

        assert_eq!(repo.get(&account_id).unwrap().failed_login_attempts, 0);

        // The count starts over, it does not resume at 4
        let decision = service.record_failure(&account_id).await.unwrap();
        assert_eq!(decision.attempts, 1);
        assert!(!decision.newly_locked);
    }

    #[tokio::test]
    async fn test_disabled_never_locks() {
        let account = test_account(None);
        let account_id = account.id.clone();
        let repo = Arc::new(MockAccountRepository::with_account(account));
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = BruteForceService::new(
            repo.clone(),
            BruteForceConfig::disabled(),
            clock.clone(),
            notifier,
        );

        for _ in 0..20 {
            let decision = service.record_failure(&account_id).await.unwrap();
            assert!(!decision.newly_locked);
        }
        assert!(!repo.get(&account_id).unwrap().is_locked(clock.now()));
    }
}
