//! TOTP two-factor authentication and backup codes
//!
//! Enrollment runs in two phases: `enroll` stores a sealed secret in a
//! pending record and returns provisioning material; `confirm_enrollment`
//! requires one valid code before the factor is armed, and only then issues
//! backup codes. Code verification accepts one step of clock skew on each
//! side, and a code never verifies twice: the highest accepted step is
//! persisted by a monotonic conditional update.
//!
//! The code-guessing counter and lockout here are separate from the login
//! brute-force guard: a stolen password must not buy unlimited code guesses.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use totp_rs::{Algorithm as TotpAlgorithm, Secret, TOTP};

use crate::{
    config::TwoFactorPolicy,
    crypto,
    error::{AuthError, CryptoError, Error, ValidationError},
    notifier::{notify_best_effort, Notifier},
    repositories::{AccountRepository, TwoFactorRepository},
    two_factor::Enrollment,
    Account, AccountId, AuthMethod, Clock, SecurityEvent, TwoFactorRecord,
};

pub struct TwoFactorService<T: TwoFactorRepository, A: AccountRepository> {
    two_factor: Arc<T>,
    accounts: Arc<A>,
    policy: TwoFactorPolicy,
    clock: Arc<dyn Clock>,
    /// AEAD key sealing TOTP secrets at rest.
    encryption_key: [u8; 32],
    notifier: Arc<dyn Notifier>,
}

impl<T: TwoFactorRepository, A: AccountRepository> TwoFactorService<T, A> {
    pub fn new(
        two_factor: Arc<T>,
        accounts: Arc<A>,
        policy: TwoFactorPolicy,
        clock: Arc<dyn Clock>,
        encryption_key: [u8; 32],
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            two_factor,
            accounts,
            policy,
            clock,
            encryption_key,
            notifier,
        }
    }

    /// Start enrollment: generate a secret, store it sealed and disabled,
    /// and return the provisioning material to show the user once.
    ///
    /// Re-enrolling while a confirmation is pending replaces the pending
    /// secret. Enrolling on top of an armed factor is rejected; it must be
    /// disabled first.
    pub async fn enroll(&self, account: &Account) -> Result<Enrollment, Error> {
        if let Some(existing) = self.two_factor.find_by_account(&account.id).await? {
            if existing.is_enabled {
                return Err(ValidationError::InvalidField(
                    "two-factor authentication is already enabled".to_string(),
                )
                .into());
            }
        }

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| CryptoError::Totp(format!("{e:?}")))?;

        let totp = self.build_totp(secret_bytes.clone(), &account.email)?;
        let now = self.clock.now();

        let sealed = crypto::encrypt_secret(&self.encryption_key, &secret_bytes, &account.id)?;
        self.two_factor
            .upsert(TwoFactorRecord {
                account_id: account.id.clone(),
                encrypted_secret: sealed,
                is_enabled: false,
                failed_attempts: 0,
                locked_until: None,
                last_used_step: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(account_id = %account.id, "Two-factor enrollment started");

        Ok(Enrollment {
            secret_base32: secret.to_encoded().to_string(),
            otpauth_url: totp.get_url(),
        })
    }

    /// Arm the factor after the user proves possession of the secret with
    /// one valid code. Returns the plaintext backup codes, shown exactly
    /// once; only their hashes are stored.
    pub async fn confirm_enrollment(
        &self,
        account: &Account,
        code: &str,
    ) -> Result<Vec<String>, Error> {
        let record = self
            .two_factor
            .find_by_account(&account.id)
            .await?
            .ok_or(AuthError::TwoFactorInvalidCode)?;
        if record.is_enabled {
            return Err(ValidationError::InvalidField(
                "two-factor authentication is already enabled".to_string(),
            )
            .into());
        }

        let now = self.clock.now();
        let step = self
            .match_totp_code(&record, code, &account.email, now)?
            .ok_or(AuthError::TwoFactorInvalidCode)?;
        // Burn the confirmation step so the same code cannot also log in
        self.two_factor
            .advance_last_used_step(&account.id, step, now)
            .await?;

        self.two_factor.set_enabled(&account.id, true, now).await?;
        self.accounts.set_two_factor_enabled(&account.id, true).await?;

        let codes: Vec<String> = (0..self.policy.backup_code_count)
            .map(|_| crypto::generate_backup_code())
            .collect();
        let hashes = codes.iter().map(|c| crypto::hash_token(c)).collect();
        self.two_factor
            .replace_backup_codes(&account.id, hashes, now)
            .await?;

        tracing::info!(account_id = %account.id, "Two-factor authentication enabled");
        notify_best_effort(
            self.notifier.as_ref(),
            SecurityEvent::TwoFactorEnabled,
            &account.id,
            serde_json::json!({ "backup_codes_issued": codes.len() }),
        )
        .await;

        Ok(codes)
    }

    /// Verify a TOTP or backup code for an armed factor.
    ///
    /// Which method matched is returned so the audit trail can distinguish
    /// them. Failures count toward the 2FA lockout.
    pub async fn verify_code(&self, account: &Account, code: &str) -> Result<AuthMethod, Error> {
        let record = self
            .two_factor
            .find_by_account(&account.id)
            .await?
            .filter(|r| r.is_enabled)
            .ok_or(AuthError::TwoFactorInvalidCode)?;

        let now = self.clock.now();
        if let Some(locked_until) = record.locked_until {
            if locked_until > now {
                return Err(AuthError::TwoFactorLocked { locked_until }.into());
            }
        }

        if looks_like_backup_code(code) {
            let hash = crypto::hash_token(&code.to_ascii_lowercase());
            if self.two_factor.consume_backup_code(&account.id, &hash).await? {
                self.two_factor.clear_failed_attempts(&account.id).await?;
                tracing::info!(account_id = %account.id, "Backup code consumed");
                return Ok(AuthMethod::BackupCode);
            }
        } else if let Some(step) = self.match_totp_code(&record, code, &account.email, now)? {
            // A step that fails to advance was already used: replay
            if self
                .two_factor
                .advance_last_used_step(&account.id, step, now)
                .await?
            {
                self.two_factor.clear_failed_attempts(&account.id).await?;
                return Ok(AuthMethod::TotpCode);
            }
        }

        self.record_code_failure(&account.id, now).await
    }

    /// Tear down the factor: enrollment record, backup codes, account flag.
    pub async fn disable(&self, account_id: &AccountId) -> Result<(), Error> {
        self.two_factor.delete_for_account(account_id).await?;
        self.accounts.set_two_factor_enabled(account_id, false).await?;
        tracing::info!(account_id = %account_id, "Two-factor authentication disabled");
        Ok(())
    }

    /// Unused backup codes left. There is no partial regeneration; when the
    /// user runs low they disable and re-enroll.
    pub async fn backup_codes_remaining(&self, account_id: &AccountId) -> Result<u32, Error> {
        self.two_factor.count_backup_codes(account_id).await
    }

    async fn record_code_failure(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<AuthMethod, Error> {
        let attempts = self.two_factor.record_failed_attempt(account_id, now).await?;
        if attempts >= self.policy.max_failed_attempts {
            let locked_until = now + self.policy.lockout_duration;
            if self.two_factor.lock(account_id, locked_until, now).await? {
                tracing::warn!(
                    account_id = %account_id,
                    attempts,
                    "Two-factor verification locked after repeated invalid codes"
                );
            }
            return Err(AuthError::TwoFactorLocked { locked_until }.into());
        }
        Err(AuthError::TwoFactorInvalidCode.into())
    }

    /// Check `code` against the sealed secret at every step within the skew
    /// window. Returns the matched step, ignoring replay state.
    fn match_totp_code(
        &self,
        record: &TwoFactorRecord,
        code: &str,
        account_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, Error> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }

        let secret = crypto::decrypt_secret(
            &self.encryption_key,
            &record.encrypted_secret,
            &record.account_id,
        )?;
        let totp = self.build_totp(secret, account_name)?;

        let step_seconds = self.policy.totp_step_seconds as i64;
        let current_step = now.timestamp() / step_seconds;
        let skew = self.policy.totp_skew_steps as i64;

        for step in (current_step - skew)..=(current_step + skew) {
            if step < 0 {
                continue;
            }
            let expected = totp.generate((step * step_seconds) as u64);
            if crypto::constant_time_compare(expected.as_bytes(), code.as_bytes()) {
                return Ok(Some(step));
            }
        }
        Ok(None)
    }

    fn build_totp(&self, secret: Vec<u8>, account_name: &str) -> Result<TOTP, Error> {
        TOTP::new(
            TotpAlgorithm::SHA1,
            6,
            self.policy.totp_skew_steps,
            self.policy.totp_step_seconds,
            secret,
            Some(self.policy.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| CryptoError::Totp(e.to_string()).into())
    }
}

/// Backup codes are 10 hex characters; TOTP codes are 6 digits. A 6-digit
/// string is never a valid backup code, so the two cannot collide.
fn looks_like_backup_code(code: &str) -> bool {
    code.len() == 10 && code.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{
        test_account, MockAccountRepository, MockTwoFactorRepository, RecordingNotifier,
    };
    use crate::TestClock;
    use chrono::Duration;

    const TEST_KEY: [u8; 32] = [0x42; 32];

    struct Fixture {
        service: TwoFactorService<MockTwoFactorRepository, MockAccountRepository>,
        accounts: Arc<MockAccountRepository>,
        clock: Arc<TestClock>,
        notifier: Arc<RecordingNotifier>,
        account: Account,
    }

    fn fixture() -> Fixture {
        let account = test_account(None);
        let accounts = Arc::new(MockAccountRepository::with_account(account.clone()));
        let two_factor = Arc::new(MockTwoFactorRepository::default());
        let clock = Arc::new(TestClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = TwoFactorService::new(
            two_factor,
            accounts.clone(),
            TwoFactorPolicy::default(),
            clock.clone(),
            TEST_KEY,
            notifier.clone(),
        );
        Fixture {
            service,
            accounts,
            clock,
            notifier,
            account,
        }
    }

    /// Compute the code an authenticator app would show at `at`.
    fn code_at(enrollment: &Enrollment, at: DateTime<Utc>) -> String {
        let secret = Secret::Encoded(enrollment.secret_base32.clone())
            .to_bytes()
            .unwrap();
        let totp = TOTP::new(
            TotpAlgorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some("vigil".to_string()),
            "app".to_string(),
        )
        .unwrap();
        totp.generate(at.timestamp() as u64)
    }

    async fn enrolled_fixture() -> (Fixture, Enrollment, Vec<String>) {
        let f = fixture();
        let enrollment = f.service.enroll(&f.account).await.unwrap();
        let code = code_at(&enrollment, f.clock.now());
        let backup_codes = f
            .service
            .confirm_enrollment(&f.account, &code)
            .await
            .unwrap();
        // A fresh step for subsequent verifications
        f.clock.advance(Duration::seconds(60));
        (f, enrollment, backup_codes)
    }

    #[tokio::test]
    async fn test_enroll_and_confirm() {
        let f = fixture();
        let enrollment = f.service.enroll(&f.account).await.unwrap();
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));

        // Not armed until confirmed
        assert!(!f.accounts.get(&f.account.id).unwrap().two_factor_enabled);

        let code = code_at(&enrollment, f.clock.now());
        let backup_codes = f
            .service
            .confirm_enrollment(&f.account, &code)
            .await
            .unwrap();

        assert_eq!(backup_codes.len(), 10);
        assert!(f.accounts.get(&f.account.id).unwrap().two_factor_enabled);
        assert_eq!(f.notifier.events_of(SecurityEvent::TwoFactorEnabled), 1);
        assert_eq!(
            f.service.backup_codes_remaining(&f.account.id).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_confirm_rejects_wrong_code() {
        let f = fixture();
        f.service.enroll(&f.account).await.unwrap();

        let result = f.service.confirm_enrollment(&f.account, "000000").await;
        assert!(result.is_err());
        assert!(!f.accounts.get(&f.account.id).unwrap().two_factor_enabled);
    }

    #[tokio::test]
    async fn test_reenroll_rejected_while_enabled() {
        let (f, _, _) = enrolled_fixture().await;
        assert!(f.service.enroll(&f.account).await.is_err());
    }

    #[tokio::test]
    async fn test_valid_code_verifies_once() {
        let (f, enrollment, _) = enrolled_fixture().await;
        let code = code_at(&enrollment, f.clock.now());

        let method = f.service.verify_code(&f.account, &code).await.unwrap();
        assert_eq!(method, AuthMethod::TotpCode);

        // Same code again within its window is a replay
        let replay = f.service.verify_code(&f.account, &code).await;
        assert!(matches!(
            replay,
            Err(Error::Auth(AuthError::TwoFactorInvalidCode))
        ));
    }

    #[tokio::test]
    async fn test_previous_step_accepted_within_skew() {
        let (f, enrollment, _) = enrolled_fixture().await;
        let code = code_at(&enrollment, f.clock.now() - Duration::seconds(30));

        let method = f.service.verify_code(&f.account, &code).await.unwrap();
        assert_eq!(method, AuthMethod::TotpCode);
    }

    #[tokio::test]
    async fn test_code_outside_skew_rejected() {
        let (f, enrollment, _) = enrolled_fixture().await;
        let code = code_at(&enrollment, f.clock.now() - Duration::seconds(120));

        assert!(f.service.verify_code(&f.account, &code).await.is_err());
    }

    #[tokio::test]
    async fn test_guessing_locks_two_factor() {
        let (f, enrollment, _) = enrolled_fixture().await;

        for _ in 0..4 {
            let result = f.service.verify_code(&f.account, "000000").await;
            assert!(matches!(
                result,
                Err(Error::Auth(AuthError::TwoFactorInvalidCode))
            ));
        }
        let result = f.service.verify_code(&f.account, "000000").await;
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::TwoFactorLocked { .. }))
        ));

        // Even a correct code is rejected while locked
        let code = code_at(&enrollment, f.clock.now());
        assert!(matches!(
            f.service.verify_code(&f.account, &code).await,
            Err(Error::Auth(AuthError::TwoFactorLocked { .. }))
        ));

        // The lock expires passively
        f.clock.advance(Duration::minutes(16));
        let code = code_at(&enrollment, f.clock.now());
        let method = f.service.verify_code(&f.account, &code).await.unwrap();
        assert_eq!(method, AuthMethod::TotpCode);
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let (f, _, backup_codes) = enrolled_fixture().await;
        let code = &backup_codes[0];

        let method = f.service.verify_code(&f.account, code).await.unwrap();
        assert_eq!(method, AuthMethod::BackupCode);
        assert_eq!(
            f.service.backup_codes_remaining(&f.account.id).await.unwrap(),
            9
        );

        // Spent codes never work again
        assert!(f.service.verify_code(&f.account, code).await.is_err());
    }

    #[tokio::test]
    async fn test_disable_tears_everything_down() {
        let (f, enrollment, _) = enrolled_fixture().await;

        f.service.disable(&f.account.id).await.unwrap();

        assert!(!f.accounts.get(&f.account.id).unwrap().two_factor_enabled);
        assert_eq!(
            f.service.backup_codes_remaining(&f.account.id).await.unwrap(),
            0
        );
        let code = code_at(&enrollment, f.clock.now());
        assert!(f.service.verify_code(&f.account, &code).await.is_err());
    }
}
