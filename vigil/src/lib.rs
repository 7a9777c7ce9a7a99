//! # Vigil
//!
//! Vigil is an account security and session management layer for Rust
//! applications. It covers the parts of authentication that are easy to get
//! subtly wrong: credential verification with brute-force lockout, 2FA with
//! TOTP and one-time backup codes, multi-device sessions, short-lived access
//! JWTs with rotating refresh tokens and a revocation registry, IP reputation
//! blocking, and tiered in-process rate limiting.
//!
//! The [`Vigil`] struct is the entry point: it wires a storage backend (any
//! [`RepositoryProvider`]) into the security services and exposes the
//! login/refresh/logout state machine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::Vigil;
//! use vigil_storage_sqlite::SqliteRepositoryProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
//!     let vigil = Vigil::new(Arc::new(SqliteRepositoryProvider::new(pool)));
//!     vigil.migrate().await.unwrap();
//!
//!     let account = vigil.register("user@example.com", "correct horse battery").await.unwrap();
//!     vigil.set_email_verified(&account.id).await.unwrap();
//!
//!     let outcome = vigil
//!         .login("user@example.com", "correct horse battery", None, None)
//!         .await
//!         .unwrap();
//!     assert!(outcome.is_authenticated());
//! }
//! ```
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use vigil_core::{
    account::NewAccount,
    clock::SystemClock,
    crypto,
    error::{StorageError, ValidationError},
    notifier::{notify_best_effort, NullNotifier},
    repositories::{
        AccountRepository, AccountRepositoryAdapter, IpBlockRepositoryAdapter,
        LoginHistoryRepository, LoginHistoryRepositoryAdapter, RevokedTokenRepositoryAdapter,
        SecureTokenRepository, SecureTokenRepositoryAdapter, SessionRepositoryAdapter,
        TwoFactorRepositoryAdapter,
    },
    services::{
        BruteForceService, IpGuardService, RateLimiterService, RevocationService, SessionService,
        TwoFactorService,
    },
    token::SecureToken,
};

/// Re-export core types from vigil_core
///
/// These types are commonly used when working with the Vigil API.
pub use vigil_core::{
    Account, AccountId, AuthConfig, AuthError, AuthMethod, AuthOutcome, BlockType, Clock, Error,
    IpBlockEntry, LoginHistoryEntry, Notifier, RevocationReason, SecurityEvent, Session, SessionId,
    SessionToken, TokenPair, TokenPurpose,
};

pub use vigil_core::two_factor::Enrollment;

pub use vigil_core::repositories::RepositoryProvider;
pub use vigil_core::services::{RateLimitDecision, RateLimitTier};
pub use vigil_core::session::{JwtAlgorithm, JwtClaims, JwtConfig};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature
/// is enabled.
#[cfg(feature = "sqlite")]
pub use vigil_storage_sqlite::SqliteRepositoryProvider;

/// Minimum accepted password length at registration and password change.
const MIN_PASSWORD_LEN: usize = 8;

/// The account security coordinator.
///
/// `Vigil` wires repository adapters into the security services and exposes
/// the full authentication surface: registration, login (with lockout, 2FA,
/// IP and rate-limit guards), token refresh and revocation, session
/// management, and the administrative IP blocklist.
///
/// All time-dependent behavior flows through an injected [`Clock`], so tests
/// can simulate lockout expiry and token rotation deterministically.
pub struct Vigil<R: RepositoryProvider> {
    repositories: Arc<R>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    jwt: JwtConfig,
    two_factor_key: [u8; 32],

    accounts: Arc<AccountRepositoryAdapter<R>>,
    secure_tokens: Arc<SecureTokenRepositoryAdapter<R>>,
    history: Arc<LoginHistoryRepositoryAdapter<R>>,

    brute_force: Arc<BruteForceService<AccountRepositoryAdapter<R>>>,
    sessions: Arc<SessionService<SessionRepositoryAdapter<R>>>,
    revocation: Arc<RevocationService<RevokedTokenRepositoryAdapter<R>>>,
    two_factor: Arc<TwoFactorService<TwoFactorRepositoryAdapter<R>, AccountRepositoryAdapter<R>>>,
    ip_guard: Arc<IpGuardService<IpBlockRepositoryAdapter<R>>>,
    rate_limiter: Arc<RateLimiterService<IpBlockRepositoryAdapter<R>>>,
}

impl<R: RepositoryProvider> Vigil<R> {
    /// Create a new Vigil instance with default configuration: system clock,
    /// no notifier, a random HS256 JWT key, and a random TOTP sealing key.
    ///
    /// Random keys do not survive a restart. Production deployments should
    /// supply persistent material via [`Self::with_jwt`] and
    /// [`Self::with_two_factor_key`].
    pub fn new(repositories: Arc<R>) -> Self {
        Self::assemble(
            repositories,
            AuthConfig::default(),
            Arc::new(SystemClock),
            Arc::new(NullNotifier),
            JwtConfig::new_random_hs256(),
            crypto::generate_encryption_key(),
        )
    }

    fn assemble(
        repositories: Arc<R>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        jwt: JwtConfig,
        two_factor_key: [u8; 32],
    ) -> Self {
        let accounts = Arc::new(AccountRepositoryAdapter::new(repositories.clone()));
        let session_repo = Arc::new(SessionRepositoryAdapter::new(repositories.clone()));
        let revoked_repo = Arc::new(RevokedTokenRepositoryAdapter::new(repositories.clone()));
        let secure_tokens = Arc::new(SecureTokenRepositoryAdapter::new(repositories.clone()));
        let two_factor_repo = Arc::new(TwoFactorRepositoryAdapter::new(repositories.clone()));
        let ip_blocks = Arc::new(IpBlockRepositoryAdapter::new(repositories.clone()));
        let history = Arc::new(LoginHistoryRepositoryAdapter::new(repositories.clone()));

        let brute_force = Arc::new(BruteForceService::new(
            accounts.clone(),
            config.brute_force.clone(),
            clock.clone(),
            notifier.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            session_repo,
            config.session.clone(),
            clock.clone(),
        ));
        let revocation = Arc::new(RevocationService::new(revoked_repo, clock.clone()));
        let two_factor = Arc::new(TwoFactorService::new(
            two_factor_repo,
            accounts.clone(),
            config.two_factor.clone(),
            clock.clone(),
            two_factor_key,
            notifier.clone(),
        ));
        let ip_guard = Arc::new(IpGuardService::new(ip_blocks, clock.clone()));
        let rate_limiter = Arc::new(RateLimiterService::new(
            config.rate_limit.clone(),
            clock.clone(),
            ip_guard.clone(),
        ));

        Self {
            repositories,
            config,
            clock,
            notifier,
            jwt,
            two_factor_key,
            accounts,
            secure_tokens,
            history,
            brute_force,
            sessions,
            revocation,
            two_factor,
            ip_guard,
            rate_limiter,
        }
    }

    /// Replace the configuration. Rebuilds every service.
    pub fn with_config(self, config: AuthConfig) -> Self {
        Self::assemble(
            self.repositories,
            config,
            self.clock,
            self.notifier,
            self.jwt,
            self.two_factor_key,
        )
    }

    /// Replace the time source. Rebuilds every service.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(
            self.repositories,
            self.config,
            clock,
            self.notifier,
            self.jwt,
            self.two_factor_key,
        )
    }

    /// Attach a security-event notifier. Rebuilds every service.
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        Self::assemble(
            self.repositories,
            self.config,
            self.clock,
            notifier,
            self.jwt,
            self.two_factor_key,
        )
    }

    /// Use the given JWT signing configuration for access tokens.
    pub fn with_jwt(mut self, jwt: JwtConfig) -> Self {
        self.jwt = jwt;
        self
    }

    /// Use the given key for sealing TOTP secrets at rest. Rebuilds every
    /// service.
    pub fn with_two_factor_key(self, key: [u8; 32]) -> Self {
        Self::assemble(
            self.repositories,
            self.config,
            self.clock,
            self.notifier,
            self.jwt,
            key,
        )
    }

    /// Run migrations for the storage backend.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Health check for the storage backend.
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    // --- Registration and account access ---

    /// Register a new account with an email and password.
    ///
    /// The email must not already be registered; the password must meet the
    /// minimum length. The account starts unverified — login is rejected
    /// with [`AuthError::EmailNotVerified`] until
    /// [`Self::set_email_verified`] is called.
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, Error> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ValidationError::InvalidPassword(format!(
                "must be at least {MIN_PASSWORD_LEN} characters"
            ))
            .into());
        }

        let new_account = NewAccount::new(email)?.with_password_hash(crypto::hash_password(password));

        if self.accounts.find_by_email(&new_account.email).await?.is_some() {
            return Err(StorageError::Constraint("email already registered".to_string()).into());
        }

        let account = self.accounts.create(new_account).await?;
        tracing::info!(account_id = %account.id, "Account registered");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, Error> {
        self.accounts.find_by_id(account_id).await
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        self.accounts.find_by_email(email).await
    }

    /// Mark the account's email as verified as of now.
    pub async fn set_email_verified(&self, account_id: &AccountId) -> Result<(), Error> {
        self.accounts
            .mark_email_verified(account_id, self.clock.now())
            .await
    }

    /// Activate or deactivate an account. Inactive accounts cannot log in or
    /// refresh tokens.
    pub async fn set_account_active(
        &self,
        account_id: &AccountId,
        is_active: bool,
    ) -> Result<(), Error> {
        self.accounts.set_active(account_id, is_active).await
    }

    // --- Login and token issuance ---

    /// Authenticate with email and password.
    ///
    /// Perimeter guards run first: a blocked IP or an exhausted rate-limit
    /// tier rejects the attempt before any account lookup. An unknown email
    /// burns a dummy argon2 verification so the response time does not reveal
    /// whether the account exists. A wrong password counts toward the
    /// brute-force lockout; crossing the threshold also places an automatic
    /// block on the source IP.
    ///
    /// When the account has 2FA enabled, a correct password yields
    /// [`AuthOutcome::TwoFactorRequired`] with a short-lived challenge token
    /// to pass to [`Self::complete_two_factor`]. Otherwise a session, access
    /// JWT, and refresh token are issued directly.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<IpAddr>,
        device_info: Option<String>,
    ) -> Result<AuthOutcome, Error> {
        if let Some(ip) = ip {
            self.ip_guard.check(ip).await?;
            self.rate_limiter
                .enforce(RateLimitTier::AuthEndpoint, &ip.to_string())
                .await?;
        }

        let now = self.clock.now();
        let ip_str = ip.map(|i| i.to_string());

        let account = match self.accounts.find_by_email(email).await? {
            Some(account) => account,
            None => {
                crypto::verify_password_dummy(password);
                self.record_history(LoginHistoryEntry::failure(
                    None,
                    AuthMethod::Password,
                    "invalid_credentials",
                    ip_str,
                    now,
                ))
                .await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if let Err(e) = self.brute_force.check(&account) {
            self.record_history(LoginHistoryEntry::failure(
                Some(account.id.clone()),
                AuthMethod::Password,
                "account_locked",
                ip_str,
                now,
            ))
            .await;
            return Err(e);
        }

        let password_ok = account
            .password_hash
            .as_deref()
            .map(|hash| crypto::verify_password(password, hash))
            .unwrap_or_else(|| {
                crypto::verify_password_dummy(password);
                false
            });

        if !password_ok {
            let decision = self.brute_force.record_failure(&account.id).await?;
            if decision.newly_locked {
                if let Some(ip) = ip {
                    self.ip_guard
                        .record_auto_block(
                            ip,
                            BlockType::AutoBruteForce,
                            self.config.brute_force.lockout_duration,
                        )
                        .await?;
                }
            }
            self.record_history(LoginHistoryEntry::failure(
                Some(account.id.clone()),
                AuthMethod::Password,
                "invalid_credentials",
                ip_str,
                now,
            ))
            .await;
            return Err(AuthError::InvalidCredentials.into());
        }

        if !account.is_active {
            self.record_history(LoginHistoryEntry::failure(
                Some(account.id.clone()),
                AuthMethod::Password,
                "account_inactive",
                ip_str,
                now,
            ))
            .await;
            return Err(AuthError::AccountInactive.into());
        }

        if !account.is_email_verified() {
            self.record_history(LoginHistoryEntry::failure(
                Some(account.id.clone()),
                AuthMethod::Password,
                "email_not_verified",
                ip_str,
                now,
            ))
            .await;
            return Err(AuthError::EmailNotVerified.into());
        }

        if account.two_factor_enabled {
            return self.issue_two_factor_challenge(&account).await;
        }

        self.finalize_login(account, AuthMethod::Password, device_info, ip)
            .await
    }

    /// Exchange a two-factor challenge token plus a TOTP or backup code for
    /// a full session.
    ///
    /// The challenge is consumed only on success; a wrong code leaves it
    /// usable for another attempt (within its TTL and the 2FA lockout).
    pub async fn complete_two_factor(
        &self,
        challenge_token: &str,
        code: &str,
        ip: Option<IpAddr>,
        device_info: Option<String>,
    ) -> Result<AuthOutcome, Error> {
        if let Some(ip) = ip {
            self.ip_guard.check(ip).await?;
            self.rate_limiter
                .enforce(RateLimitTier::AuthEndpoint, &ip.to_string())
                .await?;
        }

        let now = self.clock.now();
        let challenge_hash = crypto::hash_token(challenge_token);
        let challenge = self
            .secure_tokens
            .peek(&challenge_hash, TokenPurpose::TwoFactorChallenge)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if challenge.used_at.is_some() {
            return Err(AuthError::TokenInvalid.into());
        }
        if challenge.expires_at <= now {
            return Err(AuthError::TokenExpired.into());
        }

        let account = self
            .accounts
            .find_by_id(&challenge.account_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let method = match self.two_factor.verify_code(&account, code).await {
            Ok(method) => method,
            Err(e) => {
                self.record_history(LoginHistoryEntry::failure(
                    Some(account.id.clone()),
                    AuthMethod::TotpCode,
                    "invalid_two_factor_code",
                    ip.map(|i| i.to_string()),
                    now,
                ))
                .await;
                return Err(e);
            }
        };

        // Single use: a concurrent claimant loses the race and gets rejected
        let consumed = self
            .secure_tokens
            .consume(&challenge_hash, TokenPurpose::TwoFactorChallenge, now)
            .await?;
        if !consumed {
            return Err(AuthError::TokenInvalid.into());
        }

        self.finalize_login(account, method, device_info, ip).await
    }

    /// Rotate a refresh token, minting a fresh access/refresh pair.
    ///
    /// The presented token is checked against the revocation registry and
    /// the stored hash, then swapped atomically — of N concurrent callers
    /// with the same token, exactly one wins. The superseded hash goes into
    /// the registry, so replaying it fails with [`AuthError::TokenRevoked`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ip: Option<IpAddr>,
    ) -> Result<TokenPair, Error> {
        if let Some(ip) = ip {
            self.ip_guard.check(ip).await?;
            self.rate_limiter
                .enforce(RateLimitTier::Ip, &ip.to_string())
                .await?;
        }

        let now = self.clock.now();
        let presented_hash = crypto::hash_token(refresh_token);

        if self.revocation.is_hash_revoked(&presented_hash).await? {
            self.record_history(LoginHistoryEntry::failure(
                None,
                AuthMethod::Refresh,
                "token_revoked",
                ip.map(|i| i.to_string()),
                now,
            ))
            .await;
            return Err(AuthError::TokenRevoked.into());
        }

        let account = self
            .accounts
            .find_by_refresh_token_hash(&presented_hash)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        let natural_expiry = account
            .refresh_token_expires_at
            .ok_or(AuthError::TokenInvalid)?;
        if natural_expiry <= now {
            return Err(AuthError::TokenExpired.into());
        }

        let new_refresh = crypto::generate_secure_token();
        let refresh_expires = now + self.config.tokens.refresh_token_lifetime;
        let swapped = self
            .accounts
            .swap_refresh_token(
                &account.id,
                &presented_hash,
                &crypto::hash_token(&new_refresh),
                refresh_expires,
            )
            .await?;
        if !swapped {
            // Lost the rotation race to a concurrent caller
            return Err(AuthError::TokenInvalid.into());
        }

        self.revocation
            .revoke_hash(
                &presented_hash,
                &account.id,
                RevocationReason::RefreshRotation,
                natural_expiry,
            )
            .await?;

        let access_expires = now + self.config.tokens.access_token_lifetime;
        let claims = JwtClaims {
            sub: account.id.to_string(),
            sid: None,
            iat: now.timestamp(),
            exp: access_expires.timestamp(),
            iss: self.jwt.issuer.clone(),
        };
        let access_token = self.jwt.sign(&claims)?;

        self.record_history(LoginHistoryEntry::success(
            account.id.clone(),
            AuthMethod::Refresh,
            ip.map(|i| i.to_string()),
            now,
        ))
        .await;

        Ok(TokenPair {
            access_token,
            access_token_expires_at: access_expires,
            refresh_token: new_refresh,
            refresh_token_expires_at: refresh_expires,
        })
    }

    /// Verify an access JWT and return its claims.
    ///
    /// Rejects revoked tokens (registry lookup by hash) and, for tokens tied
    /// to a session, tokens whose session has been revoked. Valid calls stamp
    /// session activity, throttled.
    pub async fn authenticate(&self, access_token: &str) -> Result<JwtClaims, Error> {
        let claims = self.jwt.verify(access_token)?;

        // jsonwebtoken checks exp against the wall clock; re-check against
        // the injected clock so tests behave
        let now = self.clock.now();
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired.into());
        }

        if self.revocation.is_revoked(access_token).await? {
            return Err(AuthError::TokenRevoked.into());
        }

        if let Some(session_id) = claims.session_id() {
            let session = self
                .sessions
                .get(&session_id)
                .await?
                .ok_or(AuthError::TokenRevoked)?;
            if session.is_expired(now) {
                return Err(AuthError::TokenExpired.into());
            }
            self.sessions.touch_activity(&session).await?;
        }

        Ok(claims)
    }

    /// Resolve a raw session token to its live session, stamping activity.
    pub async fn validate_session(&self, token: &SessionToken) -> Result<Session, Error> {
        self.sessions.validate(token).await
    }

    /// End the session behind the given token: the session is deleted, its
    /// outstanding access JWT and the account's refresh token are pushed into
    /// the revocation registry. Idempotent — an unknown or already-expired
    /// token is a no-op.
    pub async fn logout(&self, token: &SessionToken) -> Result<(), Error> {
        let session = match self.sessions.validate(token).await {
            Ok(session) => session,
            Err(Error::Auth(AuthError::TokenInvalid | AuthError::TokenExpired)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let account_id = session.account_id.clone();
        if let Some(session) = self.sessions.revoke(&session.id).await? {
            self.revocation
                .revoke_session_tokens(&[session], RevocationReason::Logout)
                .await?;
        }

        if let Some(account) = self.accounts.find_by_id(&account_id).await? {
            if let Some(hash) = &account.refresh_token_hash {
                let expiry = account
                    .refresh_token_expires_at
                    .unwrap_or_else(|| self.clock.now());
                self.revocation
                    .revoke_hash(hash, &account.id, RevocationReason::Logout, expiry)
                    .await?;
            }
            self.accounts.clear_refresh_token(&account.id).await?;
        }

        tracing::info!(account_id = %account_id, "Logged out");
        Ok(())
    }

    // --- Session management ---

    /// All live sessions for the account (one per device).
    pub async fn list_sessions(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        self.sessions.list_sessions(account_id).await
    }

    /// Revoke a single session, blacklisting its outstanding access token.
    pub async fn revoke_session(&self, session_id: &SessionId) -> Result<(), Error> {
        if let Some(session) = self.sessions.revoke(session_id).await? {
            self.revocation
                .revoke_session_tokens(&[session], RevocationReason::AdminRevoke)
                .await?;
        }
        Ok(())
    }

    /// Revoke every session and credential for the account: all sessions are
    /// deleted, their access tokens and the refresh token blacklisted.
    /// Returns the number of sessions revoked.
    pub async fn revoke_all_sessions(&self, account_id: &AccountId) -> Result<usize, Error> {
        self.revoke_account_credentials(account_id, RevocationReason::AdminRevoke)
            .await
    }

    async fn revoke_account_credentials(
        &self,
        account_id: &AccountId,
        reason: RevocationReason,
    ) -> Result<usize, Error> {
        let revoked = self.sessions.revoke_all(account_id).await?;
        self.revocation
            .revoke_session_tokens(&revoked, reason)
            .await?;

        if let Some(account) = self.accounts.find_by_id(account_id).await? {
            if let Some(hash) = &account.refresh_token_hash {
                let expiry = account
                    .refresh_token_expires_at
                    .unwrap_or_else(|| self.clock.now());
                self.revocation
                    .revoke_hash(hash, account_id, reason, expiry)
                    .await?;
            }
            self.accounts.clear_refresh_token(account_id).await?;
        }

        Ok(revoked.len())
    }

    /// Change the account password, verifying the current one first.
    ///
    /// Every session and outstanding token is revoked; the user must log in
    /// again everywhere.
    pub async fn change_password(
        &self,
        account_id: &AccountId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        let account = self.require_account(account_id).await?;
        let hash = account
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !crypto::verify_password(current_password, hash) {
            return Err(AuthError::InvalidCredentials.into());
        }
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(ValidationError::InvalidPassword(format!(
                "must be at least {MIN_PASSWORD_LEN} characters"
            ))
            .into());
        }

        self.accounts
            .update_password_hash(account_id, &crypto::hash_password(new_password))
            .await?;
        self.revoke_account_credentials(account_id, RevocationReason::PasswordChange)
            .await?;

        tracing::info!(account_id = %account_id, "Password changed");
        notify_best_effort(
            self.notifier.as_ref(),
            SecurityEvent::PasswordChanged,
            account_id,
            serde_json::json!({}),
        )
        .await;
        Ok(())
    }

    // --- Two-factor authentication ---

    /// Start 2FA enrollment: returns the provisioning secret and otpauth URL
    /// to show the user once. The factor stays disarmed until
    /// [`Self::confirm_two_factor`].
    pub async fn enroll_two_factor(&self, account_id: &AccountId) -> Result<Enrollment, Error> {
        let account = self.require_account(account_id).await?;
        self.two_factor.enroll(&account).await
    }

    /// Arm the factor with one valid code, returning the plaintext backup
    /// codes (shown exactly once).
    pub async fn confirm_two_factor(
        &self,
        account_id: &AccountId,
        code: &str,
    ) -> Result<Vec<String>, Error> {
        let account = self.require_account(account_id).await?;
        self.two_factor.confirm_enrollment(&account, code).await
    }

    /// Disable 2FA. Requires the current password as step-up proof.
    pub async fn disable_two_factor(
        &self,
        account_id: &AccountId,
        password: &str,
    ) -> Result<(), Error> {
        let account = self.require_account(account_id).await?;
        let hash = account
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !crypto::verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials.into());
        }
        self.two_factor.disable(account_id).await
    }

    /// How many one-time backup codes the account has left.
    pub async fn backup_codes_remaining(&self, account_id: &AccountId) -> Result<u32, Error> {
        self.two_factor.backup_codes_remaining(account_id).await
    }

    // --- IP blocklist and rate limiting ---

    /// Manually block a single IP address. `None` expiry means permanent.
    pub async fn block_ip(
        &self,
        ip: IpAddr,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IpBlockEntry, Error> {
        self.ip_guard.block_ip(ip, expires_at).await
    }

    /// Manually block a CIDR range, e.g. `192.168.1.0/24`.
    pub async fn block_ip_range(
        &self,
        cidr: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IpBlockEntry, Error> {
        self.ip_guard.block_range(cidr, expires_at).await
    }

    /// Deactivate a blocklist entry by id.
    pub async fn unblock_ip(&self, entry_id: &str) -> Result<(), Error> {
        self.ip_guard.unblock(entry_id).await
    }

    pub async fn list_ip_blocks(&self) -> Result<Vec<IpBlockEntry>, Error> {
        self.ip_guard.list().await
    }

    /// Reject if the IP is on the blocklist.
    pub async fn check_ip(&self, ip: IpAddr) -> Result<(), Error> {
        self.ip_guard.check(ip).await
    }

    /// Count one request against a rate-limit tier and report the verdict.
    /// Denials from IP-shaped keys escalate toward an automatic block.
    pub async fn check_rate_limit(
        &self,
        tier: RateLimitTier,
        key: &str,
    ) -> Result<RateLimitDecision, Error> {
        self.rate_limiter.check(tier, key).await
    }

    // --- Audit trail ---

    /// The most recent login attempts for the account, newest first.
    pub async fn login_history(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<LoginHistoryEntry>, Error> {
        self.history.list_for_account(account_id, limit).await
    }

    /// Trim the audit trail, deleting entries recorded before the given
    /// instant. Retention policy is the caller's; nothing expires on its own.
    pub async fn prune_login_history(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.history.cleanup_before(before).await
    }

    // --- Maintenance ---

    /// One sweep over everything that expires: sessions, revocation-registry
    /// entries, challenge tokens, automatic IP blocks, and idle rate-limit
    /// windows.
    pub async fn cleanup_expired(&self) -> Result<(), Error> {
        let now = self.clock.now();
        let sessions = self.sessions.cleanup_expired().await?;
        let revoked = self.revocation.cleanup_expired().await?;
        let challenges = self.secure_tokens.cleanup_expired(now).await?;
        let ip_blocks = self.ip_guard.cleanup_expired().await?;
        self.rate_limiter.prune_idle();
        tracing::info!(
            sessions,
            revoked,
            challenges,
            ip_blocks,
            "Expired security records swept"
        );
        Ok(())
    }

    /// Start the background cleanup task.
    ///
    /// Runs [`Self::cleanup_expired`] on the given interval until the
    /// shutdown channel fires.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let vigil = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = vigil.cleanup_expired().await {
                            tracing::warn!(error = %e, "Cleanup sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down security cleanup task");
                        break;
                    }
                }
            }
        })
    }

    // --- Internals ---

    async fn require_account(&self, account_id: &AccountId) -> Result<Account, Error> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| StorageError::NotFound.into())
    }

    /// History appends must not mask the authentication outcome.
    async fn record_history(&self, entry: LoginHistoryEntry) {
        if let Err(e) = self.history.record(entry).await {
            tracing::warn!(error = %e, "Failed to append login history entry");
        }
    }

    async fn issue_two_factor_challenge(&self, account: &Account) -> Result<AuthOutcome, Error> {
        let now = self.clock.now();
        // A fresh challenge supersedes any outstanding one
        self.secure_tokens
            .invalidate_for_account(&account.id, TokenPurpose::TwoFactorChallenge, now)
            .await?;

        let raw = crypto::generate_secure_token();
        let expires_at = now + self.config.tokens.challenge_lifetime;
        self.secure_tokens
            .create(SecureToken {
                token_hash: crypto::hash_token(&raw),
                account_id: account.id.clone(),
                purpose: TokenPurpose::TwoFactorChallenge,
                used_at: None,
                expires_at,
                created_at: now,
            })
            .await?;

        tracing::debug!(account_id = %account.id, "Two-factor challenge issued");
        Ok(AuthOutcome::TwoFactorRequired {
            challenge_token: raw,
            challenge_expires_at: expires_at,
        })
    }

    /// Full issuance after every guard has passed: reset the failure
    /// counter, create the session, mint the access JWT and refresh token,
    /// record the audit entry, and fire the login alert.
    async fn finalize_login(
        &self,
        account: Account,
        method: AuthMethod,
        device_info: Option<String>,
        ip: Option<IpAddr>,
    ) -> Result<AuthOutcome, Error> {
        self.brute_force.record_success(&account.id).await?;
        let account = self
            .accounts
            .find_by_id(&account.id)
            .await?
            .unwrap_or(account);

        let ip_str = ip.map(|i| i.to_string());
        let (mut session, token) = self
            .sessions
            .create_session(&account.id, device_info, ip_str.clone())
            .await?;

        let now = self.clock.now();
        let access_expires = now + self.config.tokens.access_token_lifetime;
        let claims = JwtClaims {
            sub: account.id.to_string(),
            sid: Some(session.id.to_string()),
            iat: now.timestamp(),
            exp: access_expires.timestamp(),
            iss: self.jwt.issuer.clone(),
        };
        let access_token = self.jwt.sign(&claims)?;
        let access_hash = crypto::hash_token(&access_token);
        self.sessions
            .record_access_token(&session.id, &access_hash, access_expires)
            .await?;
        session.access_token_hash = Some(access_hash);
        session.access_token_expires_at = Some(access_expires);

        let refresh_token = crypto::generate_secure_token();
        let refresh_expires = now + self.config.tokens.refresh_token_lifetime;
        self.accounts
            .set_refresh_token(&account.id, &crypto::hash_token(&refresh_token), refresh_expires)
            .await?;

        self.record_history(LoginHistoryEntry::success(
            account.id.clone(),
            method,
            ip_str.clone(),
            now,
        ))
        .await;

        tracing::info!(account_id = %account.id, session_id = %session.id, "Login succeeded");
        notify_best_effort(
            self.notifier.as_ref(),
            SecurityEvent::LoginAlert,
            &account.id,
            serde_json::json!({
                "ip": ip_str,
                "device": session.device_info,
                "method": method.as_str(),
            }),
        )
        .await;

        Ok(AuthOutcome::Authenticated {
            account,
            session,
            session_token: token.into_inner(),
            tokens: TokenPair {
                access_token,
                access_token_expires_at: access_expires,
                refresh_token,
                refresh_token_expires_at: refresh_expires,
            },
        })
    }
}
