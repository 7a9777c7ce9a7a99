//! Tunables for the security subsystem
//!
//! Everything time- or threshold-dependent is configured here with sane
//! defaults. Lockout windows are fixed (no escalation on repeat offenses)
//! and backup codes are not regenerated automatically — both deliberate
//! simplicity trade-offs.

use chrono::Duration;

/// Login brute-force protection.
#[derive(Debug, Clone)]
pub struct BruteForceConfig {
    pub enabled: bool,
    /// Consecutive failures that trigger a lockout.
    pub max_failed_attempts: u32,
    /// Fixed lockout window; does not escalate.
    pub lockout_duration: Duration,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

impl BruteForceConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Two-factor verification policy.
#[derive(Debug, Clone)]
pub struct TwoFactorPolicy {
    /// Single-use backup codes issued at enrollment confirmation.
    pub backup_code_count: u32,
    /// Failed code attempts before the 2FA-specific lockout. Separate from
    /// the login brute-force threshold by design.
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    /// TOTP step length in seconds.
    pub totp_step_seconds: u64,
    /// Steps of clock skew accepted on each side of the current step.
    pub totp_skew_steps: u8,
    /// Issuer embedded in otpauth:// provisioning URLs.
    pub issuer: String,
}

impl Default for TwoFactorPolicy {
    fn default() -> Self {
        Self {
            backup_code_count: 10,
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
            totp_step_seconds: 30,
            totp_skew_steps: 1,
            issuer: "vigil".to_string(),
        }
    }
}

/// Session lifetime and activity tracking.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub lifetime: Duration,
    /// Minimum gap between `last_active_at` writes; validation within the
    /// gap skips the write.
    pub activity_update_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::days(30),
            activity_update_interval: Duration::seconds(60),
        }
    }
}

/// Access/refresh/challenge token lifetimes.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// Lifetime of the two-factor challenge handed out after the password
    /// step.
    pub challenge_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::minutes(15),
            refresh_token_lifetime: Duration::days(30),
            challenge_lifetime: Duration::minutes(5),
        }
    }
}

/// Limits for one rate-limit tier.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    /// Allowance inside a 10-second burst window.
    pub burst: u32,
}

/// Tiered rate limiting. Counters are kept in process memory: lowest
/// latency, per-instance, and therefore approximate behind a load balancer —
/// a documented relaxation, not a bug.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Per-source-IP tier.
    pub ip: TierLimits,
    /// Per-authenticated-user tier.
    pub user: TierLimits,
    /// Login/register/reset endpoints.
    pub auth_endpoint: TierLimits,
    /// General API tier.
    pub api: TierLimits,
    /// Denials for one IP before escalating to an automatic IP block.
    pub violation_threshold: u32,
    pub auto_block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip: TierLimits {
                per_minute: 120,
                per_hour: 2000,
                burst: 40,
            },
            user: TierLimits {
                per_minute: 120,
                per_hour: 3000,
                burst: 40,
            },
            auth_endpoint: TierLimits {
                per_minute: 10,
                per_hour: 50,
                burst: 5,
            },
            api: TierLimits {
                per_minute: 300,
                per_hour: 10000,
                burst: 100,
            },
            violation_threshold: 5,
            auto_block_duration: Duration::hours(1),
        }
    }
}

/// Aggregate configuration for the whole subsystem.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub brute_force: BruteForceConfig,
    pub two_factor: TwoFactorPolicy,
    pub session: SessionConfig,
    pub tokens: TokenConfig,
    pub rate_limit: RateLimitConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = AuthConfig::default();
        assert_eq!(config.brute_force.max_failed_attempts, 5);
        assert_eq!(config.brute_force.lockout_duration, Duration::minutes(15));
        assert_eq!(config.two_factor.backup_code_count, 10);
        assert_eq!(config.two_factor.totp_skew_steps, 1);
        assert_eq!(config.tokens.challenge_lifetime, Duration::minutes(5));
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_disabled_brute_force() {
        assert!(!BruteForceConfig::disabled().enabled);
    }
}
