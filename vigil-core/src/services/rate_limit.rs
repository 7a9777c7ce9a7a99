//! Tiered request rate limiting
//!
//! Sliding-window log limiter with three windows per tier: a 10-second burst
//! window, a minute window, and an hour window. Counters live in process
//! memory (dashmap), which makes enforcement per-instance and approximate
//! behind a load balancer; that relaxation is accepted in exchange for
//! zero-latency checks on the hot path.
//!
//! Repeated denials from one IP escalate: past `violation_threshold` the IP
//! is handed to the [`IpGuardService`] as an automatic block, which is
//! durable and shared across instances.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    config::{RateLimitConfig, TierLimits},
    error::{AuthError, Error},
    services::ip_guard::IpGuardService,
    repositories::IpBlockRepository,
    BlockType, Clock,
};

const BURST_WINDOW_SECONDS: i64 = 10;

/// Which limit table applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Per source IP, any endpoint.
    Ip,
    /// Per authenticated account.
    User,
    /// Login, registration, and reset endpoints, keyed by IP.
    AuthEndpoint,
    /// General API traffic.
    Api,
}

impl RateLimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Ip => "ip",
            RateLimitTier::User => "user",
            RateLimitTier::AuthEndpoint => "auth_endpoint",
            RateLimitTier::Api => "api",
        }
    }

    fn limits(&self, config: &RateLimitConfig) -> TierLimits {
        match self {
            RateLimitTier::Ip => config.ip,
            RateLimitTier::User => config.user,
            RateLimitTier::AuthEndpoint => config.auth_endpoint,
            RateLimitTier::Api => config.api,
        }
    }
}

impl std::fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one rate-limit check, with the headers-worth of metadata
/// callers surface to clients.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tier: RateLimitTier,
    /// The per-minute ceiling for the tier.
    pub limit: u32,
    /// Requests left in the current minute window.
    pub remaining: u32,
    /// When the minute window frees up.
    pub reset_at: DateTime<Utc>,
    /// How long to wait before retrying; set only on denial.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    pub fn retry_after_seconds(&self) -> u64 {
        self.retry_after
            .map(|d| d.num_seconds().max(1) as u64)
            .unwrap_or(0)
    }
}

pub struct RateLimiterService<I: IpBlockRepository> {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    /// Request timestamps per (tier, key), pruned to the hour window.
    windows: DashMap<(RateLimitTier, String), Vec<DateTime<Utc>>>,
    /// Denial counts per IP, feeding the auto-block escalation.
    violations: DashMap<IpAddr, u32>,
    ip_guard: Arc<IpGuardService<I>>,
}

impl<I: IpBlockRepository> RateLimiterService<I> {
    pub fn new(
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
        ip_guard: Arc<IpGuardService<I>>,
    ) -> Self {
        Self {
            config,
            clock,
            windows: DashMap::new(),
            violations: DashMap::new(),
            ip_guard,
        }
    }

    /// Check and count one request. Denials from a key that is an IP address
    /// accumulate toward the automatic-block threshold.
    pub async fn check(&self, tier: RateLimitTier, key: &str) -> Result<RateLimitDecision, Error> {
        let now = self.clock.now();
        let limits = tier.limits(&self.config);

        if !self.config.enabled {
            return Ok(RateLimitDecision {
                allowed: true,
                tier,
                limit: limits.per_minute,
                remaining: limits.per_minute,
                reset_at: now + Duration::seconds(60),
                retry_after: None,
            });
        }

        let decision = {
            let mut entry = self
                .windows
                .entry((tier, key.to_string()))
                .or_default();
            let events = entry.value_mut();
            events.retain(|&t| t > now - Duration::hours(1));

            let burst_cutoff = now - Duration::seconds(BURST_WINDOW_SECONDS);
            let minute_cutoff = now - Duration::seconds(60);
            let in_burst = events.iter().filter(|&&t| t > burst_cutoff).count() as u32;
            let in_minute = events.iter().filter(|&&t| t > minute_cutoff).count() as u32;
            let in_hour = events.len() as u32;

            let denial = if in_burst >= limits.burst {
                Some(retry_after(events, burst_cutoff, BURST_WINDOW_SECONDS, now))
            } else if in_minute >= limits.per_minute {
                Some(retry_after(events, minute_cutoff, 60, now))
            } else if in_hour >= limits.per_hour {
                Some(retry_after(events, now - Duration::hours(1), 3600, now))
            } else {
                None
            };

            let reset_at = events
                .iter()
                .find(|&&t| t > minute_cutoff)
                .map(|&t| t + Duration::seconds(60))
                .unwrap_or(now + Duration::seconds(60));

            match denial {
                Some(wait) => RateLimitDecision {
                    allowed: false,
                    tier,
                    limit: limits.per_minute,
                    remaining: limits.per_minute.saturating_sub(in_minute),
                    reset_at,
                    retry_after: Some(wait),
                },
                None => {
                    events.push(now);
                    RateLimitDecision {
                        allowed: true,
                        tier,
                        limit: limits.per_minute,
                        remaining: limits.per_minute.saturating_sub(in_minute + 1),
                        reset_at,
                        retry_after: None,
                    }
                }
            }
        };

        if !decision.allowed {
            tracing::debug!(tier = %tier, key, "Rate limit exceeded");
            if let Ok(ip) = key.parse::<IpAddr>() {
                self.record_violation(ip).await?;
            }
        }

        Ok(decision)
    }

    /// Like [`check`](Self::check), but maps a denial to
    /// [`AuthError::RateLimited`].
    pub async fn enforce(&self, tier: RateLimitTier, key: &str) -> Result<(), Error> {
        let decision = self.check(tier, key).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(AuthError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds(),
            }
            .into())
        }
    }

    async fn record_violation(&self, ip: IpAddr) -> Result<(), Error> {
        let count = {
            let mut entry = self.violations.entry(ip).or_insert(0);
            *entry += 1;
            *entry
        };

        if count >= self.config.violation_threshold {
            self.violations.remove(&ip);
            self.ip_guard
                .record_auto_block(ip, BlockType::AutoRateLimit, self.config.auto_block_duration)
                .await?;
        }
        Ok(())
    }

    /// Drop window entries with no activity inside the hour. Called from the
    /// periodic cleanup sweep to bound memory.
    pub fn prune_idle(&self) {
        let cutoff = self.clock.now() - Duration::hours(1);
        self.windows
            .retain(|_, events| events.iter().any(|&t| t > cutoff));
    }
}

fn retry_after(
    events: &[DateTime<Utc>],
    cutoff: DateTime<Utc>,
    window_seconds: i64,
    now: DateTime<Utc>,
) -> Duration {
    events
        .iter()
        .find(|&&t| t > cutoff)
        .map(|&t| t + Duration::seconds(window_seconds) - now)
        .unwrap_or_else(|| Duration::seconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::MockIpBlockRepository;
    use crate::TestClock;

    fn service(
        config: RateLimitConfig,
        clock: Arc<TestClock>,
    ) -> RateLimiterService<MockIpBlockRepository> {
        let ip_guard = Arc::new(IpGuardService::new(
            Arc::new(MockIpBlockRepository::default()),
            clock.clone(),
        ));
        RateLimiterService::new(config, clock, ip_guard)
    }

    #[tokio::test]
    async fn test_burst_limit() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(RateLimitConfig::default(), clock);

        // auth_endpoint burst allowance is 5 inside 10 seconds
        for _ in 0..5 {
            let d = service
                .check(RateLimitTier::AuthEndpoint, "user-key")
                .await
                .unwrap();
            assert!(d.allowed);
        }
        let denied = service
            .check(RateLimitTier::AuthEndpoint, "user-key")
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after_seconds() >= 1);
    }

    #[tokio::test]
    async fn test_minute_limit_and_recovery() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(RateLimitConfig::default(), clock.clone());

        // Pace requests so only the per-minute limit (10) can trip
        for _ in 0..10 {
            let d = service
                .check(RateLimitTier::AuthEndpoint, "user-key")
                .await
                .unwrap();
            assert!(d.allowed);
            clock.advance(Duration::seconds(3));
        }
        let denied = service
            .check(RateLimitTier::AuthEndpoint, "user-key")
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        clock.advance(Duration::seconds(61));
        let d = service
            .check(RateLimitTier::AuthEndpoint, "user-key")
            .await
            .unwrap();
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(RateLimitConfig::default(), clock);

        for _ in 0..5 {
            service
                .check(RateLimitTier::AuthEndpoint, "key-a")
                .await
                .unwrap();
        }
        assert!(
            !service
                .check(RateLimitTier::AuthEndpoint, "key-a")
                .await
                .unwrap()
                .allowed
        );
        assert!(
            service
                .check(RateLimitTier::AuthEndpoint, "key-b")
                .await
                .unwrap()
                .allowed
        );
    }

    #[tokio::test]
    async fn test_disabled_always_allows() {
        let clock = Arc::new(TestClock::starting_now());
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let service = service(config, clock);

        for _ in 0..100 {
            assert!(
                service
                    .check(RateLimitTier::AuthEndpoint, "key")
                    .await
                    .unwrap()
                    .allowed
            );
        }
    }

    #[tokio::test]
    async fn test_repeat_violations_escalate_to_ip_block() {
        let clock = Arc::new(TestClock::starting_now());
        let ip_guard = Arc::new(IpGuardService::new(
            Arc::new(MockIpBlockRepository::default()),
            clock.clone(),
        ));
        let config = RateLimitConfig {
            violation_threshold: 3,
            ..RateLimitConfig::default()
        };
        let service = RateLimiterService::new(config, clock, ip_guard.clone());
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        // Exhaust the burst allowance, then rack up denials
        for _ in 0..5 {
            service
                .check(RateLimitTier::AuthEndpoint, &ip.to_string())
                .await
                .unwrap();
        }
        for _ in 0..3 {
            assert!(
                !service
                    .check(RateLimitTier::AuthEndpoint, &ip.to_string())
                    .await
                    .unwrap()
                    .allowed
            );
        }

        assert!(matches!(
            ip_guard.check(ip).await,
            Err(Error::Auth(AuthError::IpBlocked))
        ));
    }

    #[tokio::test]
    async fn test_enforce_maps_to_rate_limited() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(RateLimitConfig::default(), clock);

        for _ in 0..5 {
            service
                .enforce(RateLimitTier::AuthEndpoint, "key")
                .await
                .unwrap();
        }
        let result = service.enforce(RateLimitTier::AuthEndpoint, "key").await;
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::RateLimited { .. }))
        ));
    }

    #[tokio::test]
    async fn test_prune_idle_drops_stale_windows() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(RateLimitConfig::default(), clock.clone());

        service.check(RateLimitTier::Api, "key").await.unwrap();
        assert_eq!(service.windows.len(), 1);

        clock.advance(Duration::hours(2));
        service.prune_idle();
        assert_eq!(service.windows.len(), 0);
    }
}
