//! Domain services
//!
//! Each service owns one security concern and is generic over the repository
//! traits it needs, so unit tests run against in-memory mocks and production
//! runs against a storage backend through the repository adapters. The
//! `vigil` facade composes these into the login/refresh/logout state machine.

pub mod brute_force;
pub mod ip_guard;
pub mod rate_limit;
pub mod revocation;
pub mod session;
pub mod two_factor;

#[cfg(test)]
pub(crate) mod test_support;

pub use brute_force::{BruteForceService, LockoutDecision};
pub use ip_guard::IpGuardService;
pub use rate_limit::{RateLimitDecision, RateLimitTier, RateLimiterService};
pub use revocation::RevocationService;
pub use session::SessionService;
pub use two_factor::TwoFactorService;
