//! IP reputation blocking
//!
//! Callers run `check` before any credential work. Exact-address entries are
//! resolved by indexed lookup in storage; CIDR entries are fetched and
//! evaluated here by containment, since range membership is not a uniform
//! query across backends. Manual blocks are operator-made and permanent by
//! default; automatic blocks come from the rate limiter and brute-force
//! escalation and always expire.

use chrono::{DateTime, Duration, Utc};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    error::{AuthError, Error, ValidationError},
    id::generate_prefixed_id,
    repositories::IpBlockRepository,
    BlockType, Clock, IpBlockEntry,
};

pub struct IpGuardService<I: IpBlockRepository> {
    blocks: Arc<I>,
    clock: Arc<dyn Clock>,
}

impl<I: IpBlockRepository> IpGuardService<I> {
    pub fn new(blocks: Arc<I>, clock: Arc<dyn Clock>) -> Self {
        Self { blocks, clock }
    }

    /// Reject the request if any active, non-expired entry matches the IP.
    pub async fn check(&self, ip: IpAddr) -> Result<(), Error> {
        let now = self.clock.now();

        if !self.blocks.find_exact(ip, now).await?.is_empty() {
            tracing::warn!(ip = %ip, "Request from blocked IP");
            return Err(AuthError::IpBlocked.into());
        }

        for entry in self.blocks.list_active_ranges(now).await? {
            if entry.matches(ip) {
                tracing::warn!(ip = %ip, range = ?entry.cidr_range, "Request from blocked range");
                return Err(AuthError::IpBlocked.into());
            }
        }

        Ok(())
    }

    /// Manually block a single address. `None` expiry means permanent.
    pub async fn block_ip(
        &self,
        ip: IpAddr,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IpBlockEntry, Error> {
        let entry = self
            .blocks
            .create(IpBlockEntry {
                id: generate_prefixed_id("ipb"),
                ip_address: Some(ip.to_string()),
                cidr_range: None,
                block_type: BlockType::Manual,
                hit_count: 0,
                expires_at,
                is_active: true,
                created_at: self.clock.now(),
            })
            .await?;
        tracing::info!(ip = %ip, "IP manually blocked");
        Ok(entry)
    }

    /// Manually block a CIDR range, e.g. `192.168.1.0/24`.
    pub async fn block_range(
        &self,
        cidr: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IpBlockEntry, Error> {
        let net: IpNet = cidr
            .parse()
            .map_err(|_| ValidationError::InvalidIpAddress(cidr.to_string()))?;

        let entry = self
            .blocks
            .create(IpBlockEntry {
                id: generate_prefixed_id("ipb"),
                ip_address: None,
                cidr_range: Some(net.to_string()),
                block_type: BlockType::Manual,
                hit_count: 0,
                expires_at,
                is_active: true,
                created_at: self.clock.now(),
            })
            .await?;
        tracing::info!(range = %net, "IP range manually blocked");
        Ok(entry)
    }

    /// Record an automatic block, stacking hits onto an existing active one
    /// of the same type instead of duplicating it.
    pub async fn record_auto_block(
        &self,
        ip: IpAddr,
        block_type: BlockType,
        duration: Duration,
    ) -> Result<IpBlockEntry, Error> {
        debug_assert!(block_type.is_auto());
        let now = self.clock.now();
        let entry = self
            .blocks
            .upsert_auto_block(ip, block_type, now + duration, now)
            .await?;
        tracing::warn!(
            ip = %ip,
            block_type = %block_type,
            hit_count = entry.hit_count,
            "IP automatically blocked"
        );
        Ok(entry)
    }

    pub async fn unblock(&self, id: &str) -> Result<(), Error> {
        self.blocks.deactivate(id).await
    }

    pub async fn list(&self) -> Result<Vec<IpBlockEntry>, Error> {
        self.blocks.list_all().await
    }

    pub async fn cleanup_expired(&self) -> Result<u64, Error> {
        self.blocks.cleanup_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::MockIpBlockRepository;
    use crate::TestClock;

    fn service(clock: Arc<TestClock>) -> IpGuardService<MockIpBlockRepository> {
        IpGuardService::new(Arc::new(MockIpBlockRepository::default()), clock)
    }

    #[tokio::test]
    async fn test_exact_block() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        assert!(service.check(ip).await.is_ok());
        service.block_ip(ip, None).await.unwrap();

        assert!(matches!(
            service.check(ip).await,
            Err(Error::Auth(AuthError::IpBlocked))
        ));
        assert!(service.check("203.0.113.10".parse().unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_range_block() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);

        service.block_range("198.51.100.0/24", None).await.unwrap();

        assert!(service.check("198.51.100.200".parse().unwrap()).await.is_err());
        assert!(service.check("198.51.101.1".parse().unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_cidr_rejected() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);

        assert!(service.block_range("not-a-range", None).await.is_err());
        assert!(service.block_range("10.0.0.1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_auto_block_expires() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock.clone());
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        service
            .record_auto_block(ip, BlockType::AutoRateLimit, Duration::hours(1))
            .await
            .unwrap();
        assert!(service.check(ip).await.is_err());

        clock.advance(Duration::hours(2));
        assert!(service.check(ip).await.is_ok());
    }

    #[tokio::test]
    async fn test_repeat_auto_block_stacks_hits() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        let first = service
            .record_auto_block(ip, BlockType::AutoBruteForce, Duration::hours(1))
            .await
            .unwrap();
        let second = service
            .record_auto_block(ip, BlockType::AutoBruteForce, Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.hit_count, 2);
    }

    #[tokio::test]
    async fn test_unblock() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        let entry = service.block_ip(ip, None).await.unwrap();
        assert!(service.check(ip).await.is_err());

        service.unblock(&entry.id).await.unwrap();
        assert!(service.check(ip).await.is_ok());
    }
}
