use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::{BlockType, Error, IpBlockEntry};

/// Repository for the IP and CIDR blocklist.
///
/// Exact-IP lookups go through `find_exact`; CIDR containment is evaluated in
/// the service against `list_active_ranges`, since range membership is not a
/// uniform query across backing stores.
#[async_trait]
pub trait IpBlockRepository: Send + Sync + 'static {
    async fn create(&self, entry: IpBlockEntry) -> Result<IpBlockEntry, Error>;

    /// Active entries whose `ip_address` equals `ip` exactly.
    async fn find_exact(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error>;

    /// All active entries carrying a `cidr_range`.
    async fn list_active_ranges(&self, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error>;

    async fn list_all(&self) -> Result<Vec<IpBlockEntry>, Error>;

    /// Insert an automatic block for `ip`, or if an active automatic block of
    /// the same type already exists, bump its `hit_count` and extend its
    /// expiry. Returns the resulting entry.
    async fn upsert_auto_block(
        &self,
        ip: IpAddr,
        block_type: BlockType,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IpBlockEntry, Error>;

    /// Deactivate an entry by id. Deactivating an unknown id is a no-op.
    async fn deactivate(&self, id: &str) -> Result<(), Error>;

    /// Remove entries whose `expires_at` is at or before `now`, returning
    /// how many were deleted.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
