use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::net::IpAddr;
use vigil_core::{
    error::StorageError, id::generate_prefixed_id, repositories::IpBlockRepository, BlockType,
    Error, IpBlockEntry,
};

pub struct SqliteIpBlockRepository {
    pool: SqlitePool,
}

impl SqliteIpBlockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteIpBlockEntry {
    id: String,
    ip_address: Option<String>,
    cidr_range: Option<String>,
    block_type: String,
    hit_count: i64,
    expires_at: Option<i64>,
    is_active: bool,
    created_at: i64,
}

impl TryFrom<SqliteIpBlockEntry> for IpBlockEntry {
    type Error = Error;

    fn try_from(entry: SqliteIpBlockEntry) -> Result<Self, Error> {
        let block_type = BlockType::from_str(&entry.block_type).ok_or_else(|| {
            Error::Storage(StorageError::Database(format!(
                "unknown block type: {}",
                entry.block_type
            )))
        })?;
        Ok(IpBlockEntry {
            id: entry.id,
            ip_address: entry.ip_address,
            cidr_range: entry.cidr_range,
            block_type,
            hit_count: entry.hit_count.max(0) as u32,
            expires_at: entry.expires_at.and_then(|t| DateTime::from_timestamp(t, 0)),
            is_active: entry.is_active,
            created_at: DateTime::from_timestamp(entry.created_at, 0).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl IpBlockRepository for SqliteIpBlockRepository {
    async fn create(&self, entry: IpBlockEntry) -> Result<IpBlockEntry, Error> {
        let row = sqlx::query_as::<_, SqliteIpBlockEntry>(
            r#"
            INSERT INTO ip_blocklist
                (id, ip_address, cidr_range, block_type, hit_count, expires_at, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.ip_address)
        .bind(&entry.cidr_range)
        .bind(entry.block_type.as_str())
        .bind(entry.hit_count as i64)
        .bind(entry.expires_at.map(|t| t.timestamp()))
        .bind(entry.is_active)
        .bind(entry.created_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create IP block entry");
            Error::Storage(StorageError::Database(e.to_string()))
        })?;

        row.try_into()
    }

    async fn find_exact(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        let rows = sqlx::query_as::<_, SqliteIpBlockEntry>(
            r#"
            SELECT * FROM ip_blocklist
            WHERE ip_address = ?1 AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?2)
            "#,
        )
        .bind(ip.to_string())
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        rows.into_iter().map(IpBlockEntry::try_from).collect()
    }

    async fn list_active_ranges(&self, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        let rows = sqlx::query_as::<_, SqliteIpBlockEntry>(
            r#"
            SELECT * FROM ip_blocklist
            WHERE cidr_range IS NOT NULL AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?1)
            "#,
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        rows.into_iter().map(IpBlockEntry::try_from).collect()
    }

    async fn list_all(&self) -> Result<Vec<IpBlockEntry>, Error> {
        let rows =
            sqlx::query_as::<_, SqliteIpBlockEntry>("SELECT * FROM ip_blocklist ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        rows.into_iter().map(IpBlockEntry::try_from).collect()
    }

    async fn upsert_auto_block(
        &self,
        ip: IpAddr,
        block_type: BlockType,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IpBlockEntry, Error> {
        // Re-triggering an active block of the same type bumps its hit count
        // and extends the window instead of stacking duplicate rows
        let updated = sqlx::query_as::<_, SqliteIpBlockEntry>(
            r#"
            UPDATE ip_blocklist
            SET hit_count = hit_count + 1, expires_at = ?3
            WHERE ip_address = ?1 AND block_type = ?2 AND is_active = 1
              AND (expires_at IS NULL OR expires_at > ?4)
            RETURNING *
            "#,
        )
        .bind(ip.to_string())
        .bind(block_type.as_str())
        .bind(expires_at.timestamp())
        .bind(now.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        if let Some(row) = updated {
            return row.try_into();
        }

        let row = sqlx::query_as::<_, SqliteIpBlockEntry>(
            r#"
            INSERT INTO ip_blocklist
                (id, ip_address, cidr_range, block_type, hit_count, expires_at, is_active, created_at)
            VALUES (?1, ?2, NULL, ?3, 1, ?4, 1, ?5)
            RETURNING *
            "#,
        )
        .bind(generate_prefixed_id("ipb"))
        .bind(ip.to_string())
        .bind(block_type.as_str())
        .bind(expires_at.timestamp())
        .bind(now.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        row.try_into()
    }

    async fn deactivate(&self, id: &str) -> Result<(), Error> {
        sqlx::query("UPDATE ip_blocklist SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            "DELETE FROM ip_blocklist WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        )
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;

        Ok(result.rows_affected())
    }
}
