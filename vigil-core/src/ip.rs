//! IP reputation blocklist entries
//!
//! An entry blocks either a single address (exact match, indexed lookup) or a
//! CIDR range (containment check). A request IP is blocked iff an active,
//! non-expired entry matches it. Automatic blocks carry an expiry; manual
//! blocks are permanent unless one is set explicitly, and are never cleared
//! by the expiry sweep.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Manual,
    AutoRateLimit,
    AutoBruteForce,
    AutoSuspicious,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Manual => "manual",
            BlockType::AutoRateLimit => "auto_rate_limit",
            BlockType::AutoBruteForce => "auto_brute_force",
            BlockType::AutoSuspicious => "auto_suspicious",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(BlockType::Manual),
            "auto_rate_limit" => Some(BlockType::AutoRateLimit),
            "auto_brute_force" => Some(BlockType::AutoBruteForce),
            "auto_suspicious" => Some(BlockType::AutoSuspicious),
            _ => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        !matches!(self, BlockType::Manual)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpBlockEntry {
    pub id: String,

    /// Exact address; mutually exclusive with `cidr_range`.
    pub ip_address: Option<String>,

    /// CIDR range, e.g. `192.168.1.0/24`; mutually exclusive with `ip_address`.
    pub cidr_range: Option<String>,

    pub block_type: BlockType,

    /// How many times this entry has been (re-)triggered.
    pub hit_count: u32,

    /// `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl IpBlockEntry {
    /// Whether this entry is in force at the given instant.
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }

    /// Whether this entry matches the given address, either exactly or by
    /// CIDR containment. Does not consider activity or expiry.
    pub fn matches(&self, ip: IpAddr) -> bool {
        if let Some(exact) = &self.ip_address {
            if exact.parse::<IpAddr>() == Ok(ip) {
                return true;
            }
        }
        if let Some(range) = &self.cidr_range {
            if let Ok(net) = range.parse::<IpNet>() {
                return net.contains(&ip);
            }
        }
        false
    }
}
