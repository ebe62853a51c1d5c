//! Database types for the registry storage layer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fleet_core::types::{NodeId, NodeRecord};
use serde::Serialize;

/// Row from `node_records`.
#[derive(Debug, sqlx::FromRow)]
pub struct DbNode {
    /// Node identity (`ip:port`).
    pub id: String,
    /// Node address.
    pub ip: String,
    /// Proxy port.
    pub port: i64,
    /// Proxy username.
    pub username: String,
    /// Proxy password.
    pub password: String,
    /// Country.
    pub country: String,
    /// Region.
    pub region: String,
    /// City.
    pub city: String,
    /// Persisted online flag.
    pub online: bool,
    /// Last accepted heartbeat (unix ms).
    pub last_seen_ms: i64,
    /// First heartbeat (unix ms).
    pub created_at_ms: i64,
    /// Last mutation (unix ms).
    pub updated_at_ms: i64,
}

impl TryFrom<DbNode> for NodeRecord {
    type Error = anyhow::Error;

    fn try_from(row: DbNode) -> Result<Self> {
        let port = u16::try_from(row.port)
            .with_context(|| format!("Stored port out of range for node {}", row.id))?;
        let ip = row.ip;

        Ok(NodeRecord {
            identity: NodeId::from_addr(&ip, port),
            ip,
            port,
            username: row.username,
            password: row.password,
            country: row.country,
            region: row.region,
            city: row.city,
            online: row.online,
            last_seen: from_unix_ms(row.last_seen_ms)?,
            created_at: from_unix_ms(row.created_at_ms)?,
            updated_at: from_unix_ms(row.updated_at_ms)?,
        })
    }
}

fn from_unix_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .with_context(|| format!("Stored timestamp out of range: {}", ms))
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Total number of node records (online or not).
    pub total: u64,

    /// Records whose persisted online flag is set.
    pub online_flagged: u64,

    /// Records in the live set (online flag and fresh heartbeat).
    pub live: u64,
}
