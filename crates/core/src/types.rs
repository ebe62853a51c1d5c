//! Core types for the fleet registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CoreError;

/// Node identity: `<ip>:<port>`.
///
/// The identity is derived, never supplied by the reporting node, so a node that
/// changes address shows up as a new record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Derive the identity of a node reachable at `ip:port`.
    pub fn from_addr(ip: &str, port: u16) -> Self {
        NodeId(format!("{}:{}", ip, port))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Heartbeat payload as reported by a node.
///
/// `ip`, `port`, `username` and `password` are required; the geo attributes are
/// best-effort and default to empty. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Public address the node's proxy listens on.
    pub ip: String,
    /// Proxy port.
    pub port: i64,
    /// Proxy username.
    pub username: String,
    /// Proxy password.
    pub password: String,
    /// Country reported by the node.
    #[serde(default)]
    pub country: String,
    /// Region reported by the node.
    #[serde(default)]
    pub region: String,
    /// City reported by the node.
    #[serde(default)]
    pub city: String,
}

impl Heartbeat {
    /// Validate and normalize the payload.
    ///
    /// The address and geo attributes are trimmed; credentials are kept verbatim.
    pub fn validate(&self) -> Result<NodeInfo, CoreError> {
        let ip = self.ip.trim();
        if ip.is_empty() {
            return Err(CoreError::EmptyIp);
        }

        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(CoreError::InvalidPort(self.port))?;

        Ok(NodeInfo {
            id: NodeId::from_addr(ip, port),
            ip: ip.to_string(),
            port,
            username: self.username.clone(),
            password: self.password.clone(),
            country: self.country.trim().to_string(),
            region: self.region.trim().to_string(),
            city: self.city.trim().to_string(),
        })
    }
}

/// A validated heartbeat, ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Derived identity.
    pub id: NodeId,
    /// Node address.
    pub ip: String,
    /// Node proxy port.
    pub port: u16,
    /// Proxy username.
    pub username: String,
    /// Proxy password.
    pub password: String,
    /// Country (may be empty).
    pub country: String,
    /// Region (may be empty).
    pub region: String,
    /// City (may be empty).
    pub city: String,
}

/// A node as stored in the registry.
///
/// Serialized with the wire names the fleet clients already consume
/// (`id`, `is_online`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identity (`ip:port`).
    #[serde(rename = "id")]
    pub identity: NodeId,
    /// Node address.
    pub ip: String,
    /// Node proxy port.
    pub port: u16,
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
    #[serde(rename = "is_online")]
    pub online: bool,
    /// Time of the most recent accepted heartbeat.
    pub last_seen: DateTime<Utc>,
    /// Time of the first heartbeat.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation (heartbeat or sweep).
    pub updated_at: DateTime<Utc>,
}

impl NodeRecord {
    /// Whether the record belongs to the live set at `now`.
    ///
    /// Live means the online flag is set and the last heartbeat is strictly newer
    /// than `now - window`.
    pub fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return self.online;
        };
        self.online && self.last_seen > now - window
    }
}
