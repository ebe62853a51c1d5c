//! Heartbeat payload sources.

use anyhow::Result;
use async_trait::async_trait;
use fleet_core::Heartbeat;

/// Produces the payload sent on each heartbeat.
///
/// Called once per tick, so an implementation may re-read credentials or re-resolve
/// its public address every time. A failure skips that tick's heartbeat.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Build the heartbeat payload for this tick.
    async fn gather(&self) -> Result<Heartbeat>;
}

/// Serves a fixed payload, typically taken from the agent config.
#[derive(Debug, Clone)]
pub struct StaticMetadataProvider {
    heartbeat: Heartbeat,
}

impl StaticMetadataProvider {
    /// Wrap a fixed heartbeat payload.
    pub fn new(heartbeat: Heartbeat) -> Self {
        Self { heartbeat }
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn gather(&self) -> Result<Heartbeat> {
        Ok(self.heartbeat.clone())
    }
}
