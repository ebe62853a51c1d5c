//! HTTP delivery of heartbeats to the registry.

use anyhow::{Context, Result};
use fleet_core::Heartbeat;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Posts heartbeat payloads to the registry's ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HeartbeatSender {
    client: Client,
    url: String,
}

impl HeartbeatSender {
    /// Build a sender for the full heartbeat `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fleet-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build heartbeat HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint this sender posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one heartbeat. Anything other than `200 OK` is an error.
    pub async fn send(&self, heartbeat: &Heartbeat) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(heartbeat)
            .send()
            .await
            .with_context(|| format!("Failed to post heartbeat to {}", self.url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Registry returned status {}: {}", status.as_u16(), body.trim());
        }

        Ok(())
    }
}
