//! Agent configuration.
//!
//! ```toml
//! registry_url = "https://registry.example.com"
//! interval_secs = 60
//! timeout_secs = 10
//!
//! [node]
//! ip = "203.0.113.7"
//! port = 1080
//! username = "${PROXY_USERNAME}"
//! password = "${PROXY_PASSWORD}"
//! country = "US"
//! ```

use anyhow::{Context, Result};
use fleet_core::constants::{HEARTBEAT_INTERVAL_SECS, HEARTBEAT_PATH, HEARTBEAT_TIMEOUT_SECS};
use fleet_core::{expand_env_vars, Heartbeat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the heartbeat agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Registry base URL (the heartbeat path is appended)
    pub registry_url: String,

    /// Seconds between heartbeats
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// HTTP timeout per heartbeat in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Payload reported on every heartbeat
    pub node: Heartbeat,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_interval_secs() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}

fn default_timeout_secs() -> u64 {
    HEARTBEAT_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file, expanding `${VAR_NAME}` placeholders.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)
            .with_context(|| format!("Failed to expand config file: {}", path.display()))?;

        Self::from_toml_str(&expanded)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: AgentConfig =
            toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let url = self.registry_url.trim();
        if url.is_empty() {
            anyhow::bail!("registry_url cannot be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("registry_url must start with http:// or https://");
        }

        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be > 0 (tokio interval cannot be zero)");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be > 0");
        }

        self.node
            .validate()
            .context("Node payload would be rejected by the registry")?;

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    /// Full heartbeat endpoint URL.
    pub fn heartbeat_url(&self) -> String {
        format!(
            "{}{}",
            self.registry_url.trim().trim_end_matches('/'),
            HEARTBEAT_PATH
        )
    }

    /// Heartbeat interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// HTTP timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
