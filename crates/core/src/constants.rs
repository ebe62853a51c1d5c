//! Canonical constants for the fleet registry.

use std::time::Duration;

/// Seconds after the last heartbeat during which a node is still considered live.
pub const FRESHNESS_WINDOW_SECS: u64 = 5 * 60;

/// Seconds between two staleness sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Seconds between two heartbeats sent by a node agent.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Timeout applied to every outbound heartbeat request.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 10;

/// Default listen port of the registry HTTP server.
pub const DEFAULT_API_PORT: u16 = 3100;

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://fleet.db";

/// Path of the heartbeat endpoint.
pub const HEARTBEAT_PATH: &str = "/api/heartbeat";

/// Freshness window as a [`Duration`].
pub const fn freshness_window() -> Duration {
    Duration::from_secs(FRESHNESS_WINDOW_SECS)
}

/// Sweep interval as a [`Duration`].
pub const fn sweep_interval() -> Duration {
    Duration::from_secs(SWEEP_INTERVAL_SECS)
}
