//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Heartbeat carried an empty or blank IP.
    #[error("Invalid heartbeat: ip must not be empty")]
    EmptyIp,

    /// Heartbeat carried a port outside the TCP range.
    #[error("Invalid heartbeat: port {0} (must be between 1 and 65535)")]
    InvalidPort(i64),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
