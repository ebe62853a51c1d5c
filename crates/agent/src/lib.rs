//! Node-side heartbeat agent.
//!
//! This crate provides:
//! - [`MetadataProvider`]: the pluggable source of each heartbeat payload
//! - [`HeartbeatSender`]: JSON delivery to the registry with a bounded timeout
//! - [`run_heartbeat_loop`]: the fixed-interval loop that keeps a node live
//! - [`AgentConfig`]: TOML configuration for the `fleet-agent` binary

#![warn(missing_docs)]

pub mod config;
pub mod heartbeat;
pub mod provider;
pub mod sender;

pub use config::AgentConfig;
pub use heartbeat::{run_heartbeat_loop, LoopStats};
pub use provider::{MetadataProvider, StaticMetadataProvider};
pub use sender::HeartbeatSender;
