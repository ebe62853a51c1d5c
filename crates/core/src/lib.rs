//! # Fleet Core
//!
//! Core types, constants and time sources for the fleet liveness registry.
//!
//! This crate provides the building blocks shared by the registry, the HTTP API and the
//! node agent, so that every component agrees on how a node is identified and how a
//! heartbeat is validated.
//!
//! ## Features
//!
//! - **Domain Types**: `NodeId`, `Heartbeat`, `NodeInfo`, `NodeRecord`
//! - **Constants**: Freshness window, sweep and heartbeat cadences, HTTP timeouts
//! - **Clocks**: `Clock` trait with a wall clock and a manually driven clock for tests
//! - **Config helpers**: `${VAR}` expansion shared by the registry and agent config loaders

#![warn(missing_docs)]

pub mod clock;
pub mod constants;
pub mod env;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use env::{expand_env_vars, EnvExpandError};
pub use error::{CoreError, Result};
pub use types::*;
