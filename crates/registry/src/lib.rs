//! Node liveness registry for the proxy fleet.
//!
//! This crate provides:
//! - The node record store (SQLite, latest-wins upserts keyed by `ip:port`)
//! - Heartbeat ingestion with validation before any write
//! - A cancellable staleness sweeper that flips aged-out records offline
//! - Liveness-filtered queries (all nodes, by country, random pick)
//!
//! # Architecture
//!
//! ```text
//!  agent ──POST──▶ ┌──────────┐          ┌──────────────┐
//!                  │ Ingestor │──upsert─▶│              │
//!                  └──────────┘          │   Storage    │ ← SQLite
//!                  ┌──────────┐          │ (pool, clock,│
//!                  │ Sweeper  │──mark───▶│   window)    │
//!                  │ (task)   │  offline │              │
//!                  └──────────┘          └──────┬───────┘
//!                                               │ list_live
//!  client ◀──GET── ┌─────────────┐              │
//!                  │ QueryEngine │◀─────────────┘
//!                  └─────────────┘
//! ```
//!
//! A single [`Storage`] value is built once and cloned into each component. It carries
//! the clock and freshness window, so tests can run isolated registries side by side.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod storage;
pub mod sweeper;

pub use config::Config;
pub use error::{RegistryError, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use query::QueryEngine;
pub use storage::{NodeStats, Storage};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
