//! Axum-based HTTP API for the fleet liveness registry.
//!
//! This crate provides:
//! - `POST /api/heartbeat` - Record a node heartbeat
//! - `GET /api/nodes` - List live nodes
//! - `GET /api/nodes/country?country=CC` - List live nodes in a country
//! - `GET /api/nodes/random` - Pick one live node
//! - `GET /health` - Liveness probe

#![warn(missing_docs)]

/// API server runtime and in-process app builder.
pub mod server;
