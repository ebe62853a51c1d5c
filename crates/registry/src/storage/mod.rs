//! Node record store.
//!
//! This module provides database operations for:
//! - Heartbeat upserts (latest-wins per node identity)
//! - Liveness-filtered listings (all nodes, by country)
//! - The bulk online → offline transition used by the sweeper
//!
//! [`Storage`] is the registry instance: it owns the connection pool, the clock every
//! freshness comparison reads and the freshness window. Components receive a clone of
//! it; it is the only path through which node records are mutated.

use anyhow::{Context, Result};
use fleet_core::{Clock, SystemClock};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod node;
pub mod types;

pub use types::*;

/// Database storage for the registry.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist. Call
    /// [`Storage::run_migrations`] before first use.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://fleet.db")
    /// * `max_connections` - Pool ceiling (defaults to 5)
    /// * `min_connections` - Pool floor (defaults to 1)
    ///
    /// # Example
    /// ```no_run
    /// # use fleet_registry::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://fleet.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
            freshness_window: fleet_core::freshness_window(),
        })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Replace the time source used for every freshness comparison.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the freshness window (5 minutes by default).
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The clock this registry reads "now" from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The configured freshness window.
    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }

    /// Unix milliseconds at which a heartbeat stops counting as fresh, relative to `now_ms`.
    fn freshness_cutoff_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(duration_ms(self.freshness_window))
    }
}

pub(crate) fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_storage_creation() {
        let _temp_db = NamedTempFile::new().unwrap();
        let db_path = _temp_db.path();

        let storage = Storage::new_with_path(db_path, None, None).await.unwrap();
        storage.run_migrations().await.unwrap();

        storage.health_check().await.unwrap();
        assert_eq!(storage.freshness_window(), Duration::from_secs(300));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let _temp_db = NamedTempFile::new().unwrap();

        let storage = Storage::new_with_path(_temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        storage.run_migrations().await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total, 0);

        storage.close().await;
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_secs(300)), 300_000);
        assert_eq!(duration_ms(Duration::MAX), i64::MAX);
    }
}
