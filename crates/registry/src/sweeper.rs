//! Staleness sweeper for the registry.
//!
//! This module provides a service that periodically flips records whose heartbeat aged
//! out of the freshness window to offline, so that a raw read of the `online` flag
//! reflects reality. Queries never depend on it: they apply the window themselves.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::storage::Storage;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records transitioned online → offline.
    pub marked_offline: u64,
    /// Offline records deleted by the retention policy.
    pub purged: u64,
}

/// Periodic sweeper that reconciles the online flag at a configured interval.
///
/// Each tick runs one set-based `mark_stale_offline`. A failed tick is logged and the
/// next tick retries; the sweeper never stops on its own.
#[derive(Debug, Clone)]
pub struct Sweeper {
    storage: Storage,
    interval: Duration,
    retention: Option<Duration>,
}

impl Sweeper {
    /// Create a new sweeper.
    ///
    /// # Arguments
    ///
    /// * `storage` - Registry store to sweep
    /// * `interval` - Time between sweeps (must be > 0)
    pub fn new(storage: Storage, interval: Duration) -> Self {
        Self {
            storage,
            interval,
            retention: None,
        }
    }

    /// Also delete offline records whose last heartbeat is older than `retention`.
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Run one sweep pass.
    pub async fn tick(&self) -> Result<SweepReport> {
        let marked_offline = self
            .storage
            .mark_stale_offline()
            .await
            .context("Sweep failed")?;

        let purged = match self.retention {
            Some(retention) => self
                .storage
                .purge_offline_before(retention)
                .await
                .context("Retention purge failed")?,
            None => 0,
        };

        Ok(SweepReport {
            marked_offline,
            purged,
        })
    }

    /// Run the sweep loop until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Staleness sweeper starting with interval: {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => self.tick_logged().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Staleness sweeper stopped");
    }

    /// Spawn the sweep loop as a background task.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(rx).await });
        SweeperHandle { shutdown, task }
    }

    async fn tick_logged(&self) {
        match self.tick().await {
            Ok(report) if report.marked_offline > 0 || report.purged > 0 => {
                info!(
                    "Sweep complete: {} node(s) marked offline, {} purged",
                    report.marked_offline, report.purged
                );
            }
            Ok(_) => debug!("Sweep complete: no stale nodes"),
            Err(e) => warn!("{:#}", e),
        }
    }
}

/// Handle to a spawned sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The receiver only disappears once the task has already exited.
        let _ = self.shutdown.send(true);
        self.task.await.context("Sweeper task panicked")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fleet_core::{Heartbeat, ManualClock, NodeId};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    async fn setup_storage() -> (Storage, ManualClock, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        storage.run_migrations().await.unwrap();
        (storage, clock, temp_db)
    }

    async fn heartbeat(storage: &Storage, ip: &str) {
        let node = Heartbeat {
            ip: ip.to_string(),
            port: 1080,
            username: "u".to_string(),
            password: "p".to_string(),
            country: "US".to_string(),
            region: String::new(),
            city: String::new(),
        }
        .validate()
        .unwrap();
        storage.upsert_node(&node).await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_marks_stale_nodes() {
        let (storage, clock, _temp_db) = setup_storage().await;
        heartbeat(&storage, "10.0.0.1").await;
        clock.advance(Duration::from_secs(301));
        heartbeat(&storage, "10.0.0.2").await;

        let sweeper = Sweeper::new(storage.clone(), Duration::from_secs(60));
        let report = sweeper.tick().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                marked_offline: 1,
                purged: 0
            }
        );

        let stale = storage
            .get_node(&NodeId::from_addr("10.0.0.1", 1080))
            .await
            .unwrap()
            .unwrap();
        assert!(!stale.online);

        // Nothing left to do.
        assert_eq!(sweeper.tick().await.unwrap(), SweepReport::default());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_tick_with_retention_purges_old_offline_records() {
        let (storage, clock, _temp_db) = setup_storage().await;
        heartbeat(&storage, "10.0.0.1").await;
        clock.advance(Duration::from_secs(7200));

        let sweeper = Sweeper::new(storage.clone(), Duration::from_secs(60))
            .with_retention(Some(Duration::from_secs(3600)));
        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.marked_offline, 1);
        assert_eq!(report.purged, 1);
        assert_eq!(storage.stats().await.unwrap().total, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_tick_reports_store_failure() {
        let (storage, _clock, _temp_db) = setup_storage().await;
        let sweeper = Sweeper::new(storage.clone(), Duration::from_secs(60));

        storage.close().await;
        assert!(sweeper.tick().await.is_err());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_and_shuts_down() {
        let (storage, clock, _temp_db) = setup_storage().await;
        heartbeat(&storage, "10.0.0.1").await;
        clock.advance(Duration::from_secs(301));

        let handle = Sweeper::new(storage.clone(), Duration::from_millis(20)).spawn();

        let mut swept = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if storage.stats().await.unwrap().online_flagged == 0 {
                swept = true;
                break;
            }
        }
        assert!(swept, "sweeper never marked the stale node offline");

        handle.shutdown().await.unwrap();
        storage.close().await;
    }

    #[tokio::test]
    async fn test_sweeper_survives_failed_ticks_and_stops_on_signal() {
        let (storage, _clock, _temp_db) = setup_storage().await;
        let sweeper = Sweeper::new(storage.clone(), Duration::from_millis(5));
        storage.close().await;

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { sweeper.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
