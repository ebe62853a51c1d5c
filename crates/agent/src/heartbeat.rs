//! The periodic heartbeat loop.
//!
//! Sends one heartbeat immediately, then one per interval. Failures are logged and the
//! next tick is the retry: there is no backoff and the loop never exits on error.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::provider::MetadataProvider;
use crate::sender::HeartbeatSender;

/// Counters for one run of the heartbeat loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Heartbeats accepted by the registry.
    pub sent: u64,
    /// Ticks that failed (metadata or delivery).
    pub failed: u64,
}

/// Run the heartbeat loop until `shutdown` flips to `true` or its sender is dropped.
pub async fn run_heartbeat_loop(
    provider: &dyn MetadataProvider,
    sender: &HeartbeatSender,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> LoopStats {
    info!(
        "Heartbeat loop starting: {} every {:?}",
        sender.url(),
        interval
    );

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = LoopStats::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                match send_once(provider, sender).await {
                    Ok(()) => {
                        stats.sent += 1;
                        info!("Heartbeat sent successfully");
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!("Heartbeat failed: {:#}", e);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(
        "Heartbeat loop stopped ({} sent, {} failed)",
        stats.sent, stats.failed
    );
    stats
}

async fn send_once(
    provider: &dyn MetadataProvider,
    sender: &HeartbeatSender,
) -> anyhow::Result<()> {
    let heartbeat = provider.gather().await?;
    sender.send(&heartbeat).await
}
