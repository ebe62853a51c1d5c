//! Heartbeat ingestion.
//!
//! Validates an inbound heartbeat, derives the node identity and hands the result to the
//! store. Nothing is written unless the payload is valid.

use fleet_core::types::{Heartbeat, NodeId};
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::Storage;

/// Result of one accepted heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Identity the heartbeat was recorded under.
    pub node_id: NodeId,
    /// `false` when the store kept a newer `last_seen` for this identity.
    pub applied: bool,
}

/// Heartbeat ingestion front-end over the registry store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    storage: Storage,
}

impl Ingestor {
    /// Create an ingestor writing to `storage`.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Parse a raw JSON body and ingest it.
    pub async fn ingest_json(&self, body: &[u8]) -> Result<IngestOutcome> {
        let heartbeat: Heartbeat = serde_json::from_slice(body)?;
        self.ingest(&heartbeat).await
    }

    /// Validate and record a heartbeat.
    ///
    /// Replaying the same heartbeat converges to the same stored row; only
    /// `last_seen`/`updated_at` advance.
    pub async fn ingest(&self, heartbeat: &Heartbeat) -> Result<IngestOutcome> {
        let node = heartbeat.validate()?;

        let applied = self.storage.upsert_node(&node).await?;
        if applied {
            info!(
                "Received heartbeat: {} ({}, {})",
                node.id, node.city, node.country
            );
        } else {
            warn!(
                "Ignored heartbeat for {}: stored last_seen is newer",
                node.id
            );
        }

        Ok(IngestOutcome {
            node_id: node.id,
            applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use chrono::{TimeZone, Utc};
    use fleet_core::{Clock, CoreError, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    async fn setup() -> (Ingestor, Storage, ManualClock, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        storage.run_migrations().await.unwrap();
        (Ingestor::new(storage.clone()), storage, clock, temp_db)
    }

    const PAYLOAD: &str = r#"{"ip":"1.2.3.4","port":1080,"username":"u_ab12","password":"p","country":"US","region":"CA","city":"SF"}"#;

    #[tokio::test]
    async fn test_ingest_records_live_node() {
        let (ingestor, storage, _clock, _temp_db) = setup().await;

        let outcome = ingestor.ingest_json(PAYLOAD.as_bytes()).await.unwrap();
        assert_eq!(outcome.node_id.as_str(), "1.2.3.4:1080");
        assert!(outcome.applied);

        let live = storage.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].identity.as_str(), "1.2.3.4:1080");
        assert!(live[0].online);
        assert_eq!(live[0].username, "u_ab12");

        storage.close().await;
    }

    #[tokio::test]
    async fn test_repeat_heartbeat_advances_last_seen_without_duplicates() {
        let (ingestor, storage, clock, _temp_db) = setup().await;

        ingestor.ingest_json(PAYLOAD.as_bytes()).await.unwrap();
        let first = storage.list_live().await.unwrap()[0].last_seen;

        clock.advance(Duration::from_secs(61));
        ingestor.ingest_json(PAYLOAD.as_bytes()).await.unwrap();

        let live = storage.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].last_seen, first + chrono::Duration::seconds(61));
        assert_eq!(live[0].created_at, first);
        assert_eq!(storage.stats().await.unwrap().total, 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected_without_side_effects() {
        let (ingestor, storage, _clock, _temp_db) = setup().await;

        for body in [
            "not json",
            r#"{"ip":"1.2.3.4","port":1080}"#,
            r#"{"ip":"1.2.3.4","port":"1080","username":"u","password":"p"}"#,
        ] {
            let err = ingestor.ingest_json(body.as_bytes()).await.unwrap_err();
            assert!(matches!(err, RegistryError::MalformedPayload(_)), "{}", body);
        }

        assert_eq!(storage.stats().await.unwrap().total, 0);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_invalid_heartbeat_is_rejected_without_side_effects() {
        let (ingestor, storage, _clock, _temp_db) = setup().await;

        let err = ingestor
            .ingest_json(br#"{"ip":"","port":1080,"username":"u","password":"p"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(CoreError::EmptyIp)));

        let err = ingestor
            .ingest_json(br#"{"ip":"1.2.3.4","port":0,"username":"u","password":"p"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Validation(CoreError::InvalidPort(0))
        ));

        assert_eq!(storage.stats().await.unwrap().total, 0);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_ingest_revives_offline_node() {
        let (ingestor, storage, clock, _temp_db) = setup().await;

        ingestor.ingest_json(PAYLOAD.as_bytes()).await.unwrap();
        clock.advance(Duration::from_secs(301));
        assert_eq!(storage.mark_stale_offline().await.unwrap(), 1);

        ingestor.ingest_json(PAYLOAD.as_bytes()).await.unwrap();
        let node = storage
            .get_node(&NodeId::from_addr("1.2.3.4", 1080))
            .await
            .unwrap()
            .unwrap();
        assert!(node.online);
        assert_eq!(node.last_seen, clock.now());

        storage.close().await;
    }
}
