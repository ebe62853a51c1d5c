//! Liveness-filtered fleet views.

use fleet_core::types::NodeRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{RegistryError, Result};
use crate::storage::Storage;

/// Read-only query engine over the registry store.
///
/// Every view goes through the store's live listings, so a record whose heartbeat fell
/// out of the freshness window is never returned even if the sweeper has not run yet.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    storage: Storage,
    rng: Arc<Mutex<StdRng>>,
}

impl QueryEngine {
    /// Create a query engine with an OS-seeded random source.
    pub fn new(storage: Storage) -> Self {
        Self::with_rng(storage, StdRng::from_os_rng())
    }

    /// Create a query engine with an explicit random source.
    pub fn with_rng(storage: Storage, rng: StdRng) -> Self {
        Self {
            storage,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// All live nodes, most recently seen first. Empty when nothing is live.
    pub async fn get_all(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.storage.list_live().await?)
    }

    /// Live nodes in `country` (exact match).
    pub async fn get_by_country(&self, country: &str) -> Result<Vec<NodeRecord>> {
        if country.trim().is_empty() {
            return Err(RegistryError::MissingCountry);
        }

        Ok(self.storage.list_live_by_country(country).await?)
    }

    /// One node picked uniformly from the live set at call time.
    pub async fn get_random(&self) -> Result<NodeRecord> {
        let mut live = self.storage.list_live().await?;
        if live.is_empty() {
            return Err(RegistryError::NotFound);
        }

        let index = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..live.len());

        Ok(live.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fleet_core::{Heartbeat, ManualClock};
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    async fn setup() -> (Storage, ManualClock, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        storage.run_migrations().await.unwrap();
        (storage, clock, temp_db)
    }

    async fn heartbeat(storage: &Storage, ip: &str, country: &str) {
        let node = Heartbeat {
            ip: ip.to_string(),
            port: 1080,
            username: "u".to_string(),
            password: "p".to_string(),
            country: country.to_string(),
            region: String::new(),
            city: String::new(),
        }
        .validate()
        .unwrap();
        storage.upsert_node(&node).await.unwrap();
    }

    async fn seed_fleet(storage: &Storage, clock: &ManualClock) {
        for (i, country) in ["US", "DE", "US", "FR", "US", "DE"].iter().enumerate() {
            heartbeat(storage, &format!("10.0.0.{}", i + 1), country).await;
            clock.advance(Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_get_all_empty_is_not_an_error() {
        let (storage, _clock, _temp_db) = setup().await;
        let engine = QueryEngine::new(storage.clone());

        assert!(engine.get_all().await.unwrap().is_empty());
        storage.close().await;
    }

    #[tokio::test]
    async fn test_get_by_country_requires_country() {
        let (storage, _clock, _temp_db) = setup().await;
        let engine = QueryEngine::new(storage.clone());

        for blank in ["", "   "] {
            let err = engine.get_by_country(blank).await.unwrap_err();
            assert!(matches!(err, RegistryError::MissingCountry));
        }
        storage.close().await;
    }

    #[tokio::test]
    async fn test_country_filter_is_subset_of_all() {
        let (storage, clock, _temp_db) = setup().await;
        seed_fleet(&storage, &clock).await;
        let engine = QueryEngine::new(storage.clone());

        let all: HashSet<String> = engine
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.identity.to_string())
            .collect();
        assert_eq!(all.len(), 6);

        for country in ["US", "DE", "FR", "JP", "us"] {
            let subset = engine.get_by_country(country).await.unwrap();
            for node in &subset {
                assert_eq!(node.country, country);
                assert!(all.contains(node.identity.as_str()));
            }
        }
        assert_eq!(engine.get_by_country("US").await.unwrap().len(), 3);
        assert!(engine.get_by_country("us").await.unwrap().is_empty());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_get_random_empty_is_not_found() {
        let (storage, _clock, _temp_db) = setup().await;
        let engine = QueryEngine::new(storage.clone());

        let err = engine.get_random().await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound));
        storage.close().await;
    }

    #[tokio::test]
    async fn test_get_random_is_deterministic_with_seed() {
        let (storage, clock, _temp_db) = setup().await;
        seed_fleet(&storage, &clock).await;

        let a = QueryEngine::with_rng(storage.clone(), StdRng::seed_from_u64(42));
        let b = QueryEngine::with_rng(storage.clone(), StdRng::seed_from_u64(42));

        for _ in 0..10 {
            let pick_a = a.get_random().await.unwrap();
            let pick_b = b.get_random().await.unwrap();
            assert_eq!(pick_a.identity, pick_b.identity);
        }
        storage.close().await;
    }

    #[tokio::test]
    async fn test_get_random_covers_live_set() {
        let (storage, clock, _temp_db) = setup().await;
        seed_fleet(&storage, &clock).await;
        let engine = QueryEngine::with_rng(storage.clone(), StdRng::seed_from_u64(7));

        let all: HashSet<String> = engine
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.identity.to_string())
            .collect();

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let pick = engine.get_random().await.unwrap();
            assert!(all.contains(pick.identity.as_str()));
            seen.insert(pick.identity.to_string());
        }
        assert_eq!(seen, all);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_stale_node_never_returned_before_sweep() {
        let (storage, clock, _temp_db) = setup().await;
        heartbeat(&storage, "1.2.3.4", "US").await;
        clock.advance(Duration::from_secs(301));
        heartbeat(&storage, "5.6.7.8", "US").await;

        let engine = QueryEngine::with_rng(storage.clone(), StdRng::seed_from_u64(1));

        let all = engine.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identity.as_str(), "5.6.7.8:1080");

        let us = engine.get_by_country("US").await.unwrap();
        assert_eq!(us.len(), 1);

        for _ in 0..20 {
            let pick = engine.get_random().await.unwrap();
            assert_eq!(pick.identity.as_str(), "5.6.7.8:1080");
        }

        // The stale record still carries the online flag until a sweep runs.
        assert_eq!(storage.stats().await.unwrap().online_flagged, 2);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_error() {
        let (storage, _clock, _temp_db) = setup().await;
        let engine = QueryEngine::new(storage.clone());
        storage.close().await;

        let err = engine.get_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::Store(_)));
        assert!(!err.is_client_error());
    }
}
