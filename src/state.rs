//! Persisted ETL state: the place cache and the batch-hash ledger
//!
//! Both are small JSON objects, read in full when a run starts and rewritten
//! in full at their checkpoints. There is no locking and no atomic replace;
//! a single writer is assumed.

use crate::config::StateConfig;
use crate::error::EtlError;
use crate::models::{ResolvedPlace, normalize_query};
use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Normalized query -> resolved place
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PlaceCache(BTreeMap<String, ResolvedPlace>);

impl PlaceCache {
    /// Cached entry for a raw (not yet normalized) query
    #[must_use]
    pub fn get(&self, query: &str) -> Option<&ResolvedPlace> {
        self.0.get(&normalize_query(query))
    }

    /// Cached entry with a usable id, if any
    #[must_use]
    pub fn resolved(&self, query: &str) -> Option<&ResolvedPlace> {
        self.get(query).filter(|place| place.is_resolved())
    }

    pub fn insert(&mut self, place: ResolvedPlace) {
        self.0.insert(normalize_query(&place.query), place);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedPlace)> {
        self.0.iter()
    }
}

/// Batch key -> digest of the last processed response for that batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BatchLedger(BTreeMap<String, String>);

impl BatchLedger {
    #[must_use]
    pub fn digest_for(&self, batch_key: &str) -> Option<&str> {
        self.0.get(batch_key).map(String::as_str)
    }

    /// Record (or overwrite) the digest for a batch
    pub fn record(&mut self, batch_key: impl Into<String>, digest: impl Into<String>) {
        self.0.insert(batch_key.into(), digest.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// File-backed storage for [`PlaceCache`] and [`BatchLedger`]
#[derive(Debug, Clone)]
pub struct StateStore {
    places_path: PathBuf,
    ledger_path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(config: &StateConfig) -> Self {
        Self {
            places_path: config.places_path.clone(),
            ledger_path: config.ledger_path.clone(),
        }
    }

    #[must_use]
    pub fn places_path(&self) -> &Path {
        &self.places_path
    }

    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Load the place cache; a missing file is an empty cache
    pub fn load_places(&self) -> Result<PlaceCache> {
        load_json(&self.places_path)
    }

    pub fn save_places(&self, cache: &PlaceCache) -> Result<()> {
        save_json(&self.places_path, cache)
    }

    /// Load the ledger; a missing file is an empty ledger
    pub fn load_ledger(&self) -> Result<BatchLedger> {
        load_json(&self.ledger_path)
    }

    pub fn save_ledger(&self, ledger: &BatchLedger) -> Result<()> {
        save_json(&self.ledger_path, ledger)
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!("State file {} not found, starting empty", path.display());
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| EtlError::state(path, "read", e))?;
    serde_json::from_str(&raw).map_err(|e| EtlError::state(path, "parsed", e))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body =
        serde_json::to_string_pretty(value).map_err(|e| EtlError::state(path, "encoded", e))?;
    std::fs::write(path, body).map_err(|e| EtlError::state(path, "written", e))?;
    debug!("Saved state file {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(&StateConfig {
            ledger_path: dir.path().join("etl_state.json"),
            places_path: dir.path().join("places.json"),
        })
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.load_places().unwrap().is_empty());
        assert!(store.load_ledger().unwrap().is_empty());
    }

    #[test]
    fn test_ledger_persists_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut ledger = BatchLedger::default();
        ledger.record("1,2", "aaa");
        ledger.record("1,2", "bbb");
        store.save_ledger(&ledger).unwrap();

        let reloaded = store.load_ledger().unwrap();
        assert_eq!(reloaded.digest_for("1,2"), Some("bbb"));
        assert_eq!(reloaded.len(), 1);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.ledger_path()).unwrap()).unwrap();
        assert_eq!(on_disk["1,2"], "bbb");
    }

    #[test]
    fn test_place_cache_keyed_by_normalized_query() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut cache = PlaceCache::default();
        cache.insert(ResolvedPlace {
            id: Some("36057".into()),
            ..ResolvedPlace::unresolved(" Vigo ")
        });
        cache.insert(ResolvedPlace::unresolved("Nowhere"));
        store.save_places(&cache).unwrap();

        let reloaded = store.load_places().unwrap();
        assert_eq!(reloaded.resolved("VIGO").and_then(|p| p.id.as_deref()), Some("36057"));
        assert!(reloaded.get("nowhere").is_some());
        assert!(reloaded.resolved("nowhere").is_none());
    }

    #[test]
    fn test_corrupt_file_is_a_state_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.ledger_path(), "{not json").unwrap();

        let err = store.load_ledger().unwrap_err();
        assert!(matches!(err, EtlError::State { .. }));
    }
}
