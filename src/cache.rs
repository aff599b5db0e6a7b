//! File-backed memoizing cache for the dashboard data units.
//!
//! Each logical unit is a JSON file under the configured data directory.
//! Values are parsed once, held behind `Arc`s, and replaced wholesale on
//! refresh; a reader always sees either the old or the new value for a key,
//! never a mix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::DataError;
use crate::model::{CacheStats, Threat, UnitData, UnitStatus, Vendor};

/// Logical unit identifiers.
pub mod units {
    pub const THREATS: &str = "threats";
    pub const VENDORS: &str = "vendors";
    pub const DASHBOARD: &str = "dashboard";
    pub const ANALYTICS: &str = "analytics";
}

/// Units loaded eagerly by `initialize` and re-warmed after a refresh.
pub const CORE_UNITS: &[&str] = &[
    units::THREATS,
    units::VENDORS,
    units::DASHBOARD,
    units::ANALYTICS,
];

struct Entry {
    data: Arc<UnitData>,
    approx_bytes: usize,
}

/// Memoizing cache over the JSON data directory.
pub struct DataCache {
    data_dir: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
    // Bumped by refresh, under the entries write lock. A fetch that started
    // before a refresh must not memoize its pre-refresh result.
    generation: AtomicU64,
    // Per-key guards so concurrent first-access callers coalesce into a
    // single fetch. Never held across entry-map access by other keys.
    loads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DataCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Eagerly load the core unit set, propagating the first failure.
    pub async fn initialize(&self) -> Result<(), DataError> {
        for unit in CORE_UNITS {
            self.load(unit).await?;
        }
        info!(units = CORE_UNITS.len(), "cache initialized");
        Ok(())
    }

    /// Load a unit, memoized. Hits return the stored value without touching
    /// the filesystem; misses fetch at most once per key even under
    /// concurrent first access. Failed loads record nothing, so a later
    /// retry re-fetches.
    pub async fn load(&self, unit: &str) -> Result<Arc<UnitData>, DataError> {
        if let Some(entry) = self.entries.read().await.get(unit) {
            return Ok(entry.data.clone());
        }

        let guard = {
            let mut loads = self.loads.lock().await;
            loads.entry(unit.to_string()).or_default().clone()
        };
        let _held = guard.lock().await;

        // Another caller may have completed the load while we waited.
        if let Some(entry) = self.entries.read().await.get(unit) {
            return Ok(entry.data.clone());
        }

        let generation = self.generation.load(Ordering::Acquire);
        self.fetch_and_store(unit, generation).await
    }

    async fn fetch_and_store(
        &self,
        unit: &str,
        generation: u64,
    ) -> Result<Arc<UnitData>, DataError> {
        let (data, approx_bytes) = self.fetch(unit).await?;
        let data = Arc::new(data);
        let mut entries = self.entries.write().await;
        // A refresh that raced the fetch invalidated this generation: serve
        // the value to this caller but leave the key cold, so the next load
        // re-fetches.
        if self.generation.load(Ordering::Acquire) == generation {
            entries.insert(
                unit.to_string(),
                Entry {
                    data: data.clone(),
                    approx_bytes,
                },
            );
            debug!(unit, bytes = approx_bytes, "loaded data unit");
        } else {
            debug!(unit, "discarding fetch that raced a refresh");
        }
        Ok(data)
    }

    /// Drop all stored entries. The swap is atomic per key: a concurrent
    /// reader sees the old value or a fresh fetch, never a partial one.
    pub async fn refresh(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = entries.len();
        *entries = HashMap::new();
        info!(dropped, "cache refreshed");
    }

    /// Readiness report for every known unit. Never triggers a load.
    pub async fn describe_units(&self) -> Vec<UnitStatus> {
        // Snapshot the loaded flags first; the entry map must not stay
        // locked across the filesystem stats.
        let loaded: Vec<bool> = {
            let entries = self.entries.read().await;
            CORE_UNITS
                .iter()
                .map(|unit| entries.contains_key(*unit))
                .collect()
        };
        let mut out = Vec::with_capacity(CORE_UNITS.len());
        for (unit, loaded) in CORE_UNITS.iter().zip(loaded) {
            let meta = tokio::fs::metadata(self.unit_path(unit)).await.ok();
            out.push(UnitStatus {
                unit: unit.to_string(),
                size_bytes: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: meta
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
                loaded,
            });
        }
        out
    }

    /// Current entry count, known-unit count, and approximate memory use.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            known_units: CORE_UNITS.len(),
            approx_bytes: entries.values().map(|e| e.approx_bytes).sum(),
        }
    }

    fn unit_path(&self, unit: &str) -> PathBuf {
        self.data_dir.join(format!("{unit}.json"))
    }

    async fn fetch(&self, unit: &str) -> Result<(UnitData, usize), DataError> {
        let path = self.unit_path(unit);
        let raw = read_unit_file(&path, unit).await?;
        let parse = |e: serde_json::Error| DataError::Parse {
            unit: unit.to_string(),
            source: e,
        };
        let data = match unit {
            units::THREATS => {
                UnitData::Threats(serde_json::from_slice::<Vec<Threat>>(&raw).map_err(parse)?)
            }
            units::VENDORS => {
                UnitData::Vendors(serde_json::from_slice::<Vec<Vendor>>(&raw).map_err(parse)?)
            }
            _ => UnitData::Document(serde_json::from_slice(&raw).map_err(parse)?),
        };
        Ok((data, raw.len()))
    }
}

async fn read_unit_file(path: &Path, unit: &str) -> Result<Vec<u8>, DataError> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DataError::UnitNotFound {
            unit: unit.to_string(),
        }),
        Err(e) => Err(DataError::Io {
            unit: unit.to_string(),
            source: e,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fixtures::data_dir;

    #[tokio::test]
    async fn load_is_memoized() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);

        let first = cache.load(units::THREATS).await.unwrap();
        // Remove the backing file: a second load must still succeed from
        // memory and return the identical value.
        std::fs::remove_file(dir.join("threats.json")).unwrap();
        let second = cache.load(units::THREATS).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn refresh_forces_refetch() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);
        cache.load(units::DASHBOARD).await.unwrap();

        std::fs::write(dir.join("dashboard.json"), r#"{"active_threats": 99}"#).unwrap();
        cache.refresh().await;

        let reloaded = cache.load(units::DASHBOARD).await.unwrap();
        match reloaded.as_ref() {
            UnitData::Document(doc) => assert_eq!(doc["active_threats"], 99),
            other => panic!("unexpected unit data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_unit_is_not_found_and_retryable() {
        let dir = data_dir();
        std::fs::remove_file(dir.join("vendors.json")).unwrap();
        let cache = DataCache::new(&dir);

        let err = cache.load(units::VENDORS).await.unwrap_err();
        assert!(matches!(err, DataError::UnitNotFound { ref unit } if unit == "vendors"));

        // No entry was recorded: restoring the file makes the next load work.
        std::fs::write(dir.join("vendors.json"), fixtures::VENDORS_JSON).unwrap();
        let data = cache.load(units::VENDORS).await.unwrap();
        assert!(matches!(data.as_ref(), UnitData::Vendors(v) if v.len() == 2));
    }

    #[tokio::test]
    async fn malformed_unit_is_parse_error() {
        let dir = data_dir();
        std::fs::write(dir.join("threats.json"), "{not json").unwrap();
        let cache = DataCache::new(&dir);

        let err = cache.load(units::THREATS).await.unwrap_err();
        assert!(matches!(err, DataError::Parse { ref unit, .. } if unit == "threats"));
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn initialize_fails_fast_on_missing_core_unit() {
        let dir = data_dir();
        std::fs::remove_file(dir.join("analytics.json")).unwrap();
        let cache = DataCache::new(&dir);

        let err = cache.initialize().await.unwrap_err();
        assert!(matches!(err, DataError::UnitNotFound { ref unit } if unit == "analytics"));
    }

    #[tokio::test]
    async fn concurrent_first_access_coalesces() {
        let dir = data_dir();
        let cache = Arc::new(DataCache::new(&dir));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load(units::THREATS).await.unwrap() }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load(units::THREATS).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // Both callers observe the same stored value, and exactly one entry
        // exists for the key.
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn fetch_racing_a_refresh_is_not_memoized() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);

        // A load that read its file before the refresh carries the stale
        // generation into the store step.
        let stale_generation = cache.generation.load(Ordering::Acquire);
        cache.refresh().await;
        let data = cache
            .fetch_and_store(units::THREATS, stale_generation)
            .await
            .unwrap();

        // The racing caller still gets a coherent value, but the key stays
        // cold so the next load re-fetches.
        assert!(matches!(data.as_ref(), UnitData::Threats(t) if t.len() == 3));
        assert_eq!(cache.stats().await.entries, 0);

        std::fs::write(dir.join("threats.json"), "[]").unwrap();
        let reloaded = cache.load(units::THREATS).await.unwrap();
        assert!(matches!(reloaded.as_ref(), UnitData::Threats(t) if t.is_empty()));
        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn describe_units_handles_missing_backing_files() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);
        cache.initialize().await.unwrap();

        std::fs::remove_file(dir.join("vendors.json")).unwrap();
        let statuses = cache.describe_units().await;

        let vendors = statuses.iter().find(|s| s.unit == "vendors").unwrap();
        assert_eq!(vendors.size_bytes, 0);
        assert!(vendors.modified.is_none());
        // Still loaded: describing reports the cache, not the filesystem.
        assert!(vendors.loaded);
    }

    #[tokio::test]
    async fn describe_units_reports_loaded_flags_without_loading() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);
        cache.load(units::THREATS).await.unwrap();

        let statuses = cache.describe_units().await;
        assert_eq!(statuses.len(), CORE_UNITS.len());
        for status in &statuses {
            assert_eq!(status.loaded, status.unit == "threats");
            assert!(status.size_bytes > 0);
        }
        // Describing must not have populated anything new.
        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn stats_counts_entries_and_bytes() {
        let dir = data_dir();
        let cache = DataCache::new(&dir);
        cache.initialize().await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.known_units, 4);
        assert!(stats.approx_bytes > 0);
    }
}
