//! Catalog snapshots and where they are kept between processes

use crate::record::PackageRecord;
use crate::{CatalogError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One complete, immutable result of a catalog refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Identifier the snapshot was stored under
    pub catalog_id: String,
    pub fetched_at: DateTime<Utc>,
    /// Records keyed by package key
    pub records: BTreeMap<String, PackageRecord>,
}

impl CatalogSnapshot {
    pub fn new(
        catalog_id: impl Into<String>,
        fetched_at: DateTime<Utc>,
        records: BTreeMap<String, PackageRecord>,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            fetched_at,
            records,
        }
    }

    /// Check if the snapshot is still fresh at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }

    /// End of the snapshot's lifetime, saturating at the latest representable time
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.fetched_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn get(&self, key: &str) -> Option<&PackageRecord> {
        self.records.get(key)
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<&PackageRecord> {
        self.records.values().find(|r| r.slug == slug)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Durable (or not) home for the latest snapshot
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, if any
    fn load(&self) -> Result<Option<CatalogSnapshot>>;

    /// Replace the stored snapshot
    fn save(&self, snapshot: &CatalogSnapshot) -> Result<()>;

    /// Forget the stored snapshot
    fn clear(&self) -> Result<()>;
}

/// Keeps the snapshot for the lifetime of the process only
#[derive(Default)]
pub struct MemoryStore {
    snapshot: RwLock<Option<CatalogSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<CatalogSnapshot>> {
        Ok(self.snapshot.read().clone())
    }

    fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.snapshot.write() = None;
        Ok(())
    }
}

/// Persists the snapshot as JSON so it survives restarts
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SnapshotStore for FileStore {
    /// Unreadable or corrupt files count as no snapshot
    fn load(&self) -> Result<Option<CatalogSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        match std::fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str::<CatalogSnapshot>(&data) {
                Ok(snapshot) => {
                    debug!("Loaded catalog snapshot from {:?}", self.path);
                    Ok(Some(snapshot))
                }
                Err(e) => {
                    warn!("Ignoring corrupt catalog snapshot {:?}: {}", self.path, e);
                    Ok(None)
                }
            },
            Err(e) => {
                warn!("Failed to read catalog snapshot {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(snapshot)?;
        // Write next to the target and rename so readers never see half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| CatalogError::Store(format!("rename {:?}: {}", tmp, e)))?;
        debug!("Saved catalog snapshot to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot::new(
            "test_catalog",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_ttl_boundaries() {
        let snap = snapshot();
        let ttl = Duration::days(7);
        let t = snap.fetched_at;
        assert!(snap.is_valid_at(t, ttl));
        assert!(snap.is_valid_at(t + Duration::days(7) - Duration::seconds(1), ttl));
        assert!(!snap.is_valid_at(t + Duration::days(7) + Duration::seconds(1), ttl));
        assert_eq!(snap.expires_at(ttl), t + Duration::days(7));
    }

    #[test]
    fn test_expires_at_saturates_on_huge_ttl() {
        let snap = snapshot();
        let ttl = Duration::days(i64::from(u32::MAX));
        assert_eq!(snap.expires_at(ttl), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&snapshot()).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot()));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache").join("catalog.json"));
        assert!(store.load().unwrap().is_none());

        store.save(&snapshot()).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), Some(snapshot()));

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(FileStore::new(&path).load().unwrap().is_none());
    }
}
