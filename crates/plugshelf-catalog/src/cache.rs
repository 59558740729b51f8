//! Time-bounded catalog cache with single-flight refresh
//!
//! The cache holds at most one `CatalogSnapshot`. Readers take a cheap
//! `Arc` clone under a read lock; a refresh builds a complete new snapshot
//! off to the side and swaps it in at the end. Refreshes are serialized by an
//! async mutex, and callers that queued behind a refresh re-check freshness
//! before fetching so a cold cache costs one fetch batch no matter how many
//! callers noticed it.
//!
//! A refresh in which every package failed is kept in memory for the short
//! retry window only and never written to the store.

use crate::client::CatalogSource;
use crate::normalize::{normalize, NormalizeContext};
use crate::record::PackageRecord;
use crate::store::{CatalogSnapshot, SnapshotStore};
use crate::{CatalogError, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use plugshelf_config::{CatalogConfig, PackageDescriptor, ReleaseChannel};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Identifier snapshots are stored under
    pub catalog_id: String,
    /// Snapshot lifetime (default: 7 days)
    pub ttl: Duration,
    /// Lifetime of an empty snapshot from a fully failed refresh (default: 15 minutes)
    pub retry_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            catalog_id: "plugshelf_catalog".to_string(),
            ttl: Duration::days(7),
            retry_ttl: Duration::minutes(15),
        }
    }
}

impl CacheSettings {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            catalog_id: config.catalog_id.clone(),
            ttl: Duration::days(i64::from(config.cache_ttl_days)),
            retry_ttl: Duration::minutes(i64::from(config.retry_minutes)),
        }
    }
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<CatalogSnapshot>>,
    /// The snapshot came from a refresh in which every package failed
    failed: bool,
    /// Whether the store has been consulted yet
    hydrated: bool,
}

/// Process-wide catalog cache
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    context: NormalizeContext,
    settings: CacheSettings,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl CatalogCache {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn SnapshotStore>,
        context: NormalizeContext,
        settings: CacheSettings,
    ) -> Self {
        Self {
            source,
            store,
            clock: Arc::new(SystemClock),
            context,
            settings,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Replace the clock used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Current snapshot, or `CatalogError::CacheMiss` if absent or expired
    pub fn fresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let (snapshot, ttl) = self.current().ok_or(CatalogError::CacheMiss)?;
        if snapshot.is_valid_at(self.clock.now(), ttl) {
            Ok(snapshot)
        } else {
            debug!(expired_at = %snapshot.expires_at(ttl), "Catalog snapshot expired");
            Err(CatalogError::CacheMiss)
        }
    }

    /// Current snapshot, or `None` if absent or expired
    pub fn get(&self) -> Option<Arc<CatalogSnapshot>> {
        self.fresh().ok()
    }

    /// Current snapshot if fresh, otherwise refresh (or wait for the refresh
    /// already running) and return the result
    pub async fn get_or_refresh(
        &self,
        descriptors: &[PackageDescriptor],
        channel: ReleaseChannel,
    ) -> Arc<CatalogSnapshot> {
        if let Some(snapshot) = self.get() {
            debug!("Using cached catalog snapshot");
            return snapshot;
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.get() {
            debug!("Catalog refreshed while waiting");
            return snapshot;
        }
        self.refresh_locked(descriptors, channel).await
    }

    /// Fetch every package and replace the snapshot, fresh or not
    pub async fn refresh(
        &self,
        descriptors: &[PackageDescriptor],
        channel: ReleaseChannel,
    ) -> Arc<CatalogSnapshot> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(descriptors, channel).await
    }

    /// Drop the snapshot here and in the store; the next `get()` returns `None`
    pub fn invalidate(&self) {
        {
            let mut state = self.state.write();
            state.snapshot = None;
            state.failed = false;
            state.hydrated = true;
        }
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored catalog snapshot: {}", e);
        }
        info!("Catalog cache invalidated");
    }

    /// Snapshot regardless of age with the lifetime that applies to it,
    /// hydrating from the store on first use
    fn current(&self) -> Option<(Arc<CatalogSnapshot>, Duration)> {
        {
            let state = self.state.read();
            if state.hydrated {
                return self.with_ttl(&state);
            }
        }

        // Store I/O happens outside the lock; a refresh or invalidate that
        // lands meanwhile marks the state hydrated and wins.
        let loaded = self.load_stored();

        let mut state = self.state.write();
        if !state.hydrated {
            state.hydrated = true;
            state.snapshot = loaded.map(Arc::new);
        }
        self.with_ttl(&state)
    }

    fn with_ttl(&self, state: &CacheState) -> Option<(Arc<CatalogSnapshot>, Duration)> {
        let ttl = if state.failed {
            self.settings.retry_ttl.min(self.settings.ttl)
        } else {
            self.settings.ttl
        };
        state.snapshot.clone().map(|snapshot| (snapshot, ttl))
    }

    fn load_stored(&self) -> Option<CatalogSnapshot> {
        match self.store.load() {
            Ok(Some(snapshot)) if snapshot.catalog_id == self.settings.catalog_id => {
                debug!(records = snapshot.len(), "Hydrated catalog from store");
                Some(snapshot)
            }
            Ok(Some(snapshot)) => {
                debug!(
                    stored = %snapshot.catalog_id,
                    expected = %self.settings.catalog_id,
                    "Ignoring snapshot stored for another catalog"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load catalog snapshot: {}", e);
                None
            }
        }
    }

    async fn refresh_locked(
        &self,
        descriptors: &[PackageDescriptor],
        channel: ReleaseChannel,
    ) -> Arc<CatalogSnapshot> {
        info!(packages = descriptors.len(), %channel, "Refreshing catalog");

        let results = join_all(
            descriptors
                .iter()
                .map(|descriptor| self.fetch_record(descriptor, channel)),
        )
        .await;

        let mut records = BTreeMap::new();
        let mut slugs = HashSet::new();
        for record in results.into_iter().flatten() {
            if !slugs.insert(record.slug.clone()) {
                warn!(key = %record.key, slug = %record.slug, "Duplicate slug, dropping package");
                continue;
            }
            records.insert(record.key.clone(), record);
        }

        let failed = !descriptors.is_empty() && records.is_empty();
        let snapshot = Arc::new(CatalogSnapshot::new(
            self.settings.catalog_id.clone(),
            self.clock.now(),
            records,
        ));

        if failed {
            warn!(
                packages = descriptors.len(),
                retry_at = %snapshot.expires_at(self.settings.retry_ttl.min(self.settings.ttl)),
                "Every package fetch failed, serving an empty catalog until retry"
            );
        } else {
            self.persist(Arc::clone(&snapshot)).await;
        }

        {
            let mut state = self.state.write();
            state.snapshot = Some(Arc::clone(&snapshot));
            state.failed = failed;
            state.hydrated = true;
        }

        info!(
            "Catalog refreshed: {} of {} packages available",
            snapshot.len(),
            descriptors.len()
        );
        snapshot
    }

    /// Write the snapshot to the store on the blocking pool
    async fn persist(&self, snapshot: Arc<CatalogSnapshot>) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to persist catalog snapshot: {}", e),
            Err(e) => error!("Catalog snapshot writer did not finish: {}", e),
        }
    }

    /// Fetch and normalize one package; failures are logged and dropped
    async fn fetch_record(
        &self,
        descriptor: &PackageDescriptor,
        channel: ReleaseChannel,
    ) -> Option<PackageRecord> {
        let outcome = match self.source.fetch(descriptor, channel).await {
            Ok(raw) => normalize(raw, descriptor, &self.context),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(record) => Some(record),
            Err(e) if e.is_package_scoped() => {
                warn!(key = %descriptor.key, error = %e, "Skipping package");
                None
            }
            Err(e) => {
                error!(key = %descriptor.key, error = %e, "Catalog source failed, skipping package");
                None
            }
        }
    }
}
