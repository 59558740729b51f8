//! The catalog service hosts talk to
//!
//! Every read goes through the cache: a cold or expired cache is refreshed
//! once, then listing, lookup, search and update checks all work from the
//! same snapshot until it expires.

use crate::probe::{DirectoryProbe, InstallProbe};
use crate::reconcile::{build_update_feed, classify, LocalState, ReconciliationStatus, UpdateFeed};
use crate::search::{self, SearchResults};
use plugshelf_catalog::{
    CacheSettings, CatalogCache, CatalogError, CatalogSnapshot, FileStore, NormalizeContext, PackageRecord,
    RemoteCatalogClient, Result,
};
use plugshelf_config::{Config, PackageDescriptor, ReleaseChannel};
use std::sync::Arc;
use tracing::debug;

/// Catalog façade: cache, tracked packages and the host's install probe
pub struct PluginCatalog {
    cache: Arc<CatalogCache>,
    probe: Arc<dyn InstallProbe>,
    descriptors: Vec<PackageDescriptor>,
    channel: ReleaseChannel,
    vendor_keyword: String,
}

impl PluginCatalog {
    pub fn new(
        cache: Arc<CatalogCache>,
        probe: Arc<dyn InstallProbe>,
        descriptors: Vec<PackageDescriptor>,
        channel: ReleaseChannel,
        vendor_keyword: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            probe,
            descriptors,
            channel,
            vendor_keyword: vendor_keyword.into(),
        }
    }

    /// Wire up the HTTP client, on-disk snapshot store and directory probe
    /// described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RemoteCatalogClient::new(&config.catalog)?;
        let store = FileStore::new(config.catalog.cache_file());
        let cache = CatalogCache::new(
            Arc::new(client),
            Arc::new(store),
            NormalizeContext::from_config(&config.catalog),
            CacheSettings::from_config(&config.catalog),
        );

        Ok(Self::new(
            Arc::new(cache),
            Arc::new(DirectoryProbe::from_config(&config.host)),
            config.packages.clone(),
            config.catalog.channel,
            config.catalog.vendor_keyword.clone(),
        ))
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn descriptors(&self) -> &[PackageDescriptor] {
        &self.descriptors
    }

    /// Fresh snapshot, refreshing if needed
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.cache.get_or_refresh(&self.descriptors, self.channel).await
    }

    /// Force a refresh regardless of freshness
    pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
        self.cache.refresh(&self.descriptors, self.channel).await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Every available record, in configuration order, with `active` filled in
    pub async fn list_catalog(&self) -> Vec<PackageRecord> {
        let snapshot = self.snapshot().await;
        self.ordered(&snapshot)
    }

    /// Record for a slug, or `CatalogError::NotFound`
    pub async fn record(&self, slug: &str) -> Result<PackageRecord> {
        let snapshot = self.snapshot().await;
        snapshot
            .find_by_slug(slug)
            .map(|r| self.annotate(r))
            .ok_or_else(|| CatalogError::NotFound(slug.to_string()))
    }

    /// Record for a slug; `None` for unknown slugs
    pub async fn get_record(&self, slug: &str) -> Option<PackageRecord> {
        match self.record(slug).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "No catalog record for slug");
                None
            }
        }
    }

    /// Search the catalog by tag
    pub async fn search(&self, query: &str) -> Vec<PackageRecord> {
        search::search(&self.list_catalog().await, query)
    }

    /// Merge the catalog into the host's own search results
    pub async fn search_with_external(
        &self,
        query: &str,
        external: Vec<PackageRecord>,
    ) -> SearchResults {
        search::search_with_external(
            &self.list_catalog().await,
            query,
            external,
            &self.vendor_keyword,
        )
    }

    /// Status of one package; `None` if it is not in the catalog
    pub async fn get_reconciliation(
        &self,
        descriptor: &PackageDescriptor,
    ) -> Option<ReconciliationStatus> {
        let snapshot = self.snapshot().await;
        self.reconcile(&snapshot, descriptor)
    }

    /// Status of every tracked package, in configuration order
    pub async fn statuses(&self) -> Vec<(String, Option<ReconciliationStatus>)> {
        let snapshot = self.snapshot().await;
        self.descriptors
            .iter()
            .map(|d| (d.key.clone(), self.reconcile(&snapshot, d)))
            .collect()
    }

    /// Update feed for the host updater
    pub async fn update_feed(&self) -> UpdateFeed {
        let snapshot = self.snapshot().await;
        build_update_feed(&snapshot, &self.descriptors, self.probe.as_ref())
    }

    fn reconcile(
        &self,
        snapshot: &CatalogSnapshot,
        descriptor: &PackageDescriptor,
    ) -> Option<ReconciliationStatus> {
        let record = snapshot.get(&descriptor.key)?;
        let (_, local) = LocalState::probe(self.probe.as_ref(), &record.slug);
        Some(classify(descriptor, record, local))
    }

    fn ordered(&self, snapshot: &CatalogSnapshot) -> Vec<PackageRecord> {
        self.descriptors
            .iter()
            .filter_map(|d| snapshot.get(&d.key))
            .map(|r| self.annotate(r))
            .collect()
    }

    /// Copy a cached record and mark whether the host has it active
    fn annotate(&self, record: &PackageRecord) -> PackageRecord {
        let mut record = record.clone();
        record.active = self
            .probe
            .installed_file(&record.slug)
            .is_some_and(|file| self.probe.is_active(&file));
        record
    }
}
