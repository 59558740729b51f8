//! # plugshelf Plugins
//!
//! Turns the cached remote catalog into decisions the host can act on:
//! - `probe`: what is installed and active locally
//! - `reconcile`: per-package status and the two-bucket update feed
//! - `search`: tag search and brand-keyword merging
//! - `service`: `PluginCatalog`, the single entry point for hosts
//!
//! Nothing in this crate fetches on its own; all data comes from the
//! catalog cache.

pub mod probe;
pub mod reconcile;
pub mod search;
pub mod service;

pub use probe::{DirectoryProbe, InstallProbe, MemoryProbe};
pub use reconcile::{
    build_update_feed, classify, versions_match, LocalState, ReconciliationStatus,
    UpdateDescriptor, UpdateFeed,
};
pub use search::SearchResults;
pub use service::PluginCatalog;
