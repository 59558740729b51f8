//! # plugshelf Catalog
//!
//! Remote plugin metadata, normalized and cached:
//! - `client`: one request per tracked package against the vendor API
//! - `normalize`: raw records into canonical `PackageRecord`s
//! - `store`: snapshot persistence (memory or JSON file)
//! - `cache`: the time-bounded, single-flight catalog cache
//!
//! Failures while fetching or decoding one package never affect the others;
//! the package is simply missing from the snapshot.

pub mod cache;
pub mod client;
pub mod error;
pub mod normalize;
pub mod record;
pub mod store;

pub use cache::{CacheSettings, CatalogCache, Clock, SystemClock};
pub use client::{CatalogSource, RemoteCatalogClient};
pub use error::{CatalogError, Result};
pub use normalize::{normalize, NormalizeContext};
pub use record::{AssetId, Banners, Icons, PackageRecord, RawRecord};
pub use store::{CatalogSnapshot, FileStore, MemoryStore, SnapshotStore};
