//! Error types for the plugin catalog

use thiserror::Error;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog error types
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Remote request for one package failed
    #[error("Fetch failed for '{key}': {reason}")]
    Fetch { key: String, reason: String },

    /// Remote record for one package could not be decoded
    #[error("Malformed record for '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// No valid snapshot is cached
    #[error("No valid catalog snapshot")]
    CacheMiss,

    /// Unknown slug or key
    #[error("Unknown package: {0}")]
    NotFound(String),

    /// Snapshot persistence failed
    #[error("Cache store error: {0}")]
    Store(String),

    /// HTTP client error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn fetch(key: &str, reason: impl Into<String>) -> Self {
        CatalogError::Fetch {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(key: &str, reason: impl Into<String>) -> Self {
        CatalogError::Decode {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects a single package
    pub fn is_package_scoped(&self) -> bool {
        matches!(self, CatalogError::Fetch { .. } | CatalogError::Decode { .. })
    }
}
