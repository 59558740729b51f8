//! # plugshelf Configuration
//!
//! Tracked packages, remote endpoint settings and the host's plugin layout.
//!
//! Configuration sources (in priority order):
//! 1. Environment variables (`PLUGSHELF_`, nested keys split by `__`)
//! 2. User config (~/.config/plugshelf/config.toml)
//! 3. Built-in defaults

use anyhow::{bail, Context};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest snapshot lifetime accepted, in days
pub const MAX_CACHE_TTL_DAYS: u32 = 365;

/// Longest per-request timeout accepted, in seconds
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("dev", "plugshelf", "plugshelf")
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config/plugshelf"))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Remote catalog settings
    pub catalog: CatalogConfig,
    /// Local installation layout
    pub host: HostConfig,
    /// Tracked packages, in display order
    pub packages: Vec<PackageDescriptor>,
}

impl Config {
    /// Check the configuration for values the catalog cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let endpoint = url::Url::parse(&self.catalog.endpoint)
            .with_context(|| format!("invalid catalog endpoint {:?}", self.catalog.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("catalog endpoint must be http(s), got {}", endpoint.scheme());
        }

        if !(1..=MAX_CACHE_TTL_DAYS).contains(&self.catalog.cache_ttl_days) {
            bail!(
                "cache_ttl_days must be between 1 and {}, got {}",
                MAX_CACHE_TTL_DAYS,
                self.catalog.cache_ttl_days
            );
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.catalog.request_timeout_secs) {
            bail!(
                "request_timeout_secs must be between 1 and {}, got {}",
                MAX_REQUEST_TIMEOUT_SECS,
                self.catalog.request_timeout_secs
            );
        }
        if self.catalog.retry_minutes == 0 {
            bail!("retry_minutes must be at least 1");
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            if package.key.trim().is_empty() {
                bail!("package key must not be empty");
            }
            if !seen.insert(package.key.as_str()) {
                bail!("duplicate package key '{}'", package.key);
            }
        }

        Ok(())
    }

    /// Look up a tracked package by key
    pub fn package(&self, key: &str) -> Option<&PackageDescriptor> {
        self.packages.iter().find(|p| p.key == key)
    }
}

/// Remote catalog endpoint and cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the metadata API
    pub endpoint: String,
    /// Base URL icons are served from
    pub asset_base: String,
    /// License key embedded in download links
    pub license_key: String,
    /// Release channel to request
    pub channel: ReleaseChannel,
    /// Version of the host platform, reported to the API
    pub platform_version: String,
    /// Searching for this keyword always surfaces the whole catalog
    pub vendor_keyword: String,
    /// Identifier the persisted snapshot is stored under
    pub catalog_id: String,
    /// Snapshot lifetime in days
    pub cache_ttl_days: u32,
    /// How long an empty catalog from a fully failed refresh is kept, in minutes
    pub retry_minutes: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Override for the snapshot file location
    pub cache_path: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.plugshelf.dev".to_string(),
            asset_base: "https://assets.plugshelf.dev/plugins".to_string(),
            license_key: String::new(),
            channel: ReleaseChannel::Stable,
            platform_version: "6.5".to_string(),
            vendor_keyword: "plugshelf".to_string(),
            catalog_id: "plugshelf_catalog".to_string(),
            cache_ttl_days: 7,
            retry_minutes: 15,
            request_timeout_secs: 15,
            cache_path: None,
        }
    }
}

impl CatalogConfig {
    /// Resolved location of the persisted snapshot
    pub fn cache_file(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("plugshelf")
                .join(format!("{}.json", self.catalog_id))
        })
    }
}

/// Distribution track requested from the remote API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    Stable,
    Beta,
}

impl ReleaseChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Beta => "beta",
        }
    }
}

impl std::fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the host keeps installed plugins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Directory containing one folder per installed plugin
    pub plugins_dir: PathBuf,
    /// Plugin files (relative to `plugins_dir`) that are currently active
    pub active_plugins: Vec<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugins_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("plugshelf")
                .join("plugins"),
            active_plugins: Vec::new(),
        }
    }
}

/// A package tracked by the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Remote catalog key
    pub key: String,
    /// Main plugin file, relative to the plugins directory
    pub local_file: PathBuf,
    /// Version currently installed, if known
    #[serde(default)]
    pub installed_version: Option<String>,
    /// Author string of the installed copy
    #[serde(default)]
    pub installed_author: String,
}

impl PackageDescriptor {
    pub fn new(key: impl Into<String>, local_file: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            local_file: local_file.into(),
            installed_version: None,
            installed_author: String::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.installed_version = Some(version.into());
        self
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager reading the default config file
    pub fn new() -> anyhow::Result<Self> {
        Self::with_path(config_dir().join("config.toml"))
    }

    /// Create a config manager for a specific file
    pub fn with_path(config_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let config_path = config_path.into();
        let config = Self::load_from_file(&config_path)?;
        tracing::debug!("Loaded configuration from {:?}", config_path);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Load configuration from file, layered with environment overrides.
    /// A missing file yields the defaults.
    fn load_from_file(path: &Path) -> anyhow::Result<Config> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PLUGSHELF_").split("__"));

        Ok(figment.extract()?)
    }

    /// Get current configuration
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Path the configuration is read from and saved to
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Update configuration
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write();
        f(&mut config);
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        let config = self.config.read();
        let content = toml::to_string_pretty(&*config)?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.config_path, content)?;
        Ok(())
    }
}
