//! Remote metadata API client

use crate::record::RawRecord;
use crate::{CatalogError, Result};
use async_trait::async_trait;
use plugshelf_config::{CatalogConfig, PackageDescriptor, ReleaseChannel};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Path of the per-package version endpoint, relative to the API base
pub const VERSION_ENDPOINT: &str = "api/open/getPluginVersion";

/// Something that can produce the raw remote record for a package
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the remote record for one package. Never retries.
    async fn fetch(&self, descriptor: &PackageDescriptor, channel: ReleaseChannel)
        -> Result<RawRecord>;
}

/// HTTP client for the vendor metadata API
pub struct RemoteCatalogClient {
    client: Client,
    endpoint: String,
    platform_version: String,
}

impl RemoteCatalogClient {
    /// Build a client from the catalog configuration
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("plugshelf/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            platform_version: config.platform_version.clone(),
        })
    }

    fn version_url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), VERSION_ENDPOINT)
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalogClient {
    async fn fetch(
        &self,
        descriptor: &PackageDescriptor,
        channel: ReleaseChannel,
    ) -> Result<RawRecord> {
        let key = descriptor.key.as_str();
        if key.is_empty() {
            return Err(CatalogError::fetch(key, "package key is empty"));
        }

        let installed_param = format!("installed_{}_version", key);
        let query = [
            ("key", key),
            ("channel", channel.as_str()),
            (
                installed_param.as_str(),
                descriptor.installed_version.as_deref().unwrap_or_default(),
            ),
            ("installed_platform_version", self.platform_version.as_str()),
        ];

        debug!(key, %channel, "Requesting package metadata");

        let response = self
            .client
            .get(self.version_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| CatalogError::fetch(key, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::fetch(key, format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CatalogError::fetch(key, e.to_string()))?;

        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| CatalogError::fetch(key, format!("malformed payload: {}", e)))?;
        if !value.is_object() {
            return Err(CatalogError::fetch(key, "payload is not a JSON object"));
        }

        serde_json::from_value(value).map_err(|e| CatalogError::decode(key, e.to_string()))
    }
}
