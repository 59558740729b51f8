//! Remote and canonical package records

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Package metadata as returned by the remote API.
///
/// Every field is optional on the wire; `normalize` decides which ones are
/// required. `tags`, `sections` and `banners` arrive as JSON encoded strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    /// Remote asset id, numeric or textual
    pub id: Option<AssetId>,
    #[serde(alias = "name")]
    pub title: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub siteurl: Option<String>,
    pub release_date: Option<String>,
    pub added: Option<String>,
    /// Highest platform version the release was tested against
    pub tested: Option<String>,
    /// Minimum platform version
    pub requires: Option<String>,
    pub tags: Option<String>,
    pub sections: Option<String>,
    pub banners: Option<String>,
}

/// Remote asset identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Number(n) => write!(f, "{}", n),
            AssetId::Text(s) => f.write_str(s),
        }
    }
}

/// Icon URLs at the three resolutions hosts ask for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icons {
    #[serde(rename = "1x")]
    pub x1: String,
    #[serde(rename = "2x")]
    pub x2: String,
    pub svg: String,
}

/// Banner image URLs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banners {
    pub low: Option<String>,
    pub high: Option<String>,
}

/// Canonical, cache-resident package record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Catalog key of the tracked package
    pub key: String,
    /// URL-safe form of the title
    pub slug: String,
    pub title: String,
    pub version: String,
    pub tags: BTreeSet<String>,
    /// Named content sections (description, changelog, ...), entity-decoded
    pub sections: BTreeMap<String, String>,
    /// Plain-text summary of the description section
    pub short_description: String,
    pub author: String,
    pub author_url: Option<String>,
    pub site_url: Option<String>,
    pub icons: Icons,
    pub banners: Banners,
    pub added_date: Option<String>,
    pub last_updated: Option<String>,
    pub download_link: String,
    pub tested_platform_version: Option<String>,
    pub requires_platform_version: Option<String>,
    /// Set on copies handed to callers; always false inside the cache
    #[serde(default)]
    pub active: bool,
}

impl PackageRecord {
    /// Lowercased tags joined by spaces, used for search matching
    pub fn tag_text(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_accepts_numeric_and_text_ids() {
        let raw: RawRecord = serde_json::from_str(r#"{"id": 42, "name": "Gallery"}"#).unwrap();
        assert_eq!(raw.id, Some(AssetId::Number(42)));
        assert_eq!(raw.title.as_deref(), Some("Gallery"));

        let raw: RawRecord = serde_json::from_str(r#"{"id": "a-17"}"#).unwrap();
        assert_eq!(raw.id.unwrap().to_string(), "a-17");
    }

    #[test]
    fn test_raw_record_rejects_wrong_types() {
        assert!(serde_json::from_str::<RawRecord>(r#"{"version": ["1.0"]}"#).is_err());
    }

    #[test]
    fn test_icons_serialize_with_resolution_keys() {
        let icons = Icons {
            x1: "a".into(),
            x2: "b".into(),
            svg: "c".into(),
        };
        let value = serde_json::to_value(&icons).unwrap();
        assert_eq!(value["1x"], "a");
        assert_eq!(value["2x"], "b");
        assert_eq!(value["svg"], "c");
    }
}
