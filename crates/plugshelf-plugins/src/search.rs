//! Catalog search

use plugshelf_catalog::PackageRecord;
use serde::Serialize;
use std::collections::HashSet;

/// Search output with the count hosts display next to it
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub records: Vec<PackageRecord>,
    pub total: usize,
}

impl SearchResults {
    fn from_records(records: Vec<PackageRecord>) -> Self {
        Self {
            total: records.len(),
            records,
        }
    }
}

/// Case-insensitive substring match against a record's concatenated tags.
/// An empty query matches everything.
pub fn matches(record: &PackageRecord, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    needle.is_empty() || record.tag_text().contains(&needle)
}

/// Filter the cached catalog by tag
pub fn search(catalog: &[PackageRecord], query: &str) -> Vec<PackageRecord> {
    catalog
        .iter()
        .filter(|r| matches(r, query))
        .cloned()
        .collect()
}

/// Merge the cached catalog into a result set the host already has.
///
/// A query mentioning `vendor_keyword` returns the whole catalog followed by
/// every external record. Any other query keeps only the catalog and external
/// records that match. Records sharing a slug appear once, catalog first.
pub fn search_with_external(
    catalog: &[PackageRecord],
    query: &str,
    external: Vec<PackageRecord>,
    vendor_keyword: &str,
) -> SearchResults {
    let keyword = vendor_keyword.trim().to_lowercase();
    let brand_search = !keyword.is_empty() && query.to_lowercase().contains(&keyword);

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(catalog.len() + external.len());
    let candidates = catalog.iter().cloned().chain(external);
    for record in candidates {
        if !brand_search && !matches(&record, query) {
            continue;
        }
        if seen.insert(record.slug.clone()) {
            merged.push(record);
        }
    }

    SearchResults::from_records(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugshelf_catalog::{normalize, AssetId, NormalizeContext, RawRecord};
    use plugshelf_config::PackageDescriptor;

    fn record(title: &str, tags: &[&str]) -> PackageRecord {
        let raw = RawRecord {
            id: Some(AssetId::Number(1)),
            title: Some(title.to_string()),
            version: Some("1.0.0".to_string()),
            tags: Some(serde_json::to_string(tags).unwrap()),
            ..RawRecord::default()
        };
        let ctx = NormalizeContext {
            endpoint: "https://api.example.com".to_string(),
            asset_base: "https://cdn.example.com".to_string(),
            license_key: String::new(),
        };
        normalize(raw, &PackageDescriptor::new(title, "x.php"), &ctx).unwrap()
    }

    fn catalog() -> Vec<PackageRecord> {
        vec![
            record("Smart Gallery", &["Gallery", "Images"]),
            record("Contact Forms", &["forms", "email"]),
            record("Hero Slider", &["slider", "images"]),
        ]
    }

    fn external() -> Vec<PackageRecord> {
        vec![
            record("Other Gallery", &["gallery"]),
            record("SEO Toolkit", &["seo"]),
        ]
    }

    fn slugs(records: &[PackageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.slug.as_str()).collect()
    }

    #[test]
    fn test_empty_query_returns_everything() {
        assert_eq!(search(&catalog(), "").len(), 3);
        assert_eq!(search(&catalog(), "   ").len(), 3);
    }

    #[test]
    fn test_tag_match_is_case_insensitive() {
        let found = search(&catalog(), "IMAGES");
        assert_eq!(slugs(&found), vec!["smart-gallery", "hero-slider"]);
    }

    #[test]
    fn test_title_alone_does_not_match() {
        assert!(search(&catalog(), "contact").is_empty());
        assert!(search(&catalog(), "hero").is_empty());
        assert!(search(&catalog(), "nothing-like-this").is_empty());
    }

    #[test]
    fn test_tag_substring_matches() {
        assert_eq!(slugs(&search(&catalog(), "mail")), vec!["contact-forms"]);
        assert_eq!(slugs(&search(&catalog(), "gall")), vec!["smart-gallery"]);
    }

    #[test]
    fn test_vendor_keyword_is_additive_union() {
        let results = search_with_external(&catalog(), "Plugshelf addons", external(), "plugshelf");
        assert_eq!(results.total, 3 + 2);
        assert_eq!(results.records.len(), results.total);
        assert_eq!(
            slugs(&results.records),
            vec!["smart-gallery", "contact-forms", "hero-slider", "other-gallery", "seo-toolkit"]
        );
    }

    #[test]
    fn test_other_terms_match_tags_only() {
        let external = vec![record("SEO Toolkit", &["seo"]), record("Toolkit Extras", &["toolkit"])];
        let results = search_with_external(&catalog(), "toolkit", external, "plugshelf");
        assert_eq!(slugs(&results.records), vec!["toolkit-extras"]);
    }

    #[test]
    fn test_other_terms_filter_both_sets() {
        let results = search_with_external(&catalog(), "gallery", external(), "plugshelf");
        assert_eq!(slugs(&results.records), vec!["smart-gallery", "other-gallery"]);
        assert_eq!(results.total, 2);
        assert!(results.total < catalog().len() + external().len());
    }

    #[test]
    fn test_duplicate_slugs_collapse() {
        let external = vec![record("Smart Gallery", &["gallery"])];
        let results = search_with_external(&catalog(), "plugshelf", external, "plugshelf");
        assert_eq!(results.total, 3);
    }

    #[test]
    fn test_empty_vendor_keyword_never_unions() {
        let results = search_with_external(&catalog(), "seo", external(), "");
        assert_eq!(slugs(&results.records), vec!["seo-toolkit"]);
    }
}
