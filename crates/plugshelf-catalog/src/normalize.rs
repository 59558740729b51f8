//! Conversion of remote records into canonical `PackageRecord`s
//!
//! Everything here is pure: no I/O, no clock. A record that is missing a
//! required field or carries a malformed embedded field fails on its own
//! with `CatalogError::Decode`.

use crate::record::{Banners, Icons, PackageRecord, RawRecord};
use crate::{CatalogError, Result};
use once_cell::sync::Lazy;
use plugshelf_config::{CatalogConfig, PackageDescriptor};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Short descriptions are cut to this many characters
pub const SHORT_DESCRIPTION_LIMIT: usize = 150;

/// Marker appended when a description is cut mid-sentence
pub const ELLIPSIS: char = '…';

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});").unwrap());
static HSPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Settings the normalizer needs from the catalog configuration
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    /// Base URL of the metadata API, download links hang off it
    pub endpoint: String,
    /// Base URL icons are served from
    pub asset_base: String,
    pub license_key: String,
}

impl NormalizeContext {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            asset_base: config.asset_base.clone(),
            license_key: config.license_key.clone(),
        }
    }
}

/// Tags arrive either as a list of names or as a slug → name map
#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedTags {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

/// Turn one remote record into a canonical record.
pub fn normalize(
    raw: RawRecord,
    descriptor: &PackageDescriptor,
    ctx: &NormalizeContext,
) -> Result<PackageRecord> {
    let key = descriptor.key.as_str();

    let title = required(raw.title, key, "title")?;
    let title = decode_entities(title.trim());
    let version = required(raw.version, key, "version")?.trim().to_string();
    let asset_id = raw
        .id
        .ok_or_else(|| CatalogError::decode(key, "missing field 'id'"))?;

    let slug = match slugify(&title) {
        slug if !slug.is_empty() => slug,
        _ => slugify(key),
    };
    if slug.is_empty() {
        return Err(CatalogError::decode(
            key,
            format!("neither title {:?} nor key yields a slug", title),
        ));
    }

    let tags = match raw.tags.as_deref() {
        Some(encoded) => decode_tags(encoded, key)?,
        None => BTreeSet::new(),
    };

    let raw_sections = match raw.sections.as_deref() {
        Some(encoded) => decode_embedded::<BTreeMap<String, String>>(encoded, key, "sections")?,
        None => BTreeMap::new(),
    };

    // Built from the undecoded body so entities are decoded exactly once
    let short_description = raw_sections
        .get("description")
        .map(|d| short_description(&plain_text(d)))
        .unwrap_or_default();

    let sections = raw_sections
        .into_iter()
        .map(|(name, body)| (name, normalize_section(&body)))
        .collect();

    let banners = match raw.banners.as_deref() {
        Some(encoded) => decode_embedded::<Banners>(encoded, key, "banners")?,
        None => Banners::default(),
    };

    let download_link = download_link(ctx, &asset_id.to_string(), descriptor)
        .map_err(|e| CatalogError::decode(key, format!("cannot build download link: {}", e)))?;

    let author = raw
        .author
        .map(|a| decode_entities(a.trim()))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| descriptor.installed_author.clone());

    Ok(PackageRecord {
        key: key.to_string(),
        icons: icons(&ctx.asset_base, &slug),
        slug,
        title,
        version,
        tags,
        sections,
        short_description,
        author,
        author_url: raw.siteurl.clone(),
        site_url: raw.siteurl,
        banners,
        added_date: raw.added,
        last_updated: raw.release_date,
        download_link,
        tested_platform_version: raw.tested,
        requires_platform_version: raw.requires,
        active: false,
    })
}

fn required(value: Option<String>, key: &str, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(CatalogError::decode(key, format!("field '{}' is empty", field))),
        None => Err(CatalogError::decode(key, format!("missing field '{}'", field))),
    }
}

fn decode_embedded<T: for<'de> Deserialize<'de>>(encoded: &str, key: &str, field: &str) -> Result<T> {
    serde_json::from_str(encoded)
        .map_err(|e| CatalogError::decode(key, format!("field '{}' is malformed: {}", field, e)))
}

fn decode_tags(encoded: &str, key: &str) -> Result<BTreeSet<String>> {
    let tags = match decode_embedded::<EncodedTags>(encoded, key, "tags")? {
        EncodedTags::List(names) => names,
        EncodedTags::Map(map) => map.into_values().collect(),
    };
    Ok(tags
        .into_iter()
        .map(|t| decode_entities(t.trim()))
        .filter(|t| !t.is_empty())
        .collect())
}

/// Lowercase, every run of non-alphanumerics becomes one hyphen, no hyphen at
/// either end.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Icon URLs are derived from the slug alone
pub fn icons(asset_base: &str, slug: &str) -> Icons {
    let base = asset_base.trim_end_matches('/');
    Icons {
        x1: format!("{}/{}/icon-128x128.png", base, slug),
        x2: format!("{}/{}/icon-256x256.png", base, slug),
        svg: format!("{}/{}/icon.svg", base, slug),
    }
}

fn download_link(
    ctx: &NormalizeContext,
    asset_id: &str,
    descriptor: &PackageDescriptor,
) -> std::result::Result<String, url::ParseError> {
    let mut url = url::Url::parse(&format!(
        "{}/api/open/download",
        ctx.endpoint.trim_end_matches('/')
    ))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("license", &ctx.license_key);
        query.append_pair("id", asset_id);
        if let Some(version) = descriptor.installed_version.as_deref() {
            query.append_pair("installed_version", version);
        }
    }
    Ok(url.into())
}

/// Decode HTML character references. Unknown named entities are left as-is.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "deg" => '°',
        "times" => '×',
        "euro" => '€',
        _ => return None,
    };
    Some(c)
}

/// Entity-decode a section body, collapse horizontal whitespace, squeeze
/// blank-line runs to one and drop blank lines at both ends.
pub fn normalize_section(body: &str) -> String {
    let decoded = decode_entities(body);
    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let line = HSPACE_RE.replace_all(line, " ").trim().to_string();
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Strip markup, then decode entities and fold all whitespace to single
/// spaces. Expects the raw body: escaped markup survives as literal text.
pub fn plain_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

/// Cut a plain-text description to the short-description budget.
///
/// Text within the limit is returned unchanged. Otherwise the cut lands just
/// after the last sentence end that falls in the final 20% of the budget; if
/// there is none, the first `SHORT_DESCRIPTION_LIMIT` characters are kept and
/// `ELLIPSIS` appended.
pub fn short_description(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= SHORT_DESCRIPTION_LIMIT {
        return text.to_string();
    }

    let window_start = SHORT_DESCRIPTION_LIMIT - SHORT_DESCRIPTION_LIMIT / 5;
    for i in (window_start..SHORT_DESCRIPTION_LIMIT).rev() {
        let ends_sentence = matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        if ends_sentence {
            return chars[..=i].iter().collect();
        }
    }

    let mut cut: String = chars[..SHORT_DESCRIPTION_LIMIT].iter().collect();
    cut.push(ELLIPSIS);
    cut
}
