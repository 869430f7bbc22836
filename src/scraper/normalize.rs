//! Raw source records to [CatalogEntry].
//!
//! Adapters fill a [RawEntry] from whatever the site returns (JSON fields, DOM selectors) and hand
//! it to [normalize] together with the source's [NormalizeRules]. Unknown statuses, missing covers
//! and missing ratings are normal; only a record without identity or title is rejected.

use crate::model::{CatalogEntry, ContentRating, MangaStatus, Tag};
use crate::scraper::error::ScraperError;
use serde_json::Value;

/// Fields as the source reported them, before any mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    /// Source-relative URL; becomes [CatalogEntry::key].
    pub key: Option<String>,
    pub title: Option<String>,
    pub cover: Option<String>,
    pub status: Option<String>,
    /// Rating on the source's own scale.
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub alt_titles: Vec<String>,
    pub authors: Vec<String>,
    pub tags: Vec<Tag>,
    pub adult: Option<bool>,
}

/// Per-source mapping rules.
#[derive(Debug, Clone)]
pub struct NormalizeRules {
    pub source_id: &'static str,
    /// Base for public URLs, e.g. `https://comix.to`.
    pub base_url: String,
    /// Status strings exactly as the source prints them.
    pub status_table: &'static [(&'static str, MangaStatus)],
    /// Top of the source's rating scale (10 for a 0-10 score).
    pub rating_scale: f64,
}

/// Where each field lives in a JSON record, as JSON pointers (RFC 6901).
#[derive(Debug, Clone, Copy)]
pub struct JsonFieldMap {
    /// Pointer to the source's handle; combined with `key_template` to form the key.
    pub handle: &'static str,
    /// `{}` is replaced by the handle, e.g. `/title/{}`.
    pub key_template: &'static str,
    pub title: &'static str,
    pub cover: &'static str,
    pub status: &'static str,
    pub rating: &'static str,
    pub description: &'static str,
}

impl RawEntry {
    /// Read a JSON record through `map`. Missing or wrongly typed fields become `None`.
    pub fn from_json(value: &Value, map: &JsonFieldMap) -> RawEntry {
        let handle = value.pointer(map.handle).and_then(scalar_string);
        RawEntry {
            key: handle.map(|h| map.key_template.replace("{}", &h)),
            title: value.pointer(map.title).and_then(scalar_string),
            cover: value.pointer(map.cover).and_then(scalar_string),
            status: value.pointer(map.status).and_then(scalar_string),
            rating: value.pointer(map.rating).and_then(number_like),
            description: value.pointer(map.description).and_then(scalar_string),
            ..RawEntry::default()
        }
    }
}

/// Non-empty trimmed string, or a number rendered as a string (some APIs send numeric ids).
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map a status string through the source's table. Comparison ignores surrounding whitespace and
/// ASCII case; anything unmapped is [MangaStatus::Unknown].
pub fn map_status(raw: Option<&str>, table: &[(&str, MangaStatus)]) -> MangaStatus {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return MangaStatus::Unknown;
    };
    table
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(raw) || *label == raw)
        .map(|(_, status)| *status)
        .unwrap_or(MangaStatus::Unknown)
}

/// Rescale a rating to `[0, 1]`. Absent, non-positive, or non-finite ratings are unknown.
pub fn normalize_rating(raw: Option<f64>, scale: f64) -> Option<f32> {
    let raw = raw.filter(|r| r.is_finite() && *r > 0.0)?;
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    Some((raw / scale).min(1.0) as f32)
}

/// Build a canonical entry from a raw record.
///
/// `url` identifies the response the record came from and is only used in errors.
pub fn normalize(
    raw: RawEntry,
    rules: &NormalizeRules,
    url: &str,
) -> Result<CatalogEntry, ScraperError> {
    let key = raw
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ScraperError::malformed(url, "catalog record has no identity"))?;
    let title = raw
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScraperError::malformed(url, format!("catalog record {} has no title", key)))?;
    let public_url = absolute_url(&rules.base_url, &key);
    let content_rating = match raw.adult {
        Some(true) => ContentRating::Adult,
        Some(false) => ContentRating::Safe,
        None => ContentRating::Unknown,
    };
    Ok(CatalogEntry {
        source: rules.source_id.to_string(),
        status: map_status(raw.status.as_deref(), rules.status_table),
        rating: normalize_rating(raw.rating, rules.rating_scale),
        cover_url: raw
            .cover
            .filter(|c| !c.is_empty())
            .map(|c| absolute_url(&rules.base_url, &c)),
        description: raw.description.filter(|d| !d.trim().is_empty()),
        alt_titles: raw.alt_titles,
        authors: raw.authors,
        tags: raw.tags,
        content_rating,
        key,
        public_url,
        title,
    })
}

/// Join a source-relative path onto `base`; already-absolute URLs pass through.
pub fn absolute_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if let Some(rest) = path.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Inverse of [absolute_url] for links on the source's own domain.
pub fn relative_url(domain: &str, url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("//"));
    match without_scheme {
        Some(rest) => {
            let rest = rest.strip_prefix("www.").unwrap_or(rest);
            match rest.strip_prefix(domain) {
                Some(path) if path.is_empty() => "/".to_string(),
                Some(path) if path.starts_with('/') => path.to_string(),
                _ => url.to_string(),
            }
        }
        None if url.starts_with('/') => url.to_string(),
        None => format!("/{}", url),
    }
}
