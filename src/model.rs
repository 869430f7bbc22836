//! Canonical data model for scraped catalogs.
//!
//! Every source adapter produces these shapes; the CLI serializes them as JSON.

use serde::{Deserialize, Serialize};

/// Publication state of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MangaStatus {
    Ongoing,
    Finished,
    Paused,
    #[default]
    Unknown,
}

/// Content rating reported by the source, when it reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRating {
    Safe,
    Adult,
    #[default]
    Unknown,
}

/// One filter vocabulary item. `key` is what the source expects in its query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub title: String,
    pub key: String,
}

impl Tag {
    pub fn new(title: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: key.into(),
        }
    }
}

/// One listed work from a source.
///
/// `key` is the source-relative URL and is stable and unique per source. `rating` is normalized to
/// `[0, 1]`; `None` means the source gave no usable rating, which is not the same as `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub source: String,
    pub key: String,
    pub public_url: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub status: MangaStatus,
    pub rating: Option<f32>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content_rating: ContentRating,
}

impl CatalogEntry {
    /// Enrich a listed entry with what the detail page reported.
    ///
    /// Identity (`source`, `key`, `public_url`) never changes. Scalar fields take the detail value
    /// when it is known and keep the listed value otherwise; collections are replaced only when the
    /// detail page produced a non-empty one.
    pub fn enrich(self, detail: CatalogEntry) -> CatalogEntry {
        CatalogEntry {
            source: self.source,
            key: self.key,
            public_url: self.public_url,
            title: if detail.title.is_empty() {
                self.title
            } else {
                detail.title
            },
            cover_url: detail.cover_url.or(self.cover_url),
            status: match detail.status {
                MangaStatus::Unknown => self.status,
                known => known,
            },
            rating: detail.rating.or(self.rating),
            description: detail.description.or(self.description),
            alt_titles: non_empty_or(detail.alt_titles, self.alt_titles),
            authors: non_empty_or(detail.authors, self.authors),
            tags: non_empty_or(detail.tags, self.tags),
            content_rating: match detail.content_rating {
                ContentRating::Unknown => self.content_rating,
                known => known,
            },
        }
    }
}

fn non_empty_or<T>(preferred: Vec<T>, fallback: Vec<T>) -> Vec<T> {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

/// One release of a chapter. Several records may share an ordinal before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub key: String,
    /// Reading position; fractional chapters (e.g. 10.5) are allowed.
    pub ordinal: f32,
    pub name: String,
    /// Epoch milliseconds, 0 when unknown.
    pub created_at: i64,
    pub scanlator: Option<String>,
    pub url: String,
}

/// One image of a chapter. `index` is 0-based and contiguous within the chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub index: u32,
    pub url: String,
}

impl PageRecord {
    /// Number a list of image URLs in reading order.
    pub fn from_urls<I>(urls: I) -> Vec<PageRecord>
    where
        I: IntoIterator<Item = String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(i, url)| PageRecord {
                index: i as u32,
                url,
            })
            .collect()
    }
}

/// An entry after the detail fetch, with its canonical chapter sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDetails {
    pub entry: CatalogEntry,
    pub chapters: Vec<ChapterRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn listed_entry() -> CatalogEntry {
        CatalogEntry {
            source: "comix".to_string(),
            key: "/title/abc".to_string(),
            public_url: "https://comix.to/title/abc".to_string(),
            title: "Listed Title".to_string(),
            cover_url: Some("https://cdn.example/list.jpg".to_string()),
            status: MangaStatus::Ongoing,
            rating: Some(0.8),
            description: None,
            alt_titles: Vec::new(),
            authors: Vec::new(),
            tags: Vec::new(),
            content_rating: ContentRating::Safe,
        }
    }

    #[test]
    fn enrich_keeps_identity_and_listed_values_when_detail_is_sparse() {
        let listed = listed_entry();
        let detail = CatalogEntry {
            source: "other".to_string(),
            key: "/elsewhere".to_string(),
            public_url: "https://elsewhere".to_string(),
            title: String::new(),
            cover_url: None,
            status: MangaStatus::Unknown,
            rating: None,
            description: Some("Synopsis".to_string()),
            alt_titles: Vec::new(),
            authors: vec!["Author".to_string()],
            tags: Vec::new(),
            content_rating: ContentRating::Unknown,
        };
        let merged = listed.clone().enrich(detail);
        assert_eq!(merged.key, listed.key);
        assert_eq!(merged.source, listed.source);
        assert_eq!(merged.public_url, listed.public_url);
        assert_eq!(merged.title, "Listed Title");
        assert_eq!(merged.cover_url, listed.cover_url);
        assert_eq!(merged.status, MangaStatus::Ongoing);
        assert_eq!(merged.rating, Some(0.8));
        assert_eq!(merged.description.as_deref(), Some("Synopsis"));
        assert_eq!(merged.authors, vec!["Author".to_string()]);
        assert_eq!(merged.content_rating, ContentRating::Safe);
    }

    #[test]
    fn enrich_prefers_known_detail_values() {
        let mut detail = listed_entry();
        detail.title = "Detail Title".to_string();
        detail.status = MangaStatus::Finished;
        detail.cover_url = Some("https://cdn.example/detail.jpg".to_string());
        let merged = listed_entry().enrich(detail);
        assert_eq!(merged.title, "Detail Title");
        assert_eq!(merged.status, MangaStatus::Finished);
        assert_eq!(
            merged.cover_url.as_deref(),
            Some("https://cdn.example/detail.jpg")
        );
    }

    #[test]
    fn page_records_are_contiguous_from_zero() {
        let pages = PageRecord::from_urls(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let indices: Vec<u32> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn entry_serializes_camel_case_and_unknown_rating_as_null() -> Result<(), Box<dyn Error>> {
        let mut entry = listed_entry();
        entry.rating = None;
        let value: serde_json::Value = serde_json::to_value(&entry)?;
        let obj = value
            .as_object()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "not an object"))?;
        assert!(obj.contains_key("coverUrl"));
        assert!(obj.contains_key("publicUrl"));
        assert!(obj["rating"].is_null());
        assert_eq!(obj["status"].as_str(), Some("ongoing"));
        assert!(!obj.contains_key("tags"), "empty tags are omitted");

        let back: CatalogEntry = serde_json::from_value(value)?;
        assert_eq!(back, entry);
        Ok(())
    }

    #[test]
    fn zero_rating_is_distinct_from_unknown() -> Result<(), Box<dyn Error>> {
        let mut entry = listed_entry();
        entry.rating = Some(0.0);
        let value = serde_json::to_value(&entry)?;
        assert_eq!(value["rating"].as_f64(), Some(0.0));
        Ok(())
    }
}
