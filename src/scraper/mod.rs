//! Source adapters and the shared extraction engine.
//!
//! Every site implements [Source] (tags, list, details, chapters, pages) and is described by a
//! [SourceDescriptor]. The engine pieces ([paging], [normalize], [chapters], [embedded],
//! [fallback], [dates]) are plain functions the adapters compose.

mod client;
mod dom;
mod error;

pub mod animesama;
pub mod bfang;
pub mod chapters;
pub mod comix;
pub mod dates;
pub mod embedded;
pub mod fallback;
pub mod normalize;
pub mod paging;

pub use client::{Fetch, PoliteClient, PoliteClientBuilder};
pub use error::{ErrorKind, ScraperError};
pub use paging::{PageBatch, Pagination};

use crate::model::{CatalogDetails, CatalogEntry, ChapterRecord, PageRecord, Tag};
use serde::Deserialize;
use std::fmt;

/// Sort orders a source may offer for its listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Relevance,
    Updated,
    Popularity,
    Newest,
    Alphabetical,
}

impl SortOrder {
    pub const ALL: [SortOrder; 5] = [
        SortOrder::Relevance,
        SortOrder::Updated,
        SortOrder::Popularity,
        SortOrder::Newest,
        SortOrder::Alphabetical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::Updated => "updated",
            SortOrder::Popularity => "popularity",
            SortOrder::Newest => "newest",
            SortOrder::Alphabetical => "alphabetical",
        }
    }

    pub fn from_name(s: &str) -> Option<SortOrder> {
        let s = s.trim().to_lowercase();
        SortOrder::ALL.into_iter().find(|o| o.name() == s)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which listing filters a source understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCapabilities {
    pub search: bool,
    pub search_with_filters: bool,
    pub multiple_tags: bool,
    pub tags_exclusion: bool,
    pub author_search: bool,
}

/// Read-only description of a source: identity, where it lives, and what its listing supports.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub lang: &'static str,
    pub domain: String,
    pub page_size: u32,
    /// The first entry is the default order.
    pub sort_orders: &'static [SortOrder],
    pub filters: FilterCapabilities,
}

impl SourceDescriptor {
    pub fn base_url(&self) -> String {
        format!("https://{}", self.domain)
    }

    pub fn default_order(&self) -> Option<SortOrder> {
        self.sort_orders.first().copied()
    }
}

/// Per-source overrides read from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SourceSettings {
    /// Mirror domain, e.g. when a site moves.
    pub domain: Option<String>,
    pub page_size: Option<u32>,
    /// Upper bound on pages fetched by one paginated operation.
    pub max_pages: Option<u32>,
}

impl SourceSettings {
    pub(crate) fn apply(&self, mut descriptor: SourceDescriptor) -> SourceDescriptor {
        if let Some(domain) = self.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            descriptor.domain = domain.trim_end_matches('/').to_string();
        }
        if let Some(size) = self.page_size.filter(|n| *n > 0) {
            descriptor.page_size = size;
        }
        descriptor
    }
}

/// Listing request: search text, tag filters and sort order. Empty means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub author: Option<String>,
    pub order: Option<SortOrder>,
}

impl ListQuery {
    pub(crate) fn search_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// The four-operation capability every site adapter provides, plus its filter vocabulary.
///
/// `Sync` so [fetch_details] can run details and chapters concurrently.
pub trait Source: Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Tag vocabulary usable in [ListQuery::tags].
    fn tags(&self) -> Result<Vec<Tag>, ScraperError>;

    /// One page of the listing. Page numbers start at 1.
    fn list_page(&self, page: u32, query: &ListQuery)
        -> Result<PageBatch<CatalogEntry>, ScraperError>;

    /// The entry as its detail page describes it.
    fn details(&self, entry: &CatalogEntry) -> Result<CatalogEntry, ScraperError>;

    /// Every chapter release the source lists. May contain several releases of one ordinal and
    /// may be in any order; see [ordered_chapters].
    fn chapters(&self, entry: &CatalogEntry) -> Result<Vec<ChapterRecord>, ScraperError>;

    /// Images of one chapter in reading order.
    fn pages(&self, chapter: &ChapterRecord) -> Result<Vec<PageRecord>, ScraperError>;
}

/// Identifiers of every built-in source.
pub const SOURCE_IDS: [&str; 3] = [comix::ID, bfang::ID, animesama::ID];

/// Build the adapter for `id`.
pub fn source_by_id<'a>(
    id: &str,
    client: &'a dyn Fetch,
    settings: &SourceSettings,
) -> Result<Box<dyn Source + 'a>, ScraperError> {
    let source: Box<dyn Source + 'a> = match id.trim().to_lowercase().as_str() {
        comix::ID => Box::new(comix::ComixSource::new(client, settings)),
        bfang::ID => Box::new(bfang::BfangSource::new(client, settings)),
        animesama::ID => Box::new(animesama::AnimeSamaSource::new(client, settings)),
        _ => {
            return Err(ScraperError::UnknownSource {
                name: id.to_string(),
            })
        }
    };
    Ok(source)
}

fn check_order(source: &dyn Source, query: &ListQuery) -> Result<(), ScraperError> {
    let descriptor = source.descriptor();
    match query.order {
        Some(order) if !descriptor.sort_orders.contains(&order) => {
            Err(ScraperError::UnsupportedSort {
                source_id: descriptor.id.to_string(),
                order: order.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Rejects filters the source cannot apply, so they are never silently dropped.
fn check_filters(source: &dyn Source, query: &ListQuery) -> Result<(), ScraperError> {
    let descriptor = source.descriptor();
    let caps = descriptor.filters;
    let has_filters =
        !query.tags.is_empty() || !query.exclude_tags.is_empty() || query.author.is_some();
    let unsupported = if query.search_text().is_some() && !caps.search {
        Some("text search")
    } else if query.search_text().is_some() && has_filters && !caps.search_with_filters {
        Some("text search combined with filters")
    } else if query.tags.len() > 1 && !caps.multiple_tags {
        Some("more than one tag")
    } else if !query.exclude_tags.is_empty() && !caps.tags_exclusion {
        Some("tag exclusion")
    } else if query.author.is_some() && !caps.author_search {
        Some("author search")
    } else {
        None
    };
    match unsupported {
        Some(filter) => Err(ScraperError::UnsupportedFilter {
            source_id: descriptor.id.to_string(),
            filter,
        }),
        None => Ok(()),
    }
}

/// One listing page, after checking the source supports the requested order and filters.
pub fn list_page(
    source: &dyn Source,
    page: u32,
    query: &ListQuery,
) -> Result<PageBatch<CatalogEntry>, ScraperError> {
    check_order(source, query)?;
    check_filters(source, query)?;
    source.list_page(page.max(1), query)
}

/// The whole listing, page by page, until the source runs out.
///
/// Any page failure aborts the listing. `on_page` is called after each page with the page number
/// and the running total.
pub fn list_all(
    source: &dyn Source,
    query: &ListQuery,
    max_pages: Option<u32>,
    on_page: Option<&dyn Fn(u32, usize)>,
) -> Result<Vec<CatalogEntry>, ScraperError> {
    check_order(source, query)?;
    check_filters(source, query)?;
    let mut total = 0usize;
    paging::collect_pages(1, max_pages, |page| {
        let batch = source.list_page(page, query)?;
        total += batch.items.len();
        if let Some(cb) = on_page {
            cb(page, total);
        }
        Ok(batch)
    })
}

/// Canonical chapter sequence for an entry: one release per ordinal, ascending.
pub fn ordered_chapters(
    source: &dyn Source,
    entry: &CatalogEntry,
) -> Result<Vec<ChapterRecord>, ScraperError> {
    Ok(chapters::dedup_chapters(source.chapters(entry)?))
}

/// Fetch details and chapters for `entry` concurrently and merge them.
///
/// Both must succeed; either failure is returned for this entry only.
pub fn fetch_details(
    source: &dyn Source,
    entry: &CatalogEntry,
) -> Result<CatalogDetails, ScraperError> {
    let (details, chapters) = std::thread::scope(|scope| {
        let chapters = scope.spawn(|| ordered_chapters(source, entry));
        let details = source.details(entry);
        let chapters = chapters
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (details, chapters)
    });
    let detail = details?;
    let chapters = chapters?;
    log::info!(
        "{}: {} chapters for {}",
        source.descriptor().id,
        chapters.len(),
        entry.key
    );
    Ok(CatalogDetails {
        entry: entry.clone().enrich(detail),
        chapters,
    })
}

/// `base` + `path` with form-encoded query parameters, in the order given.
pub(crate) fn build_url(
    base: &str,
    path: &str,
    params: &[(&str, String)],
) -> Result<String, ScraperError> {
    let raw = normalize::absolute_url(base, path);
    let url = if params.is_empty() {
        reqwest::Url::parse(&raw)
    } else {
        reqwest::Url::parse_with_params(&raw, params.iter())
    };
    url.map(String::from).map_err(|e| ScraperError::InvalidUrl {
        input: raw,
        reason: e.to_string(),
    })
}

/// A minimal entry for a known key, for callers that skip the listing.
/// The title is empty until [fetch_details] fills it in.
pub fn entry_for_key(source: &dyn Source, key: &str) -> CatalogEntry {
    let descriptor = source.descriptor();
    let key = normalize::relative_url(&descriptor.domain, key.trim());
    CatalogEntry {
        source: descriptor.id.to_string(),
        public_url: normalize::absolute_url(&descriptor.base_url(), &key),
        key,
        title: String::new(),
        cover_url: None,
        status: Default::default(),
        rating: None,
        description: None,
        alt_titles: Vec::new(),
        authors: Vec::new(),
        tags: Vec::new(),
        content_rating: Default::default(),
    }
}
