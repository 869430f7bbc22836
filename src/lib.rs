//! mangascrape: scraper adapters for manga catalog sites, outputting normalized catalog, chapter
//! and page records.

pub mod cli;
pub mod config;
pub mod model;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use model::{CatalogDetails, CatalogEntry, ChapterRecord, PageRecord, Tag};
pub use scraper::{
    fetch_details, list_all, list_page, ordered_chapters, source_by_id, Fetch, ListQuery,
    PoliteClient, PoliteClientBuilder, ScraperError, SortOrder, Source, SourceDescriptor,
};
