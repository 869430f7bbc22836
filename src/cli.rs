//! CLI parsing and orchestration. Parses args, builds the client and source from config and flags,
//! runs one operation and writes its result as JSON. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::model::{ChapterRecord, Tag};
use crate::scraper::normalize::relative_url;
use crate::scraper::{
    entry_for_key, fetch_details, list_all, list_page, source_by_id, ErrorKind, Fetch, ListQuery,
    PoliteClient, ScraperError, SortOrder, Source, SourceSettings, SOURCE_IDS,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("Cannot write output {path}: {source}")]
    Output {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(e) if e.kind() == ErrorKind::InvalidRequest => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Output { .. } | CliRunError::Json(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangascrape")]
#[command(about = "Query manga catalog sites and print normalized catalog, chapter and page JSON")]
#[command(
    after_help = "Config file keys (user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, max_pages, [sources.<id>] domain/page_size/max_pages) are read from ./mangascrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Write JSON here instead of stdout.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log progress at info level and print the full error chain.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long, global = true)]
    pub delay: Option<f64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Give up on a paginated listing after this many pages (overrides config).
    #[arg(long, global = true)]
    pub max_pages: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the supported sources and what their listings support.
    Sources,

    /// Print the tag vocabulary of a source.
    Tags {
        source: String,
    },

    /// List catalog entries, one page or the whole listing.
    List {
        source: String,

        /// Page to fetch (1-based).
        #[arg(long, default_value_t = 1, conflicts_with = "all")]
        page: u32,

        /// Fetch every page until the listing ends.
        #[arg(long)]
        all: bool,

        /// Search text.
        #[arg(long)]
        query: Option<String>,

        /// Tag key to include (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Tag key to exclude (repeatable).
        #[arg(long = "exclude-tag")]
        exclude_tags: Vec<String>,

        /// Author search.
        #[arg(long)]
        author: Option<String>,

        /// Sort order: relevance, updated, popularity, newest or alphabetical.
        #[arg(long, value_parser = parse_order)]
        order: Option<SortOrder>,
    },

    /// Fetch an entry's details and its ordered chapter list.
    Details {
        source: String,

        /// Entry key (e.g. /title/abc) or its public URL.
        key: String,
    },

    /// List the page images of one chapter.
    Pages {
        source: String,

        /// Chapter URL as printed by `details`, relative or absolute.
        chapter_url: String,

        /// Chapter number. Sources that store images per chapter number need it; inferred from
        /// the URL when possible.
        #[arg(long)]
        number: Option<f32>,
    },
}

fn parse_order(s: &str) -> Result<SortOrder, String> {
    SortOrder::from_name(s).ok_or_else(|| {
        format!(
            "Invalid --order value: '{}'. Use relevance, updated, popularity, newest, or alphabetical.",
            s
        )
    })
}

/// Serializable summary of a source for `sources`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceInfo {
    id: &'static str,
    name: &'static str,
    lang: &'static str,
    domain: String,
    sort_orders: Vec<&'static str>,
    search: bool,
    search_with_filters: bool,
    multiple_tags: bool,
    tags_exclusion: bool,
    author_search: bool,
}

impl SourceInfo {
    fn of(source: &dyn Source) -> Self {
        let d = source.descriptor();
        SourceInfo {
            id: d.id,
            name: d.name,
            lang: d.lang,
            domain: d.domain.clone(),
            sort_orders: d.sort_orders.iter().map(|o| o.name()).collect(),
            search: d.filters.search,
            search_with_filters: d.filters.search_with_filters,
            multiple_tags: d.filters.multiple_tags,
            tags_exclusion: d.filters.tags_exclusion,
            author_search: d.filters.author_search,
        }
    }
}

/// Chapter number from a chapter URL: a `chapitre=N` query parameter or a `-chapter-N` suffix.
fn chapter_number_hint(url: &str) -> Option<f32> {
    if let Some((_, rest)) = url.split_once("chapitre=") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
        return digits.parse().ok();
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let (_, number) = path.trim_end_matches('/').rsplit_once("-chapter-")?;
    number.parse().ok()
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), CliRunError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    match output {
        Some(path) => {
            validate_output_path(path)?;
            std::fs::write(path, json).map_err(|e| CliRunError::Output {
                path: path.display().to_string(),
                source: e,
            })
        }
        None => std::io::stdout()
            .lock()
            .write_all(json.as_bytes())
            .map_err(|e| CliRunError::Output {
                path: "<stdout>".to_string(),
                source: e,
            }),
    }
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    const DEFAULT_DELAY_SECS: f64 = 1.0;
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRY_COUNT: u32 = 3;
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    if !delay_secs.is_finite() || delay_secs < 0.0 {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid delay {}: expected a non-negative number of seconds",
            delay_secs
        )));
    }
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| vec![1, 2, 4]);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder()
        .delay_millis((delay_secs * 1000.0).round() as u64)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn settings_for(args: &Args, config: Option<&Config>, id: &str) -> SourceSettings {
    let mut settings = config
        .map(|c| c.source_settings(id))
        .unwrap_or_default();
    if args.max_pages.is_some() {
        settings.max_pages = args.max_pages;
    }
    settings
}

fn open_source<'a>(
    args: &Args,
    config: Option<&Config>,
    client: &'a dyn Fetch,
    id: &str,
) -> Result<(Box<dyn Source + 'a>, SourceSettings), CliRunError> {
    let settings = settings_for(args, config, &id.trim().to_lowercase());
    let source = source_by_id(id, client, &settings).map_err(|e| match e {
        ScraperError::UnknownSource { name } => CliRunError::InvalidInput(format!(
            "Unknown source '{}'. Supported: {}.",
            name,
            SOURCE_IDS.join(", ")
        )),
        other => CliRunError::Scraper(other),
    })?;
    Ok((source, settings))
}

/// Spinner for `list --all`, updated after each page.
fn listing_spinner() -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();
    let client = build_client(args, config)?;
    let output = args.output.as_deref();

    match &args.command {
        Command::Sources => {
            let infos = SOURCE_IDS
                .iter()
                .map(|id| open_source(args, config, &client, id).map(|(s, _)| SourceInfo::of(s.as_ref())))
                .collect::<Result<Vec<_>, _>>()?;
            write_json(&infos, output)
        }
        Command::Tags { source } => {
            let (source, _) = open_source(args, config, &client, source)?;
            let tags: Vec<Tag> = source.tags()?;
            write_json(&tags, output)
        }
        Command::List {
            source,
            page,
            all,
            query,
            tags,
            exclude_tags,
            author,
            order,
        } => {
            let (source, settings) = open_source(args, config, &client, source)?;
            let query = ListQuery {
                query: query.clone(),
                tags: tags.clone(),
                exclude_tags: exclude_tags.clone(),
                author: author.clone(),
                order: *order,
            };
            if !*all {
                let batch = list_page(source.as_ref(), *page, &query)?;
                return write_json(&batch.items, output);
            }
            let spinner = (!args.quiet).then(listing_spinner);
            let on_page = |page: u32, total: usize| {
                if let Some(bar) = &spinner {
                    bar.set_message(format!("Page {}: {} entries", page, total));
                }
            };
            let result = list_all(source.as_ref(), &query, settings.max_pages, Some(&on_page));
            if let Some(bar) = &spinner {
                bar.finish_and_clear();
            }
            let entries = result?;
            log::info!("{}: {} entries", source.descriptor().id, entries.len());
            write_json(&entries, output)
        }
        Command::Details { source, key } => {
            let (source, _) = open_source(args, config, &client, source)?;
            if key.trim().is_empty() {
                return Err(CliRunError::InvalidInput("Entry key is empty.".to_string()));
            }
            let entry = entry_for_key(source.as_ref(), key);
            let details = fetch_details(source.as_ref(), &entry)?;
            write_json(&details, output)
        }
        Command::Pages {
            source,
            chapter_url,
            number,
        } => {
            let (source, _) = open_source(args, config, &client, source)?;
            let url = relative_url(&source.descriptor().domain, chapter_url.trim());
            let ordinal = number.or_else(|| chapter_number_hint(&url)).unwrap_or(0.0);
            let chapter = ChapterRecord {
                key: url.clone(),
                ordinal,
                name: String::new(),
                created_at: 0,
                scanlator: None,
                url,
            };
            let pages = source.pages(&chapter)?;
            write_json(&pages, output)
        }
    }
}
