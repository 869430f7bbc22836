//! Anime-Sama adapter (scans section). Catalog and details are HTML; the chapter list lives in a
//! generated `episodes.js` with a JSON count endpoint as backup, and page images are numbered files
//! on the site's scan CDN. Every request carries a `Referer` of the site root.

use crate::model::{CatalogEntry, ChapterRecord, PageRecord, Tag};
use crate::scraper::client::Fetch;
use crate::scraper::dom::{first_attr, first_text, next_element, selector, text_of};
use crate::scraper::error::ScraperError;
use crate::scraper::fallback::FallbackChain;
use crate::scraper::normalize::{absolute_url, normalize, relative_url, NormalizeRules, RawEntry};
use crate::scraper::paging::PageBatch;
use crate::scraper::{
    build_url, FilterCapabilities, ListQuery, SortOrder, Source, SourceDescriptor, SourceSettings,
};
use reqwest::Url;
use scraper::Html;
use serde_json::Value;

pub const ID: &str = "animesama";
const DOMAIN: &str = "anime-sama.org";
const PAGE_SIZE: u32 = 48;
const COUNT_ENDPOINT: &str = "/s2/scans/get_nb_chap_et_img.php";

fn descriptor() -> SourceDescriptor {
    SourceDescriptor {
        id: ID,
        name: "AnimeSama",
        lang: "fr",
        domain: DOMAIN.to_string(),
        page_size: PAGE_SIZE,
        sort_orders: &[SortOrder::Alphabetical],
        filters: FilterCapabilities {
            search: true,
            search_with_filters: true,
            multiple_tags: true,
            tags_exclusion: false,
            author_search: false,
        },
    }
}

pub struct AnimeSamaSource<'a> {
    client: &'a dyn Fetch,
    descriptor: SourceDescriptor,
    rules: NormalizeRules,
}

impl<'a> AnimeSamaSource<'a> {
    pub fn new(client: &'a dyn Fetch, settings: &SourceSettings) -> Self {
        let descriptor = settings.apply(descriptor());
        let rules = NormalizeRules {
            source_id: ID,
            base_url: descriptor.base_url(),
            status_table: &[],
            rating_scale: 1.0,
        };
        Self {
            client,
            descriptor,
            rules,
        }
    }

    fn get_text(&self, url: &str) -> Result<String, ScraperError> {
        let referer = self.descriptor.base_url();
        self.client.get_text(url, &[("Referer", referer.as_str())])
    }

    fn get_json(&self, url: &str) -> Result<Value, ScraperError> {
        let referer = self.descriptor.base_url();
        self.client.get_json(url, &[("Referer", referer.as_str())])
    }

    /// Work title as printed on the scan page, which is what the chapter endpoints are keyed by.
    fn scan_page_title(&self, scan_url: &str) -> Option<String> {
        match self.get_text(scan_url) {
            Ok(html) => work_title(&html),
            Err(e) => {
                log::debug!("{}: scan page {} unavailable: {}", ID, scan_url, e);
                None
            }
        }
    }

    fn chapters_from_script(&self, key: &str, title: &str) -> Result<Vec<ChapterRecord>, ScraperError> {
        let js = self.get_text(&episodes_url(&self.descriptor, key, title)?)?;
        episode_numbers(&js)
            .into_iter()
            .enumerate()
            .map(|(i, number)| -> Result<ChapterRecord, ScraperError> {
                let url = build_url(
                    &self.descriptor.base_url(),
                    &episodes_path(key),
                    &[("title", title.to_string()), ("id", (i + 1).to_string())],
                )?;
                Ok(chapter_record(number, relative_url(&self.descriptor.domain, &url)))
            })
            .collect()
    }

    fn chapters_from_counts(&self, key: &str, title: &str) -> Result<Vec<ChapterRecord>, ScraperError> {
        let json = self.get_json(&count_url(&self.descriptor, title)?)?;
        chapter_numbers(&json)
            .into_iter()
            .map(|number| -> Result<ChapterRecord, ScraperError> {
                let url = build_url(
                    &self.descriptor.base_url(),
                    &scan_path(key),
                    &[("oeuvre", title.to_string()), ("chapitre", number.to_string())],
                )?;
                Ok(chapter_record(number, relative_url(&self.descriptor.domain, &url)))
            })
            .collect()
    }
}

/// Straight quotes, the way the site's own search matches titles.
fn normalize_title(title: &str) -> String {
    title.replace('\u{2019}', "'")
}

pub(crate) fn list_url(
    descriptor: &SourceDescriptor,
    page: u32,
    query: &ListQuery,
) -> Result<String, ScraperError> {
    let search = query
        .search_text()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let mut params: Vec<(&str, String)> = vec![("search", search)];
    for tag in &query.tags {
        params.push(("genres[]", tag.clone()));
    }
    if page > 1 {
        params.push(("page", page.to_string()));
    }
    build_url(&descriptor.base_url(), "/catalogue", &params)
}

fn scan_path(key: &str) -> String {
    format!("{}/scan/vf/", key.trim_end_matches('/'))
}

fn episodes_path(key: &str) -> String {
    format!("{}episodes.js", scan_path(key))
}

pub(crate) fn episodes_url(
    descriptor: &SourceDescriptor,
    key: &str,
    title: &str,
) -> Result<String, ScraperError> {
    build_url(
        &descriptor.base_url(),
        &episodes_path(key),
        &[("title", title.to_string())],
    )
}

pub(crate) fn count_url(descriptor: &SourceDescriptor, title: &str) -> Result<String, ScraperError> {
    build_url(
        &descriptor.base_url(),
        COUNT_ENDPOINT,
        &[("oeuvre", title.to_string())],
    )
}

/// `<base>/s2/scans/<title>/<chapter>/<n>.jpg`
fn cdn_image_url(base_url: &str, title: &str, chapter: i64, n: u64) -> Result<String, ScraperError> {
    let invalid = |reason: &str| ScraperError::InvalidUrl {
        input: base_url.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    let chapter = chapter.to_string();
    let file = format!("{}.jpg", n);
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base"))?
        .pop_if_empty()
        .extend(["s2", "scans", title, chapter.as_str(), file.as_str()]);
    Ok(url.into())
}

fn parse_list(
    html: &str,
    domain: &str,
    rules: &NormalizeRules,
    url: &str,
) -> Result<Vec<CatalogEntry>, ScraperError> {
    let doc = Html::parse_document(html);
    let card_sel = selector("div.shrink-0.catalog-card.card-base")?;
    let link_sel = selector("a")?;
    let title_sel = selector("h2")?;
    let img_sel = selector("img")?;

    let mut entries = Vec::new();
    for card in doc.select(&card_sel) {
        let (Some(href), Some(title)) = (
            first_attr(card, &link_sel, &["href"]),
            first_text(card, &title_sel),
        ) else {
            log::debug!("{}: catalog card without link or title, skipped", ID);
            continue;
        };
        let raw = RawEntry {
            key: Some(relative_url(domain, href.trim_end_matches('/'))),
            title: Some(normalize_title(&title)),
            cover: first_attr(card, &img_sel, &["src", "data-src"]),
            ..RawEntry::default()
        };
        entries.push(normalize(raw, rules, url)?);
    }
    Ok(entries)
}

/// `#titreOeuvre` text, exactly as printed.
fn work_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("#titreOeuvre").ok()?;
    first_text(doc.root_element(), &sel)
}

fn parse_details(
    html: &str,
    entry: &CatalogEntry,
    base_url: &str,
) -> Result<CatalogEntry, ScraperError> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let title_sel = selector("#titreOeuvre")?;
    let cover_sel = selector("#coverOeuvre")?;
    let heading_sel = selector("#sousBlocMiddle > div h2")?;

    let mut detail = entry.clone();
    if let Some(title) = first_text(root, &title_sel) {
        detail.title = normalize_title(&title);
    }
    if let Some(cover) = first_attr(root, &cover_sel, &["src", "data-src"]) {
        detail.cover_url = Some(absolute_url(base_url, &cover));
    }
    for heading in doc.select(&heading_sel) {
        let label = text_of(heading);
        let Some(next) = next_element(heading) else {
            continue;
        };
        if label.contains("Synopsis") && next.value().name() == "p" {
            detail.description = Some(text_of(next)).filter(|d| !d.is_empty());
        } else if label.contains("Genres") && next.value().name() == "a" {
            detail.tags = text_of(next)
                .split(['-', ','])
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(|g| Tag::new(g, g))
                .collect();
        }
    }
    Ok(detail)
}

/// Distinct `epsN` numbers in an `episodes.js` body, ascending.
fn episode_numbers(js: &str) -> Vec<u32> {
    let mut numbers: Vec<u32> = Vec::new();
    for (at, _) in js.match_indices("eps") {
        let digits: String = js[at + 3..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(n) = digits.parse::<u32>() {
            numbers.push(n);
        }
    }
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// Numeric keys of the chapter count object, ascending.
fn chapter_numbers(json: &Value) -> Vec<u32> {
    let mut numbers: Vec<u32> = json
        .as_object()
        .map(|obj| obj.keys().filter_map(|k| k.trim().parse().ok()).collect())
        .unwrap_or_default();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

fn chapter_record(number: u32, url: String) -> ChapterRecord {
    ChapterRecord {
        key: url.clone(),
        ordinal: number as f32,
        name: format!("Chapitre {}", number),
        created_at: 0,
        scanlator: None,
        url,
    }
}

/// The work title a chapter URL carries in its `title` or `oeuvre` query parameter.
fn title_from_chapter_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let title = parsed
        .query_pairs()
        .find(|(k, _)| k == "title" || k == "oeuvre")
        .map(|(_, v)| v.into_owned());
    title.filter(|t| !t.is_empty())
}

fn page_count(json: &Value, chapter: i64) -> u64 {
    match json.get(chapter.to_string()) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_tags(html: &str) -> Result<Vec<Tag>, ScraperError> {
    let doc = Html::parse_document(html);
    let sel = selector("div#genreList span")?;
    let mut tags: Vec<Tag> = Vec::new();
    for title in doc.select(&sel).map(text_of).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t.key == title) {
            tags.push(Tag::new(title.clone(), title));
        }
    }
    Ok(tags)
}

impl Source for AnimeSamaSource<'_> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn tags(&self) -> Result<Vec<Tag>, ScraperError> {
        let url = build_url(&self.descriptor.base_url(), "/catalogue", &[])?;
        parse_tags(&self.get_text(&url)?)
    }

    fn list_page(
        &self,
        page: u32,
        query: &ListQuery,
    ) -> Result<PageBatch<CatalogEntry>, ScraperError> {
        let url = list_url(&self.descriptor, page, query)?;
        let html = self.get_text(&url)?;
        let entries = parse_list(&html, &self.descriptor.domain, &self.rules, &url)?;
        Ok(PageBatch::unpaged(entries))
    }

    fn details(&self, entry: &CatalogEntry) -> Result<CatalogEntry, ScraperError> {
        parse_details(
            &self.get_text(&entry.public_url)?,
            entry,
            &self.descriptor.base_url(),
        )
    }

    /// Chapters from `episodes.js` when the scan page names the work, otherwise from the count
    /// endpoint. Neither yielding anything is an empty list.
    fn chapters(&self, entry: &CatalogEntry) -> Result<Vec<ChapterRecord>, ScraperError> {
        let scan_url = build_url(&self.descriptor.base_url(), &scan_path(&entry.key), &[])?;
        let scan_title = self.scan_page_title(&scan_url);
        let api_title = scan_title
            .clone()
            .or_else(|| Some(entry.title.clone()).filter(|t| !t.is_empty()));
        let key = entry.key.as_str();

        Ok(FallbackChain::new("chapters")
            .then("episodes.js", || {
                let title = scan_title
                    .as_deref()
                    .ok_or_else(|| ScraperError::not_found("work title", &scan_url))?;
                self.chapters_from_script(key, title)
            })
            .then("chapter count endpoint", || {
                let title = api_title
                    .as_deref()
                    .ok_or_else(|| ScraperError::not_found("work title", &scan_url))?;
                self.chapters_from_counts(key, title)
            })
            .run())
    }

    fn pages(&self, chapter: &ChapterRecord) -> Result<Vec<PageRecord>, ScraperError> {
        let base_url = self.descriptor.base_url();
        let chapter_url = absolute_url(&base_url, &chapter.url);
        let title = title_from_chapter_url(&chapter_url).ok_or_else(|| ScraperError::InvalidUrl {
            input: chapter.url.clone(),
            reason: "no work title in chapter URL".to_string(),
        })?;
        let number = chapter.ordinal as i64;
        let count = page_count(&self.get_json(&count_url(&self.descriptor, &title)?)?, number);
        if count == 0 {
            return Err(ScraperError::not_found("chapter images", &chapter_url));
        }
        let urls = (1..=count)
            .map(|n| cdn_image_url(&base_url, &title, number, n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageRecord::from_urls(urls))
    }
}
