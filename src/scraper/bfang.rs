//! BFANG Team (moetruyen.net) adapter. Server-rendered HTML; the whole filtered catalog comes back
//! on one page. Chapter dates are Vietnamese relative phrases or `dd-mm-yyyy`.

use crate::model::{CatalogEntry, ChapterRecord, ContentRating, MangaStatus, PageRecord, Tag};
use crate::scraper::chapters::chapter_title;
use crate::scraper::client::Fetch;
use crate::scraper::dates::{self, VIETNAMESE};
use crate::scraper::dom::{all_text, attr_any, first_attr, selector, text_of};
use crate::scraper::embedded::{extract_array, inline_scripts, item_url};
use crate::scraper::error::ScraperError;
use crate::scraper::fallback::FallbackChain;
use crate::scraper::normalize::{absolute_url, normalize, relative_url, NormalizeRules, RawEntry};
use crate::scraper::paging::PageBatch;
use crate::scraper::{
    build_url, FilterCapabilities, ListQuery, SortOrder, Source, SourceDescriptor, SourceSettings,
};
use scraper::Html;

pub const ID: &str = "bfang";
const DOMAIN: &str = "moetruyen.net";
const ALT_TITLE_PREFIX: &str = "Tên khác:";
const ADULT_CHIP: &str = "Adult";

const STATUS_TABLE: &[(&str, MangaStatus)] = &[
    ("Hoàn thành", MangaStatus::Finished),
    ("Còn tiếp", MangaStatus::Ongoing),
    ("Tạm dừng", MangaStatus::Paused),
];

fn descriptor() -> SourceDescriptor {
    SourceDescriptor {
        id: ID,
        name: "BFANG Team",
        lang: "vi",
        domain: DOMAIN.to_string(),
        // Unpaged: the listing is a single page.
        page_size: 0,
        sort_orders: &[SortOrder::Updated],
        filters: FilterCapabilities {
            search: true,
            search_with_filters: true,
            multiple_tags: true,
            tags_exclusion: true,
            author_search: true,
        },
    }
}

pub struct BfangSource<'a> {
    client: &'a dyn Fetch,
    descriptor: SourceDescriptor,
    rules: NormalizeRules,
}

impl<'a> BfangSource<'a> {
    pub fn new(client: &'a dyn Fetch, settings: &SourceSettings) -> Self {
        let descriptor = settings.apply(descriptor());
        let rules = NormalizeRules {
            source_id: ID,
            base_url: descriptor.base_url(),
            status_table: STATUS_TABLE,
            rating_scale: 1.0,
        };
        Self {
            client,
            descriptor,
            rules,
        }
    }
}

pub(crate) fn list_url(descriptor: &SourceDescriptor, query: &ListQuery) -> Result<String, ScraperError> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(q) = query.search_text() {
        params.push(("q", q.split_whitespace().collect::<Vec<_>>().join(" ")));
    }
    for tag in &query.tags {
        params.push(("include", tag.clone()));
    }
    for tag in &query.exclude_tags {
        params.push(("exclude", tag.clone()));
    }
    if let Some(author) = query.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        params.push(("q", author.to_string()));
    }
    build_url(&descriptor.base_url(), "/manga", &params)
}

/// Catalog cards of a listing page.
fn parse_list(
    html: &str,
    domain: &str,
    rules: &NormalizeRules,
    url: &str,
) -> Result<Vec<CatalogEntry>, ScraperError> {
    let doc = Html::parse_document(html);
    let card_sel = selector("article.manga-card.reveal")?;
    let link_sel = selector("a")?;
    let title_sel = selector(".manga-body h3")?;
    let cover_sel = selector(".cover img")?;
    let status_sel = selector(".meta-row span.tag")?;

    doc.select(&card_sel)
        .map(|card| {
            let raw = RawEntry {
                key: first_attr(card, &link_sel, &["href"]).map(|h| relative_url(domain, &h)),
                title: Some(all_text(card, &title_sel)),
                cover: first_attr(card, &cover_sel, &["src", "data-src"]),
                status: Some(all_text(card, &status_sel)),
                ..RawEntry::default()
            };
            normalize(raw, rules, url)
        })
        .collect()
}

/// Detail page fields layered over `entry`.
fn parse_details(html: &str, entry: &CatalogEntry) -> Result<CatalogEntry, ScraperError> {
    let doc = Html::parse_document(html);
    let info_sel = selector(".detail-info.reveal")?;
    let title_sel = selector("h1")?;
    let author_sel = selector("p.manga-author a.inline-link")?;
    let note_sel = selector("p.note")?;
    let description_sel = selector(".manga-description p span")?;
    let chip_sel = selector(".chips a.chip")?;

    let mut detail = entry.clone();
    let Some(info) = doc.select(&info_sel).next() else {
        log::debug!("{}: no detail block for {}", ID, entry.key);
        return Ok(detail);
    };
    if let Some(title) = info.select(&title_sel).next().map(text_of).filter(|t| !t.is_empty()) {
        detail.title = title;
    }
    detail.authors = info
        .select(&author_sel)
        .map(text_of)
        .filter(|a| !a.is_empty())
        .collect();
    detail.alt_titles = info
        .select(&note_sel)
        .map(text_of)
        .filter_map(|note| {
            let alt = match note.split_once(ALT_TITLE_PREFIX) {
                Some((_, rest)) => rest.trim().to_string(),
                None => note,
            };
            Some(alt).filter(|a| !a.is_empty())
        })
        .collect();
    let description = all_text(info, &description_sel);
    if !description.is_empty() {
        detail.description = Some(description);
    }
    let chips: Vec<String> = info
        .select(&chip_sel)
        .map(text_of)
        .filter(|c| !c.is_empty())
        .collect();
    if chips.iter().any(|c| c == ADULT_CHIP) {
        detail.content_rating = ContentRating::Adult;
    }
    detail.tags = chips.into_iter().map(|c| Tag::new(c.clone(), c)).collect();
    Ok(detail)
}

/// Chapter list, oldest first. The site lists newest first; a chapter without a readable
/// `Ch. N` number takes its position as ordinal.
fn parse_chapters(html: &str, domain: &str, now_ms: i64) -> Result<Vec<ChapterRecord>, ScraperError> {
    let doc = Html::parse_document(html);
    let item_sel = selector("li.chapter")?;
    let link_sel = selector("a")?;
    let num_sel = selector("a .chapter-main .chapter-title-row span.chapter-num")?;
    let title_sel = selector("a .chapter-main .chapter-title-row span.chapter-title")?;
    let group_sel = selector("span.chapter-sub-text")?;
    let time_sel = selector("span.chapter-time")?;

    let items: Vec<_> = doc.select(&item_sel).collect();
    let mut records = Vec::with_capacity(items.len());
    for (position, li) in items.into_iter().rev().enumerate() {
        let Some(href) = first_attr(li, &link_sel, &["href"]) else {
            log::warn!("{}: chapter item without link, skipped", ID);
            continue;
        };
        let number = all_text(li, &num_sel);
        let ordinal = number
            .trim()
            .strip_prefix("Ch.")
            .and_then(|n| n.trim().parse::<f32>().ok())
            .filter(|n| n.is_finite())
            .unwrap_or((position + 1) as f32);
        let name = all_text(li, &title_sel);
        let scanlator = Some(all_text(li, &group_sel)).filter(|s| !s.is_empty());
        let created_at = dates::resolve(&all_text(li, &time_sel), now_ms, &VIETNAMESE);
        let url = relative_url(domain, &href);
        records.push(ChapterRecord {
            key: url.clone(),
            ordinal,
            name: if name.is_empty() {
                chapter_title(ordinal, None)
            } else {
                name
            },
            created_at,
            scanlator,
            url,
        });
    }
    Ok(records)
}

/// Page images: reader `<img>` cards first, then an `images` array in the page scripts.
fn parse_pages(html: &str, base_url: &str, url: &str) -> Result<Vec<PageRecord>, ScraperError> {
    let doc = Html::parse_document(html);
    let urls: Vec<String> = FallbackChain::new("chapter images")
        .then("page cards", || {
            let img_sel = selector(".page-card img")?;
            Ok(doc
                .select(&img_sel)
                .filter_map(|img| attr_any(img, &["src", "data-src"]))
                .map(|src| absolute_url(base_url, &src))
                .collect())
        })
        .then("embedded images", || {
            let scripts = inline_scripts(&doc);
            Ok(extract_array(&scripts, "images", url)?
                .iter()
                .filter_map(item_url)
                .map(|src| absolute_url(base_url, &src))
                .collect())
        })
        .run_or_not_found(url)?;
    Ok(PageRecord::from_urls(urls))
}

fn parse_tags(html: &str) -> Result<Vec<Tag>, ScraperError> {
    let doc = Html::parse_document(html);
    let name_sel = selector(".filter-options button span.filter-name")?;
    let mut tags: Vec<Tag> = Vec::new();
    for title in doc.select(&name_sel).map(text_of).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t.title == title) {
            tags.push(Tag::new(title.clone(), title));
        }
    }
    Ok(tags)
}

impl Source for BfangSource<'_> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn tags(&self) -> Result<Vec<Tag>, ScraperError> {
        let url = build_url(&self.descriptor.base_url(), "/manga", &[])?;
        parse_tags(&self.client.get_text(&url, &[])?)
    }

    fn list_page(
        &self,
        page: u32,
        query: &ListQuery,
    ) -> Result<PageBatch<CatalogEntry>, ScraperError> {
        if page > 1 {
            return Ok(PageBatch::unpaged(Vec::new()));
        }
        let url = list_url(&self.descriptor, query)?;
        let html = self.client.get_text(&url, &[])?;
        let entries = parse_list(&html, &self.descriptor.domain, &self.rules, &url)?;
        Ok(PageBatch::unpaged(entries))
    }

    fn details(&self, entry: &CatalogEntry) -> Result<CatalogEntry, ScraperError> {
        let url = build_url(&self.descriptor.base_url(), &entry.key, &[])?;
        parse_details(&self.client.get_text(&url, &[])?, entry)
    }

    fn chapters(&self, entry: &CatalogEntry) -> Result<Vec<ChapterRecord>, ScraperError> {
        let url = build_url(&self.descriptor.base_url(), &entry.key, &[])?;
        let html = self.client.get_text(&url, &[])?;
        parse_chapters(
            &html,
            &self.descriptor.domain,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    fn pages(&self, chapter: &ChapterRecord) -> Result<Vec<PageRecord>, ScraperError> {
        let base_url = self.descriptor.base_url();
        let url = build_url(&base_url, &chapter.url, &[])?;
        parse_pages(&self.client.get_text(&url, &[])?, &base_url, &url)
    }
}
