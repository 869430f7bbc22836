//! Comix adapter. Catalog, details and chapters come from the site's JSON API; page images are
//! only present in the chapter HTML, inlined in a streamed script payload.

use crate::model::{CatalogEntry, ChapterRecord, MangaStatus, PageRecord, Tag};
use crate::scraper::chapters::chapter_title;
use crate::scraper::client::Fetch;
use crate::scraper::embedded::{extract_array, inline_scripts, item_url};
use crate::scraper::error::ScraperError;
use crate::scraper::normalize::{normalize, JsonFieldMap, NormalizeRules, RawEntry};
use crate::scraper::paging::{collect_pages, PageBatch, Pagination};
use crate::scraper::{
    build_url, FilterCapabilities, ListQuery, SortOrder, Source, SourceDescriptor, SourceSettings,
};
use serde_json::Value;

pub const ID: &str = "comix";
const DOMAIN: &str = "comix.to";
const PAGE_SIZE: u32 = 28;
const CHAPTERS_PER_REQUEST: u32 = 100;

/// Adult genres left out of every listing (sent as negative genre ids).
const EXCLUDED_GENRES: [&str; 4] = ["87264", "87266", "87268", "87265"];

const STATUS_TABLE: &[(&str, MangaStatus)] = &[
    ("finished", MangaStatus::Finished),
    ("releasing", MangaStatus::Ongoing),
    ("on_hiatus", MangaStatus::Paused),
];

const FIELDS: JsonFieldMap = JsonFieldMap {
    handle: "/hash_id",
    key_template: "/title/{}",
    title: "/title",
    cover: "/poster/large",
    status: "/status",
    rating: "/rated_avg",
    description: "/synopsis",
};

/// Genre and theme ids accepted by `genres[]`.
const GENRES: &[(&str, &str)] = &[
    ("Action", "6"),
    ("Adult", "87264"),
    ("Adventure", "7"),
    ("Boys Love", "8"),
    ("Comedy", "9"),
    ("Crime", "10"),
    ("Drama", "11"),
    ("Ecchi", "87265"),
    ("Fantasy", "12"),
    ("Girls Love", "13"),
    ("Hentai", "87266"),
    ("Historical", "14"),
    ("Horror", "15"),
    ("Isekai", "16"),
    ("Magical Girls", "17"),
    ("Mature", "87267"),
    ("Mecha", "18"),
    ("Medical", "19"),
    ("Mystery", "20"),
    ("Philosophical", "21"),
    ("Psychological", "22"),
    ("Romance", "23"),
    ("Sci-Fi", "24"),
    ("Slice of Life", "25"),
    ("Smut", "87268"),
    ("Sports", "26"),
    ("Superhero", "27"),
    ("Thriller", "28"),
    ("Tragedy", "29"),
    ("Wuxia", "30"),
    ("Aliens", "31"),
    ("Animals", "32"),
    ("Cooking", "33"),
    ("Crossdressing", "34"),
    ("Delinquents", "35"),
    ("Demons", "36"),
    ("Genderswap", "37"),
    ("Ghosts", "38"),
    ("Gyaru", "39"),
    ("Harem", "40"),
    ("Incest", "41"),
    ("Loli", "42"),
    ("Mafia", "43"),
    ("Magic", "44"),
    ("Martial Arts", "45"),
    ("Military", "46"),
    ("Monster Girls", "47"),
    ("Monsters", "48"),
    ("Music", "49"),
    ("Ninja", "50"),
    ("Office Workers", "51"),
    ("Police", "52"),
    ("Post-Apocalyptic", "53"),
    ("Reincarnation", "54"),
    ("Reverse Harem", "55"),
    ("Samurai", "56"),
    ("School Life", "57"),
    ("Shota", "58"),
    ("Supernatural", "59"),
    ("Survival", "60"),
    ("Time Travel", "61"),
    ("Traditional Games", "62"),
    ("Vampires", "63"),
    ("Video Games", "64"),
    ("Villainess", "65"),
    ("Virtual Reality", "66"),
    ("Zombies", "67"),
];

fn descriptor() -> SourceDescriptor {
    SourceDescriptor {
        id: ID,
        name: "Comix",
        lang: "en",
        domain: DOMAIN.to_string(),
        page_size: PAGE_SIZE,
        sort_orders: &[
            SortOrder::Updated,
            SortOrder::Relevance,
            SortOrder::Popularity,
            SortOrder::Newest,
            SortOrder::Alphabetical,
        ],
        filters: FilterCapabilities {
            search: true,
            search_with_filters: true,
            multiple_tags: true,
            tags_exclusion: true,
            author_search: false,
        },
    }
}

/// Comix source. Holds a reference to the shared fetcher.
pub struct ComixSource<'a> {
    client: &'a dyn Fetch,
    descriptor: SourceDescriptor,
    rules: NormalizeRules,
    max_pages: Option<u32>,
}

impl<'a> ComixSource<'a> {
    pub fn new(client: &'a dyn Fetch, settings: &SourceSettings) -> Self {
        let descriptor = settings.apply(descriptor());
        let rules = NormalizeRules {
            source_id: ID,
            base_url: descriptor.base_url(),
            status_table: STATUS_TABLE,
            rating_scale: 10.0,
        };
        Self {
            client,
            descriptor,
            rules,
            max_pages: settings.max_pages,
        }
    }
}

fn order_param(order: SortOrder) -> (&'static str, &'static str) {
    match order {
        SortOrder::Relevance => ("order[relevance]", "desc"),
        SortOrder::Updated => ("order[chapter_updated_at]", "desc"),
        SortOrder::Popularity => ("order[views_30d]", "desc"),
        SortOrder::Newest => ("order[created_at]", "desc"),
        SortOrder::Alphabetical => ("order[title]", "asc"),
    }
}

/// Catalog API URL for one page of `query`.
pub(crate) fn list_url(
    descriptor: &SourceDescriptor,
    page: u32,
    query: &ListQuery,
) -> Result<String, ScraperError> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(q) = query.search_text() {
        params.push(("keyword", q.to_string()));
    }
    let order = query
        .order
        .or(descriptor.default_order())
        .unwrap_or(SortOrder::Updated);
    let (key, direction) = order_param(order);
    params.push((key, direction.to_string()));
    for tag in &query.tags {
        params.push(("genres[]", tag.clone()));
    }
    let mut excluded: Vec<&str> = EXCLUDED_GENRES.to_vec();
    for tag in &query.exclude_tags {
        if !excluded.contains(&tag.as_str()) {
            excluded.push(tag.as_str());
        }
    }
    for genre in excluded {
        params.push(("genres[]", format!("-{}", genre)));
    }
    params.push(("limit", descriptor.page_size.to_string()));
    params.push(("page", page.to_string()));
    build_url(&descriptor.base_url(), "/api/v2/manga", &params)
}

pub(crate) fn details_url(descriptor: &SourceDescriptor, hash: &str) -> Result<String, ScraperError> {
    build_url(&descriptor.base_url(), &format!("/api/v2/manga/{}", hash), &[])
}

pub(crate) fn chapters_url(
    descriptor: &SourceDescriptor,
    hash: &str,
    page: u32,
) -> Result<String, ScraperError> {
    build_url(
        &descriptor.base_url(),
        &format!("/api/v2/manga/{}/chapters", hash),
        &[
            ("order[number]", "desc".to_string()),
            ("limit", CHAPTERS_PER_REQUEST.to_string()),
            ("page", page.to_string()),
        ],
    )
}

/// `/title/<hash>` (or a longer path below it) to `<hash>`.
fn hash_id(key: &str) -> Result<&str, ScraperError> {
    key.trim_start_matches('/')
        .strip_prefix("title/")
        .and_then(|rest| rest.split('/').next())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ScraperError::InvalidUrl {
            input: key.to_string(),
            reason: "expected a /title/<id> key".to_string(),
        })
}

/// `result.items` plus `result.pagination` of an API page.
fn result_items<'v>(
    json: &'v Value,
    url: &str,
) -> Result<(&'v Vec<Value>, Option<Pagination>), ScraperError> {
    let result = json
        .get("result")
        .ok_or_else(|| ScraperError::malformed(url, "missing \"result\""))?;
    let items = result
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ScraperError::malformed(url, "missing \"result.items\" array"))?;
    let pagination = result.get("pagination").and_then(Pagination::from_json);
    Ok((items, pagination))
}

/// Adult genres are always excluded from requests, so every record is safe.
fn raw_entry(item: &Value) -> RawEntry {
    RawEntry {
        adult: Some(false),
        ..RawEntry::from_json(item, &FIELDS)
    }
}

fn parse_list(
    json: &Value,
    rules: &NormalizeRules,
    url: &str,
) -> Result<PageBatch<CatalogEntry>, ScraperError> {
    let (items, pagination) = result_items(json, url)?;
    let entries = items
        .iter()
        .map(|item| normalize(raw_entry(item), rules, url))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageBatch::new(entries, pagination))
}

fn parse_chapters(json: &Value, hash: &str, url: &str) -> Result<PageBatch<ChapterRecord>, ScraperError> {
    let (items, pagination) = result_items(json, url)?;
    let records = items
        .iter()
        .map(|item| parse_chapter(item, hash, url))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageBatch::new(records, pagination))
}

fn parse_chapter(item: &Value, hash: &str, url: &str) -> Result<ChapterRecord, ScraperError> {
    let chapter_id = match item.get("chapter_id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(ScraperError::malformed(url, "chapter without chapter_id")),
    };
    let number = item
        .get("number")
        .and_then(|n| n.as_f64().or_else(|| n.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| {
            ScraperError::malformed(url, format!("chapter {} has no number", chapter_id))
        })?;
    let ordinal = number as f32;
    let name = item.get("name").and_then(Value::as_str);
    let created_at = item
        .get("created_at")
        .and_then(Value::as_i64)
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(0);
    let scanlator = item
        .pointer("/scanlation_group/name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let chapter_url = format!("/title/{}/{}-chapter-{}", hash, chapter_id, ordinal as i64);
    Ok(ChapterRecord {
        key: chapter_url.clone(),
        ordinal,
        name: chapter_title(ordinal, name),
        created_at,
        scanlator,
        url: chapter_url,
    })
}

/// Image URLs from the `images` array inlined in the chapter page scripts.
fn parse_page_images(html: &str, url: &str) -> Result<Vec<String>, ScraperError> {
    let doc = scraper::Html::parse_document(html);
    let scripts = inline_scripts(&doc);
    let urls: Vec<String> = extract_array(&scripts, "images", url)?
        .iter()
        .filter_map(item_url)
        .collect();
    if urls.is_empty() {
        return Err(ScraperError::not_found("chapter images", url));
    }
    Ok(urls)
}

impl Source for ComixSource<'_> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn tags(&self) -> Result<Vec<Tag>, ScraperError> {
        Ok(GENRES
            .iter()
            .map(|(title, key)| Tag::new(*title, *key))
            .collect())
    }

    fn list_page(
        &self,
        page: u32,
        query: &ListQuery,
    ) -> Result<PageBatch<CatalogEntry>, ScraperError> {
        let url = list_url(&self.descriptor, page, query)?;
        let json = self.client.get_json(&url, &[])?;
        parse_list(&json, &self.rules, &url)
    }

    fn details(&self, entry: &CatalogEntry) -> Result<CatalogEntry, ScraperError> {
        let url = details_url(&self.descriptor, hash_id(&entry.key)?)?;
        let json = self.client.get_json(&url, &[])?;
        match json.get("result").filter(|r| r.is_object()) {
            Some(result) => normalize(raw_entry(result), &self.rules, &url),
            None => {
                log::debug!("{}: no detail record at {}, keeping list entry", ID, url);
                Ok(entry.clone())
            }
        }
    }

    fn chapters(&self, entry: &CatalogEntry) -> Result<Vec<ChapterRecord>, ScraperError> {
        let hash = hash_id(&entry.key)?;
        collect_pages(1, self.max_pages, |page| {
            let url = chapters_url(&self.descriptor, hash, page)?;
            let json = self.client.get_json(&url, &[])?;
            parse_chapters(&json, hash, &url)
        })
    }

    fn pages(&self, chapter: &ChapterRecord) -> Result<Vec<PageRecord>, ScraperError> {
        let url = build_url(&self.descriptor.base_url(), &chapter.url, &[])?;
        let html = self.client.get_text(&url, &[])?;
        Ok(PageRecord::from_urls(parse_page_images(&html, &url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::client::stub::StubFetch;
    use crate::scraper::error::ErrorKind;
    use crate::model::ContentRating;
    use crate::scraper::{entry_for_key, fetch_details, list_all};
    use serde_json::json;

    fn item(hash: &str, title: &str) -> Value {
        json!({
            "hash_id": hash,
            "title": title,
            "poster": {"large": format!("https://static.comix.to/{}.webp", hash)},
            "status": "releasing",
            "rated_avg": 8.4,
            "synopsis": "Synopsis."
        })
    }

    fn list_body(items: Vec<Value>, current: u32, last: u32) -> String {
        json!({"result": {"items": items, "pagination": {"current_page": current, "last_page": last}}})
            .to_string()
    }

    fn chapter(id: u64, number: f64, created_at: i64, group: &str) -> Value {
        json!({
            "chapter_id": id,
            "number": number,
            "name": "",
            "created_at": created_at,
            "scanlation_group": {"name": group}
        })
    }

    #[test]
    fn list_url_carries_order_filters_and_exclusions() -> Result<(), ScraperError> {
        let query = ListQuery {
            query: Some("solo".into()),
            tags: vec!["6".into()],
            exclude_tags: vec!["87264".into(), "15".into()],
            order: Some(SortOrder::Popularity),
            ..ListQuery::default()
        };
        let url = list_url(&descriptor(), 3, &query)?;
        assert!(url.starts_with("https://comix.to/api/v2/manga?keyword=solo&"));
        assert!(url.contains("order%5Bviews_30d%5D=desc"));
        assert!(url.contains("genres%5B%5D=6&"));
        assert_eq!(url.matches("genres%5B%5D=-87264").count(), 1);
        assert!(url.contains("genres%5B%5D=-15"));
        assert!(url.ends_with("limit=28&page=3"));
        Ok(())
    }

    #[test]
    fn default_order_is_recently_updated() -> Result<(), ScraperError> {
        let url = list_url(&descriptor(), 1, &ListQuery::default())?;
        assert!(url.contains("order%5Bchapter_updated_at%5D=desc"));
        assert!(!url.contains("keyword"));
        Ok(())
    }

    #[test]
    fn listing_follows_pagination_metadata() -> Result<(), ScraperError> {
        let d = descriptor();
        let q = ListQuery::default();
        let fetch = StubFetch::new()
            .with(
                &list_url(&d, 1, &q)?,
                list_body(vec![item("a1", "First"), item("b2", "Second")], 1, 2),
            )
            .with(&list_url(&d, 2, &q)?, list_body(vec![item("c3", "Third")], 2, 2));
        let source = ComixSource::new(&fetch, &SourceSettings::default());
        let all = list_all(&source, &q, None, None)?;
        assert_eq!(all.len(), 3);
        assert_eq!(fetch.request_count(), 2);
        assert_eq!(all[0].key, "/title/a1");
        assert_eq!(all[0].public_url, "https://comix.to/title/a1");
        assert_eq!(all[0].status, MangaStatus::Ongoing);
        assert!((all[0].rating.unwrap_or(0.0) - 0.84).abs() < 1e-6);
        assert_eq!(all[0].content_rating, ContentRating::Safe);
        Ok(())
    }

    #[test]
    fn missing_items_array_is_malformed() -> Result<(), ScraperError> {
        let d = descriptor();
        let q = ListQuery::default();
        let fetch = StubFetch::new().with(&list_url(&d, 1, &q)?, r#"{"result": {}}"#);
        let source = ComixSource::new(&fetch, &SourceSettings::default());
        let err = source.list_page(1, &q).expect_err("no items");
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        Ok(())
    }

    #[test]
    fn details_and_chapters_merge_with_one_release_per_number() -> Result<(), ScraperError> {
        let d = descriptor();
        let page1 = json!({"result": {
            "items": [chapter(30, 3.0, 300, "late"), chapter(31, 3.0, 100, "early"), chapter(20, 2.0, 50, "x")],
            "pagination": {"current_page": 1, "last_page": 2}
        }});
        let page2 = json!({"result": {
            "items": [chapter(10, 1.0, 10, "x"), chapter(15, 1.5, 20, "x")],
            "pagination": {"current_page": 2, "last_page": 2}
        }});
        let detail = json!({"result": {
            "hash_id": "a1", "title": "First (detail)", "status": "finished",
            "poster": {"large": "https://static.comix.to/a1.webp"}, "synopsis": "Longer synopsis."
        }});
        let fetch = StubFetch::new()
            .with(&details_url(&d, "a1")?, detail.to_string())
            .with(&chapters_url(&d, "a1", 1)?, page1.to_string())
            .with(&chapters_url(&d, "a1", 2)?, page2.to_string());
        let source = ComixSource::new(&fetch, &SourceSettings::default());
        let entry = parse_list(
            &json!({"result": {"items": [item("a1", "First")]}}),
            &source.rules,
            "https://comix.to/api/v2/manga",
        )?
        .items
        .remove(0);

        let details = fetch_details(&source, &entry)?;
        assert_eq!(details.entry.title, "First (detail)");
        assert_eq!(details.entry.status, MangaStatus::Finished);
        let ordinals: Vec<f32> = details.chapters.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![1.0, 1.5, 2.0, 3.0]);
        let third = &details.chapters[3];
        assert_eq!(third.scanlator.as_deref(), Some("late"));
        assert_eq!(third.created_at, 300_000);
        assert_eq!(third.url, "/title/a1/30-chapter-3");
        assert_eq!(details.chapters[1].name, "Chapter 1.5");
        Ok(())
    }

    #[test]
    fn chapter_walk_honors_the_page_limit() -> Result<(), ScraperError> {
        let d = descriptor();
        let page = |n: u32| {
            json!({"result": {
                "items": [chapter(u64::from(n), f64::from(n), 10, "x")],
                "pagination": {"current_page": n, "last_page": 4}
            }})
            .to_string()
        };
        let mut fetch = StubFetch::new();
        for n in 1..=4 {
            fetch = fetch.with(&chapters_url(&d, "a1", n)?, page(n));
        }
        let settings = SourceSettings {
            max_pages: Some(1),
            ..SourceSettings::default()
        };
        let source = ComixSource::new(&fetch, &settings);
        let entry = entry_for_key(&source, "/title/a1");
        match source.chapters(&entry) {
            Err(ScraperError::PageLimitExceeded { pages }) => assert_eq!(pages, 1),
            Err(e) => panic!("unexpected error {}", e),
            Ok(chapters) => panic!("limit ignored, got {} chapters", chapters.len()),
        };
        assert_eq!(fetch.request_count(), 1);

        let unbounded = ComixSource::new(&fetch, &SourceSettings::default());
        assert_eq!(unbounded.chapters(&entry)?.len(), 4);
        Ok(())
    }

    #[test]
    fn details_without_result_keep_the_list_entry() -> Result<(), ScraperError> {
        let d = descriptor();
        let fetch = StubFetch::new().with(&details_url(&d, "a1")?, r#"{"status": 404}"#);
        let source = ComixSource::new(&fetch, &SourceSettings::default());
        let entry = normalize(raw_entry(&item("a1", "First")), &source.rules, "x")?;
        assert_eq!(source.details(&entry)?, entry);
        Ok(())
    }

    #[test]
    fn pages_come_from_the_streamed_script_payload() -> Result<(), ScraperError> {
        let html = r#"<html><body><script>self.__next_f.push([1,"{\"chapter\":{\"images\":[{\"url\":\"https://img.comix.to/1.webp\"},{\"url\":\"https://img.comix.to/2.webp\"}]}}"])</script></body></html>"#;
        let chapter = ChapterRecord {
            key: "/title/a1/30-chapter-3".into(),
            ordinal: 3.0,
            name: "Chapter 3".into(),
            created_at: 0,
            scanlator: None,
            url: "/title/a1/30-chapter-3".into(),
        };
        let fetch = StubFetch::new().with("https://comix.to/title/a1/30-chapter-3", html);
        let source = ComixSource::new(&fetch, &SourceSettings::default());
        let pages = source.pages(&chapter)?;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 0);
        assert_eq!(pages[1].url, "https://img.comix.to/2.webp");
        Ok(())
    }

    #[test]
    fn chapter_page_without_images_is_content_not_found() {
        let err = parse_page_images("<html><script>var x = 1;</script></html>", "https://comix.to/x")
            .expect_err("no images");
        assert_eq!(err.kind(), ErrorKind::ExtractionFailure);
    }

    #[test]
    fn keys_must_be_title_paths() {
        assert_eq!(hash_id("/title/a1").ok(), Some("a1"));
        assert_eq!(hash_id("/title/a1/30-chapter-3").ok(), Some("a1"));
        assert!(hash_id("/manga/a1").is_err());
    }
}
