//! Sequential pagination as a fold.
//!
//! State is the accumulated entries plus the next cursor; each fetched page yields a new state and
//! a continue/stop decision. Pages are fetched one at a time because each decision depends on the
//! previous page.

use crate::scraper::error::ScraperError;

/// Pagination metadata some APIs return alongside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u32,
    pub last_page: u32,
}

impl Pagination {
    /// Read `{"current_page": n, "last_page": m}` from a JSON object. None if either is missing.
    pub fn from_json(value: &serde_json::Value) -> Option<Pagination> {
        let read = |field: &str| {
            value
                .get(field)
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };
        Some(Pagination {
            current_page: read("current_page")?,
            last_page: read("last_page")?,
        })
    }

    pub fn is_last(&self) -> bool {
        self.current_page >= self.last_page
    }
}

/// One fetched page: its items and, if the source reports it, where it sits in the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBatch<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

impl<T> PageBatch<T> {
    pub fn new(items: Vec<T>, pagination: Option<Pagination>) -> Self {
        Self { items, pagination }
    }

    /// A page from a source that reports no pagination metadata.
    pub fn unpaged(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Fold state: everything collected so far and the cursor of the next page to fetch.
#[derive(Debug)]
pub struct Accumulator<T> {
    pub entries: Vec<T>,
    pub next_cursor: u32,
}

impl<T> Accumulator<T> {
    pub fn new(start: u32) -> Self {
        Self {
            entries: Vec::new(),
            next_cursor: start,
        }
    }

    /// Absorb one page. Stops on an empty page or when the page says it is the last one;
    /// otherwise advances the cursor by one.
    pub fn step(mut self, batch: PageBatch<T>) -> (Self, Step) {
        if batch.items.is_empty() {
            return (self, Step::Stop);
        }
        self.entries.extend(batch.items);
        if batch.pagination.is_some_and(|p| p.is_last()) {
            return (self, Step::Stop);
        }
        self.next_cursor += 1;
        (self, Step::Continue)
    }
}

/// Fetch pages from `start` until the listing ends and return every entry.
///
/// `fetch_page` is called with successive cursors. The first error aborts the whole listing; no
/// partial result is returned. `max_pages`, when set, bounds the number of requests: reaching it
/// without the listing ending is [ScraperError::PageLimitExceeded].
pub fn collect_pages<T, F>(
    start: u32,
    max_pages: Option<u32>,
    mut fetch_page: F,
) -> Result<Vec<T>, ScraperError>
where
    F: FnMut(u32) -> Result<PageBatch<T>, ScraperError>,
{
    let mut state = Accumulator::new(start);
    let mut fetched = 0u32;
    loop {
        if let Some(limit) = max_pages {
            if fetched >= limit {
                return Err(ScraperError::PageLimitExceeded { pages: fetched });
            }
        }
        let cursor = state.next_cursor;
        let batch = fetch_page(cursor)?;
        fetched += 1;
        log::debug!(
            "page {}: {} items ({} so far)",
            cursor,
            batch.items.len(),
            state.entries.len() + batch.items.len()
        );
        let (next, step) = state.step(batch);
        state = next;
        if step == Step::Stop {
            return Ok(state.entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::error::ErrorKind;
    use serde_json::json;

    fn page(count: usize, pagination: Option<(u32, u32)>) -> PageBatch<usize> {
        PageBatch::new(
            (0..count).collect(),
            pagination.map(|(current_page, last_page)| Pagination {
                current_page,
                last_page,
            }),
        )
    }

    #[test]
    fn stops_on_last_page_metadata() -> Result<(), ScraperError> {
        let mut requests = Vec::new();
        let all = collect_pages(1, None, |cursor| {
            requests.push(cursor);
            Ok(match cursor {
                1 => page(100, Some((1, 2))),
                2 => page(37, Some((2, 2))),
                _ => page(5, None),
            })
        })?;
        assert_eq!(all.len(), 137);
        assert_eq!(requests, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn without_metadata_an_empty_page_ends_the_listing() -> Result<(), ScraperError> {
        let mut requests = 0;
        let all = collect_pages(1, None, |cursor| {
            requests += 1;
            Ok(if cursor <= 3 { page(10, None) } else { page(0, None) })
        })?;
        assert_eq!(all.len(), 30);
        assert_eq!(requests, 4);
        Ok(())
    }

    #[test]
    fn empty_first_page_is_an_empty_listing() -> Result<(), ScraperError> {
        let all = collect_pages(1, None, |_| Ok(page(0, Some((1, 5)))))?;
        assert!(all.is_empty());
        Ok(())
    }

    #[test]
    fn an_error_on_any_page_aborts_the_listing() {
        let result = collect_pages(1, None, |cursor| {
            if cursor == 2 {
                Err(ScraperError::HttpStatus {
                    status: 502,
                    url: "https://x/list?page=2".into(),
                    context: None,
                })
            } else {
                Ok(page(10, None))
            }
        });
        match result {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Transport),
            Ok(entries) => panic!("expected abort, got {} entries", entries.len()),
        }
    }

    #[test]
    fn cursor_starts_where_asked() -> Result<(), ScraperError> {
        let mut requests = Vec::new();
        collect_pages(3, None, |cursor| {
            requests.push(cursor);
            Ok(if cursor == 3 { page(1, None) } else { page(0, None) })
        })?;
        assert_eq!(requests, vec![3, 4]);
        Ok(())
    }

    #[test]
    fn page_limit_is_an_error_not_a_truncation() {
        let result = collect_pages(1, Some(3), |_| Ok(page(1, None)));
        match result {
            Err(ScraperError::PageLimitExceeded { pages }) => assert_eq!(pages, 3),
            other => panic!("expected page limit error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn pagination_from_json() {
        let v = json!({"current_page": 2, "last_page": 7, "total": 190});
        assert_eq!(
            Pagination::from_json(&v),
            Some(Pagination {
                current_page: 2,
                last_page: 7
            })
        );
        assert_eq!(Pagination::from_json(&json!({"current_page": 2})), None);
    }

    #[test]
    fn step_is_a_pure_transition() {
        let (state, step) = Accumulator::new(1).step(page(2, Some((1, 3))));
        assert_eq!(step, Step::Continue);
        assert_eq!(state.next_cursor, 2);
        let (state, step) = state.step(page(2, Some((3, 3))));
        assert_eq!(step, Step::Stop);
        assert_eq!(state.entries.len(), 4);
        assert_eq!(state.next_cursor, 2);
    }
}
