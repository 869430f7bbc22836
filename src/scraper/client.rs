//! HTTP collaborator. [Fetch] is the seam the engine and adapters read through; [PoliteClient] is
//! the blocking implementation with a politeness delay between requests and optional retries.

use crate::scraper::error::ScraperError;
use scraper::Html;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; mangascrape/0.1; +https://github.com/mangascrape)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_MILLIS: u64 = 500;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for a GET (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Text fetcher used by every source. Implementations own retries, caching and rate limiting.
///
/// `Sync` so one fetcher can serve both branches of a details/chapters fork.
pub trait Fetch: Sync {
    /// GET `url` with extra request headers and return the body as text.
    /// Non-success statuses are errors.
    fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ScraperError>;

    /// GET and parse the body as JSON.
    fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, ScraperError> {
        let body = self.get_text(url, headers)?;
        serde_json::from_str(&body).map_err(|e| ScraperError::malformed(url, e.to_string()))
    }

    /// GET and parse the body as an HTML document.
    fn get_document(&self, url: &str, headers: &[(&str, &str)]) -> Result<Html, ScraperError> {
        let body = self.get_text(url, headers)?;
        Ok(Html::parse_document(&body))
    }
}

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent, delay, timeout and retries.
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Perform a GET request with retries for transient failures.
    ///
    /// Retries on timeout, connection errors, HTTP 5xx and HTTP 429. Other statuses are returned
    /// to the caller as-is.
    fn send_with_retry(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let max_attempts = self.retry_count.max(1);
        let mut attempt = 0;
        loop {
            self.wait_delay();
            let mut request = self.inner.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let result = request.send();
            self.mark_request();
            let last_attempt = attempt + 1 >= max_attempts;
            match result {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if !retryable || last_attempt {
                        return Ok(response);
                    }
                    let backoff = if status.as_u16() == 429 {
                        backoff_at(&BACKOFF_429_SECS, attempt)
                    } else {
                        backoff_at(&self.backoff_secs, attempt)
                    };
                    log::debug!("HTTP {} from {}, retrying in {}s", status, url, backoff);
                    std::thread::sleep(Duration::from_secs(backoff));
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if !retryable || last_attempt {
                        return Err(e);
                    }
                    let backoff = backoff_at(&self.backoff_secs, attempt);
                    log::debug!("{} failed ({}), retrying in {}s", url, e, backoff);
                    std::thread::sleep(Duration::from_secs(backoff));
                }
            }
            attempt += 1;
        }
    }

    fn wait_delay(&self) {
        let last = match self.last_request.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }

    fn mark_request(&self) {
        match self.last_request.lock() {
            Ok(mut guard) => *guard = Some(Instant::now()),
            Err(poisoned) => *poisoned.into_inner() = Some(Instant::now()),
        }
    }
}

fn backoff_at(table: &[u64], attempt: u32) -> u64 {
    table
        .get(attempt as usize)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(1)
}

impl Fetch for PoliteClient {
    fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ScraperError> {
        log::debug!("GET {}", url);
        let response = self
            .send_with_retry(url, headers)
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                context: None,
            });
        }
        response.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_millis: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_millis: DEFAULT_DELAY_MILLIS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a crate-identifying default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in milliseconds. Default 500.
    pub fn delay_millis(mut self, millis: u64) -> Self {
        self.delay_millis = millis;
        self
    }

    /// Set request timeout in seconds. Default 30. A timed-out request fails only the current
    /// operation.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of HTTP attempts for transient failures (default 3).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry (e.g. [1, 2, 4]). If shorter than
    /// retry_count - 1, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            // Exponential 1, 2, 4, ... for (retry_count - 1) steps
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            delay: Duration::from_millis(self.delay_millis),
            last_request: Mutex::new(None),
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! In-memory [Fetch] for tests: canned bodies keyed by URL, with per-URL request counters.

    use super::Fetch;
    use crate::scraper::error::ScraperError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubFetch {
        bodies: HashMap<String, Result<String, u16>>,
        requests: Mutex<Vec<String>>,
        headers_seen: Mutex<Vec<(String, String)>>,
    }

    impl StubFetch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: impl Into<String>) -> Self {
            self.bodies.insert(url.to_string(), Ok(body.into()));
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.bodies.insert(url.to_string(), Err(status));
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }

        pub fn request_count(&self) -> usize {
            self.requests().len()
        }

        pub fn headers_seen(&self) -> Vec<(String, String)> {
            self.headers_seen
                .lock()
                .map(|h| h.clone())
                .unwrap_or_default()
        }
    }

    impl Fetch for StubFetch {
        fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ScraperError> {
            if let Ok(mut r) = self.requests.lock() {
                r.push(url.to_string());
            }
            if let Ok(mut h) = self.headers_seen.lock() {
                h.extend(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            }
            match self.bodies.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(ScraperError::HttpStatus {
                    status: *status,
                    url: url.to_string(),
                    context: None,
                }),
                None => Err(ScraperError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                    context: Some("no stubbed body".to_string()),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubFetch;
    use super::*;
    use crate::scraper::error::ErrorKind;

    #[test]
    fn backoff_reuses_last_value_past_the_table() {
        assert_eq!(backoff_at(&[1, 2, 4], 0), 1);
        assert_eq!(backoff_at(&[1, 2, 4], 2), 4);
        assert_eq!(backoff_at(&[1, 2, 4], 9), 4);
        assert_eq!(backoff_at(&[], 0), 1);
    }

    #[test]
    fn builder_builds_with_defaults() -> Result<(), reqwest::Error> {
        let client = PoliteClient::builder().retry_count(0).build()?;
        assert_eq!(client.retry_count, 1);
        assert_eq!(client.delay, Duration::from_millis(DEFAULT_DELAY_MILLIS));
        Ok(())
    }

    #[test]
    fn empty_backoff_table_becomes_exponential() -> Result<(), reqwest::Error> {
        let client = PoliteClient::builder()
            .retry_count(4)
            .retry_backoff_secs(Vec::new())
            .build()?;
        assert_eq!(client.backoff_secs, vec![1, 2, 4]);
        Ok(())
    }

    #[test]
    fn get_json_reports_malformed_body() {
        let fetch = StubFetch::new().with("https://api.example/x", "{not json");
        match fetch.get_json("https://api.example/x", &[]) {
            Err(e) => assert_eq!(e.kind(), ErrorKind::MalformedResponse),
            Ok(v) => panic!("expected malformed response, got {}", v),
        }
    }

    #[test]
    fn stub_failure_is_a_transport_error() {
        let fetch = StubFetch::new().with_status("https://api.example/x", 503);
        let err = fetch
            .get_text("https://api.example/x", &[])
            .expect_err("stubbed 503");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
