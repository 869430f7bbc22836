//! Shared error type for the engine and every source adapter.

use thiserror::Error;

/// Coarse classification of a [ScraperError], used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout, or non-success HTTP status. Not retried by the engine.
    Transport,
    /// A body was received but could not be parsed into the expected shape.
    MalformedResponse,
    /// Structured content was expected but no configured strategy located it.
    ExtractionFailure,
    /// The caller asked for something this crate or source cannot do.
    InvalidRequest,
}

/// Shared scraper error for transport, parsing, extraction, and caller input.
#[derive(Debug, Error)]
pub enum ScraperError {
    // Transport
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "chapter list page 3") for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    // Malformed responses
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    // Extraction
    #[error("Could not find {what} at {url}")]
    ContentNotFound { what: String, url: String },

    // Caller input
    #[error("Unknown source '{name}'. Run `mangascrape sources` to list the supported ones.")]
    UnknownSource { name: String },

    #[error("Source '{source_id}' does not support sort order '{order}'")]
    UnsupportedSort { source_id: String, order: String },

    #[error("Source '{source_id}' does not support {filter}")]
    UnsupportedFilter {
        source_id: String,
        filter: &'static str,
    },

    #[error("Gave up after {pages} pages without reaching the end of the listing")]
    PageLimitExceeded { pages: u32 },
}

impl ScraperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScraperError::Network { .. }
            | ScraperError::HttpStatus { .. }
            | ScraperError::BodyRead { .. } => ErrorKind::Transport,
            ScraperError::MalformedResponse { .. }
            | ScraperError::InvalidUrl { .. }
            | ScraperError::Selector { .. } => ErrorKind::MalformedResponse,
            ScraperError::ContentNotFound { .. } => ErrorKind::ExtractionFailure,
            ScraperError::UnknownSource { .. }
            | ScraperError::UnsupportedSort { .. }
            | ScraperError::UnsupportedFilter { .. }
            | ScraperError::PageLimitExceeded { .. } => ErrorKind::InvalidRequest,
        }
    }

    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        ScraperError::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>, url: &str) -> Self {
        ScraperError::ContentNotFound {
            what: what.into(),
            url: url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let status = ScraperError::HttpStatus {
            status: 503,
            url: "https://x".into(),
            context: None,
        };
        assert_eq!(status.kind(), ErrorKind::Transport);
        assert_eq!(
            ScraperError::malformed("https://x", "bad json").kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(
            ScraperError::not_found("chapter images", "https://x").kind(),
            ErrorKind::ExtractionFailure
        );
        assert_eq!(
            ScraperError::UnknownSource { name: "x".into() }.kind(),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn content_not_found_message_names_what_and_where() {
        let e = ScraperError::not_found("chapter images", "https://comix.to/title/a/1-chapter-1");
        assert_eq!(
            e.to_string(),
            "Could not find chapter images at https://comix.to/title/a/1-chapter-1"
        );
    }
}
