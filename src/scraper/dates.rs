//! Display dates to epoch milliseconds.
//!
//! Sources print chapter dates either as a relative phrase ("5 minutes ago", "3 giờ trước") or as
//! a fixed-format calendar date. Anything unrecognized resolves to 0 so a bad date never fails the
//! chapter it belongs to.

use chrono::{NaiveDate, Utc};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Minute => MINUTE_MS,
            TimeUnit::Hour => HOUR_MS,
            TimeUnit::Day => DAY_MS,
            TimeUnit::Week => WEEK_MS,
        }
    }
}

/// Words a source uses for relative dates, plus its absolute date format (chrono `strftime`).
#[derive(Debug, Clone, Copy)]
pub struct DateVocabulary {
    pub units: &'static [(&'static str, TimeUnit)],
    /// Trailing word(s) of a relative phrase, e.g. "ago".
    pub ago: &'static str,
    pub absolute_format: &'static str,
}

pub const ENGLISH: DateVocabulary = DateVocabulary {
    units: &[
        ("minute", TimeUnit::Minute),
        ("min", TimeUnit::Minute),
        ("hour", TimeUnit::Hour),
        ("day", TimeUnit::Day),
        ("week", TimeUnit::Week),
    ],
    ago: "ago",
    absolute_format: "%Y-%m-%d",
};

pub const VIETNAMESE: DateVocabulary = DateVocabulary {
    units: &[
        ("phút", TimeUnit::Minute),
        ("giờ", TimeUnit::Hour),
        ("ngày", TimeUnit::Day),
        ("tuần", TimeUnit::Week),
    ],
    ago: "trước",
    absolute_format: "%d-%m-%Y",
};

/// Resolve `text` against the current wall clock.
pub fn resolve_now(text: &str, vocabulary: &DateVocabulary) -> i64 {
    resolve(text, Utc::now().timestamp_millis(), vocabulary)
}

/// Resolve `text` to epoch milliseconds. Relative phrases count back from `reference_ms`;
/// absolute dates resolve to midnight UTC. Unrecognized input yields 0.
pub fn resolve(text: &str, reference_ms: i64, vocabulary: &DateVocabulary) -> i64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    if let Some((count, unit)) = parse_relative(text, vocabulary) {
        return reference_ms.saturating_sub(count.saturating_mul(unit.millis()));
    }
    parse_absolute(text, vocabulary.absolute_format).unwrap_or(0)
}

/// "<N> <unit>[s] <ago>" anywhere in the text, case-insensitive. Whitespace between the count and
/// the unit is optional. The count must be a non-negative integer.
fn parse_relative(text: &str, vocabulary: &DateVocabulary) -> Option<(i64, TimeUnit)> {
    let text = text.to_lowercase();
    text.match_indices(vocabulary.ago)
        .find_map(|(at, _)| relative_before(&text[..at], vocabulary))
}

/// Reads "<N> <unit>" at the end of `head`.
fn relative_before(head: &str, vocabulary: &DateVocabulary) -> Option<(i64, TimeUnit)> {
    let head = head.trim_end();
    let before_unit = head.trim_end_matches(char::is_alphabetic);
    let unit_word = &head[before_unit.len()..];
    let before_unit = before_unit.trim_end();
    let before_count = before_unit.trim_end_matches(|c: char| c.is_ascii_digit());
    let count = &before_unit[before_count.len()..];
    // "-3" or "3.5" are not counts.
    if !before_count.is_empty() && !before_count.ends_with(char::is_whitespace) {
        return None;
    }
    let count: i64 = count.parse().ok()?;
    let unit = vocabulary.units.iter().find_map(|(word, unit)| {
        let matches = unit_word == *word
            || unit_word
                .strip_suffix('s')
                .is_some_and(|singular| singular == *word);
        matches.then_some(*unit)
    })?;
    Some((count, unit))
}

fn parse_absolute(text: &str, format: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(text, format).ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(midnight.and_utc().timestamp_millis())
}
