//! Recover a JSON array that a page inlines into a `<script>` block instead of exposing an API.
//!
//! Frameworks that stream client state (Next.js `self.__next_f.push([1,"..."])` and friends) put
//! the JSON inside a JavaScript string literal, so every quote arrives escaped:
//! `\"images\":[\"https://...\",\"https://...\"]`. The scan below decodes that outer escaping on the
//! fly, so brackets and quotes inside string values never change the nesting depth.

use crate::scraper::error::ScraperError;
use scraper::{Html, Selector};
use serde_json::Value;

/// Text of every `<script>` element in document order.
pub fn inline_scripts(doc: &Html) -> Vec<String> {
    let Ok(sel) = Selector::parse("script") else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(|s| s.text().collect::<String>())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Find `field` in the given scripts and parse the array it names.
///
/// The escaped marker (`\"field\":[`) is tried in every script first, then the plain one
/// (`"field":[`). Missing marker, an array that never closes, invalid JSON, and an empty array are
/// all reported as [ScraperError::ContentNotFound] for `url`.
pub fn extract_array<S: AsRef<str>>(
    scripts: &[S],
    field: &str,
    url: &str,
) -> Result<Vec<Value>, ScraperError> {
    let escaped_marker = format!("\\\"{}\\\":", field);
    let plain_marker = format!("\"{}\":", field);
    let attempts = [(escaped_marker.as_str(), true), (plain_marker.as_str(), false)];

    for (marker, escaped) in attempts {
        for script in scripts {
            let script = script.as_ref();
            let mut from = 0;
            while let Some(found) = script[from..].find(marker) {
                let after_marker = from + found + marker.len();
                from = after_marker;
                let Some(open) = array_start(script, after_marker) else {
                    continue;
                };
                match parse_span(script, open, escaped) {
                    Some(items) if !items.is_empty() => return Ok(items),
                    Some(_) => log::debug!("{} array at {} is empty", field, url),
                    None => log::debug!("{} marker at {} did not yield a JSON array", field, url),
                }
            }
        }
    }
    Err(ScraperError::not_found(format!("embedded \"{}\" array", field), url))
}

/// Offset of the `[` that opens the value, allowing whitespace after the colon.
fn array_start(script: &str, after_colon: usize) -> Option<usize> {
    let rest = &script[after_colon..];
    let trimmed = rest.trim_start();
    trimmed
        .starts_with('[')
        .then(|| after_colon + (rest.len() - trimmed.len()))
}

fn parse_span(script: &str, open: usize, escaped: bool) -> Option<Vec<Value>> {
    let span = balanced_span(&script[open..], escaped)?;
    let json = if escaped {
        unescape_literal(span)
    } else {
        span.to_string()
    };
    match serde_json::from_str::<Value>(&json) {
        Ok(Value::Array(items)) => Some(items),
        Ok(_) => None,
        Err(e) => {
            log::debug!("embedded array is not valid JSON: {}", e);
            None
        }
    }
}

/// Return the slice from the leading `[` through its matching `]`.
///
/// `escaped` means the text is still inside a JS string literal: `\x` pairs are decoded to `x`
/// before the JSON state machine sees them. Returns None if the brackets never balance.
pub fn balanced_span(text: &str, escaped: bool) -> Option<&str> {
    if !text.starts_with('[') {
        return None;
    }
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escape_pending = false;
    let mut chars = text.char_indices();
    while let Some((offset, raw)) = chars.next() {
        let c = if escaped && raw == '\\' {
            match chars.next() {
                Some((_, next)) => next,
                None => return None,
            }
        } else {
            raw
        };

        if escape_pending {
            escape_pending = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_pending = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    // `offset` is the start of the (possibly two-byte escaped) closing char.
                    let end = if escaped && raw == '\\' {
                        offset + 2
                    } else {
                        offset + c.len_utf8()
                    };
                    return Some(&text[..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Undo one level of JS string-literal escaping.
fn unescape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Image URL of one embedded page item: a bare string or an object with `url`/`src`.
pub fn item_url(item: &Value) -> Option<String> {
    let url = match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["url", "src", "image"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(String::from),
        _ => None,
    };
    url.filter(|s| !s.is_empty())
}
