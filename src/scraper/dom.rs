//! Small helpers over `scraper` shared by the HTML adapters.

use crate::scraper::error::ScraperError;
use scraper::{ElementRef, Selector};

/// Parse a CSS selector or return a typed error (avoids panics from Selector::parse).
pub fn selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::Selector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Text content with runs of whitespace collapsed to single spaces.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapsed text of the first match of `sel` under `el`, if non-empty.
pub fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

/// Collapsed text of all matches of `sel` under `el`, joined with a space.
pub fn all_text(el: ElementRef<'_>, sel: &Selector) -> String {
    el.select(sel)
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First non-empty attribute among `names` on the first match of `sel`.
pub fn first_attr(el: ElementRef<'_>, sel: &Selector, names: &[&str]) -> Option<String> {
    el.select(sel).next().and_then(|m| attr_any(m, names))
}

/// First non-empty attribute among `names` (e.g. `src` then `data-src` for lazy images).
pub fn attr_any(el: ElementRef<'_>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| el.value().attr(n))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// The next sibling element after `el`, skipping text nodes.
pub fn next_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(selector("div[").is_err());
    }

    #[test]
    fn helpers_read_text_and_attributes() -> Result<(), ScraperError> {
        let doc = Html::parse_fragment(
            r#"<div><h2>  Synopsis
            </h2>
            <p>Line one   two</p><img data-src="/lazy.jpg" src=""></div>"#,
        );
        let root = doc.root_element();
        assert_eq!(first_text(root, &selector("h2")?).as_deref(), Some("Synopsis"));
        assert_eq!(
            first_attr(root, &selector("img")?, &["src", "data-src"]).as_deref(),
            Some("/lazy.jpg")
        );
        let h2 = root.select(&selector("h2")?).next().ok_or_else(|| {
            ScraperError::malformed("fragment", "no h2")
        })?;
        let p = next_element(h2).map(text_of);
        assert_eq!(p.as_deref(), Some("Line one two"));
        Ok(())
    }
}
