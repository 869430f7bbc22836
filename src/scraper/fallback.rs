//! First-success-wins over alternative extraction strategies.
//!
//! Sites often expose the same data two ways (an inline script and a JSON endpoint, say) and one
//! of them breaks from time to time. Each strategy is a closure returning `Result<Vec<T>, _>`;
//! the chain runs them in order and returns the first non-empty success.

use crate::scraper::error::ScraperError;

type Strategy<'a, T> = Box<dyn FnOnce() -> Result<Vec<T>, ScraperError> + 'a>;

/// Ordered extraction strategies for one feature (chapters, pages, ...).
pub struct FallbackChain<'a, T> {
    what: &'static str,
    strategies: Vec<(&'static str, Strategy<'a, T>)>,
}

impl<'a, T> FallbackChain<'a, T> {
    /// `what` names the content being extracted, for logs and [ScraperError::ContentNotFound].
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            strategies: Vec::new(),
        }
    }

    /// Append a named strategy. Strategies run in the order they were added.
    pub fn then<F>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Result<Vec<T>, ScraperError> + 'a,
    {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// Output of the first strategy that succeeds with at least one item, or an empty Vec if
    /// none does. A failing strategy never stops the ones after it; later strategies are not
    /// invoked once one has produced items.
    pub fn run(self) -> Vec<T> {
        let what = self.what;
        for (name, strategy) in self.strategies {
            match strategy() {
                Ok(items) if !items.is_empty() => {
                    log::debug!("{}: strategy '{}' produced {} items", what, name, items.len());
                    return items;
                }
                Ok(_) => log::debug!("{}: strategy '{}' produced nothing", what, name),
                Err(e) => log::debug!("{}: strategy '{}' failed: {}", what, name, e),
            }
        }
        Vec::new()
    }

    /// Like [run](Self::run), but an empty outcome is reported as content not found at `url`.
    /// For features where zero items cannot be a legitimate answer.
    pub fn run_or_not_found(self, url: &str) -> Result<Vec<T>, ScraperError> {
        let what = self.what;
        let items = self.run();
        if items.is_empty() {
            return Err(ScraperError::not_found(what, url));
        }
        Ok(items)
    }
}
