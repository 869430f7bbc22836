//! Optional config file loading. Search order: ./mangascrape.toml, then
//! $XDG_CONFIG_HOME/mangascrape/config.toml (or ~/.config/mangascrape/config.toml).

use crate::scraper::SourceSettings;
use serde::Deserialize;
use std::collections::HashMap;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests. Fractions are allowed (e.g. 0.5).
    pub request_delay_secs: Option<f64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). An empty list means exponential backoff.
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Upper bound on pages fetched by one paginated listing, for every source.
    pub max_pages: Option<u32>,
    /// Per-source overrides, keyed by source id: `[sources.comix]`.
    pub sources: HashMap<String, SourceSettings>,
}

impl Config {
    /// Settings for one source: its own table, with the global `max_pages` as fallback.
    pub fn source_settings(&self, id: &str) -> SourceSettings {
        let mut settings = self.sources.get(id).cloned().unwrap_or_default();
        if settings.max_pages.is_none() {
            settings.max_pages = self.max_pages;
        }
        settings
    }
}

/// Search order: (1) ./mangascrape.toml, (2) $XDG_CONFIG_HOME/mangascrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("mangascrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mangascrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            log::debug!("loaded config from {}", path.display());
            return Ok(Some(config));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.user_agent.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.retry_count.is_none());
        assert!(c.retry_backoff_secs.is_none());
        assert!(c.max_pages.is_none());
        assert!(c.sources.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            user_agent = "Custom/1.0"
            request_delay_secs = 1.5
            timeout_secs = 60
            retry_count = 5
            retry_backoff_secs = [1, 2, 4, 8]
            max_pages = 200

            [sources.comix]
            domain = "comix.mirror.example"
            page_size = 50

            [sources.animesama]
            max_pages = 10
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(1.5));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.retry_count, Some(5));
        assert_eq!(
            c.retry_backoff_secs.as_deref(),
            Some([1, 2, 4, 8].as_slice())
        );
        let comix = c.source_settings("comix");
        assert_eq!(comix.domain.as_deref(), Some("comix.mirror.example"));
        assert_eq!(comix.page_size, Some(50));
        assert_eq!(comix.max_pages, Some(200));
        assert_eq!(c.source_settings("animesama").max_pages, Some(10));
    }

    #[test]
    fn unknown_source_gets_global_settings() {
        let c: Config = toml::from_str("max_pages = 3").unwrap();
        let settings = c.source_settings("bfang");
        assert!(settings.domain.is_none());
        assert_eq!(settings.max_pages, Some(3));
    }

    #[test]
    fn integer_delay_is_accepted() {
        let c: Config = toml::from_str("request_delay_secs = 2").unwrap();
        assert_eq!(c.request_delay_secs, Some(2.0));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("user_agent = [").is_err());
    }
}
