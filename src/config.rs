use crate::constants;
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub geocoder: GeocoderConfig,
    pub dedup: DedupConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Per-source page caps, counted in pages fetched from the source's first page index.
    /// Sources not listed fall back to their built-in default.
    pub max_pages: HashMap<String, u32>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub requests_per_min: u64,
    /// Requests allowed back-to-back before `requests_per_min` pacing applies.
    pub request_burst: u64,
    /// Crawls still running after this long are asked to stop between items.
    pub max_runtime_secs: u64,
    /// Seconds between scheduled crawls; 0 runs every source once.
    pub interval_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: HashMap::new(),
            request_timeout_secs: 10,
            user_agent: "Mozilla/5.0".to_string(),
            requests_per_min: 120,
            request_burst: 1,
            max_runtime_secs: 900,
            interval_secs: 0,
        }
    }
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs)
    }

    pub fn max_pages_for(&self, source: &str, default: u32) -> u32 {
        self.max_pages.get(source).copied().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_min: u64,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: constants::NOMINATIM_BASE_URL.to_string(),
            timeout_secs: 10,
            requests_per_min: 60,
            user_agent: "gnv-event-tracker/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub threshold: usize,
    pub candidate_limit: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            candidate_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "events.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Config {
    /// Load `GNV_CONFIG` (or `config.toml`), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("GNV_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ScraperError::Config(format!("Invalid PORT '{port}': {e}")))?;
        }
        if let Ok(path) = std::env::var("GNV_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(url) = std::env::var("GNV_NOMINATIM_URL") {
            self.geocoder.base_url = url;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.dedup.threshold, 3);
        assert_eq!(config.dedup.candidate_limit, 10);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.crawl.max_pages_for("gainesville_sun", 5), 5);
    }

    #[test]
    fn per_source_page_caps_override_defaults() {
        let config = Config::from_toml(
            r#"
            [crawl]
            request_timeout_secs = 3
            request_burst = 4

            [crawl.max_pages]
            visit_gainesville = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.crawl.max_pages_for("visit_gainesville", 2), 7);
        assert_eq!(config.crawl.max_pages_for("gainesville_sun", 5), 5);
        assert_eq!(config.crawl.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.crawl.request_burst, 4);
        assert_eq!(Config::default().crawl.request_burst, 1);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.database.path, "events.db");
    }
}
