//! Configuration management
//!
//! Flat configuration struct populated from environment variables (via
//! `.env` when present) once at startup. No dynamic reload.

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Deserializer};

/// Accept the bool-ish spellings used by deployment environments:
/// `true`/`false`, `1`/`0`, `yes`/`no`, in any case.
fn de_boolish<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Boolish {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    Ok(match Boolish::deserialize(deserializer)? {
        Boolish::Bool(b) => b,
        Boolish::Int(i) => i != 0,
        Boolish::Str(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
    })
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port
    pub port: u16,
    /// Hardware update loop interval in milliseconds
    pub update_interval_ms: u64,
    /// Relative change that counts as a price move (for change detection)
    pub price_change_threshold: f64,
    /// TWAP rolling window in milliseconds
    pub twap_window_ms: i64,
    /// Mock-only mode: no external calls, deterministic-ish walk
    #[serde(deserialize_with = "de_boolish")]
    pub demo_mode: bool,
    /// Scrape mode: HTML scrapers instead of marketplace APIs
    #[serde(deserialize_with = "de_boolish")]
    pub scrape_mode: bool,
    /// Route scraper requests through the proxy pool
    #[serde(deserialize_with = "de_boolish")]
    pub use_proxy: bool,
    /// Comma-separated proxy endpoints (http/https/socks4/socks5 URLs)
    pub proxy_urls: Option<String>,
    /// ScraperAPI key; enables the third-party fetch proxy for all scrapers
    pub scraper_api_key: Option<String>,
    pub ebay_app_id: Option<String>,
    pub ebay_cert_id: Option<String>,
    pub amazon_access_key: Option<String>,
    pub amazon_secret_key: Option<String>,
    pub amazon_partner_tag: Option<String>,
    pub bestbuy_api_key: Option<String>,
    /// History store endpoint (PostgREST-compatible) and service key
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    /// Tracing filter, either a bare level or a full directive string
    pub log_level: String,
    /// Comma-separated CORS origins, `*` for any
    pub cors_origins: String,
    /// Optional illiquid-asset pricing policy:
    /// `multi-component`, `ema`, or `hybrid`. Unset = plain median.
    pub pricing_strategy: Option<String>,
    /// Per-tick volatility of the mock adapter's random walk
    pub mock_volatility: f64,
}

impl AppConfig {
    /// Load configuration from `.env` + environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("port", 8080)?
            .set_default("update_interval_ms", 30_000)?
            .set_default("price_change_threshold", 0.005)?
            .set_default("twap_window_ms", 300_000)?
            .set_default("demo_mode", false)?
            .set_default("scrape_mode", false)?
            .set_default("use_proxy", false)?
            .set_default("log_level", "info")?
            .set_default("cors_origins", "*")?
            .set_default("mock_volatility", 0.015)?
            .add_source(Environment::default())
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// True when the append-only history store is reachable.
    pub fn has_history_store(&self) -> bool {
        self.supabase_url.as_deref().map_or(false, |s| !s.is_empty())
            && self.supabase_key.as_deref().map_or(false, |s| !s.is_empty())
    }

    pub fn scraper_api_enabled(&self) -> bool {
        self.scraper_api_key
            .as_deref()
            .map_or(false, |s| !s.is_empty())
    }

    /// Config digest (without secrets) for startup logging.
    pub fn digest(&self) -> String {
        format!(
            "port={} interval_ms={} twap_window_ms={} demo={} scrape={} proxy={} scraper_api={} history={}",
            self.port,
            self.update_interval_ms,
            self.twap_window_ms,
            self.demo_mode,
            self.scrape_mode,
            self.use_proxy,
            self.scraper_api_enabled(),
            self.has_history_store(),
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Flag {
        #[serde(deserialize_with = "de_boolish")]
        value: bool,
    }

    fn parse_flag(json: &str) -> bool {
        serde_json::from_str::<Flag>(json).unwrap().value
    }

    #[test]
    fn test_boolish_spellings() {
        assert!(parse_flag(r#"{"value": true}"#));
        assert!(parse_flag(r#"{"value": "true"}"#));
        assert!(parse_flag(r#"{"value": "1"}"#));
        assert!(parse_flag(r#"{"value": 1}"#));
        assert!(!parse_flag(r#"{"value": "false"}"#));
        assert!(!parse_flag(r#"{"value": "0"}"#));
        assert!(!parse_flag(r#"{"value": ""}"#));
    }
}
