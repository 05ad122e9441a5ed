//! Price source adapters
//!
//! Every source implements [`SourceAdapter`]; the aggregator iterates the
//! enabled set uniformly and never cares which kind it is talking to.

mod amazon;
mod bestbuy;
mod ebay;
mod mock;
pub mod relevance;
pub mod scrape;
mod vast;

pub use amazon::AmazonApiAdapter;
pub use bestbuy::BestBuyAdapter;
pub use ebay::EbayAdapter;
pub use mock::MockAdapter;
pub use vast::{RentalFetch, RentalMarketplaceAdapter};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::fetch::ProxyPool;
use crate::types::{Asset, Observation};

/// Uniform capability contract for all price sources.
///
/// `fetch_prices` returns `Ok(vec![])` for "no data"; it signals
/// authentication, fetch, block, or protocol anomalies with a typed
/// [`AdapterError`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable lowercase identifier used in provenance and collapse keys.
    fn name(&self) -> &'static str;

    /// True iff the adapter has the configuration it needs.
    fn is_available(&self) -> bool;

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError>;
}

/// User-visible display form of an adapter name. Unknown names pass
/// through unchanged.
pub fn display_name(source: &str) -> String {
    match source {
        "mock" => "Simulated",
        "newegg-scraper" => "Newegg",
        "bestbuy-scraper" => "Best Buy",
        "amazon-scraper" => "Amazon",
        "bhphoto-scraper" => "B&H Photo",
        "ebay" => "eBay",
        "amazon" => "Amazon API",
        "bestbuy" => "Best Buy API",
        other => other,
    }
    .to_string()
}

/// Compose the enabled adapter set from configuration.
///
/// `SCRAPE_MODE` selects the HTML scrapers; otherwise `DEMO_MODE` selects
/// the mock only; otherwise the marketplace API adapters filtered by
/// `is_available()`, falling back to the mock when none are configured.
pub fn build_adapters(config: &AppConfig) -> Vec<Arc<dyn SourceAdapter>> {
    if config.scrape_mode {
        let pool = Arc::new(
            config
                .proxy_urls
                .as_deref()
                .map(ProxyPool::from_list)
                .unwrap_or_else(ProxyPool::empty),
        );
        type ScraperBuilder =
            fn(&AppConfig, &Arc<ProxyPool>) -> anyhow::Result<Arc<dyn SourceAdapter>>;
        const BUILDERS: &[ScraperBuilder] = &[
            scrape::NeweggScraper::from_config,
            scrape::AmazonScraper::from_config,
            scrape::BestBuyScraper::from_config,
            scrape::BhPhotoScraper::from_config,
        ];

        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for build in BUILDERS {
            match build(config, &pool) {
                Ok(adapter) => adapters.push(adapter),
                Err(err) => tracing::warn!(error = %err, "scraper construction failed, skipping"),
            }
        }
        tracing::info!(count = adapters.len(), "🕸️ scrape mode enabled");
        return adapters;
    }

    if config.demo_mode {
        tracing::info!("🎲 demo mode: simulated prices only");
        return vec![Arc::new(MockAdapter::new(config.mock_volatility))];
    }

    let candidates: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(EbayAdapter::new(
            config.ebay_app_id.clone(),
            config.ebay_cert_id.clone(),
        )),
        Arc::new(BestBuyAdapter::new(config.bestbuy_api_key.clone())),
        Arc::new(AmazonApiAdapter::new(
            config.amazon_access_key.clone(),
            config.amazon_secret_key.clone(),
            config.amazon_partner_tag.clone(),
        )),
    ];
    let available: Vec<Arc<dyn SourceAdapter>> = candidates
        .into_iter()
        .filter(|a| a.is_available())
        .collect();

    if available.is_empty() {
        tracing::warn!("no marketplace API credentials configured, falling back to simulated prices");
        return vec![Arc::new(MockAdapter::new(config.mock_volatility))];
    }

    let names: Vec<&str> = available.iter().map(|a| a.name()).collect();
    tracing::info!(adapters = ?names, "marketplace API adapters enabled");
    available
}
