//! Amazon search-results scraper

use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use std::sync::Arc;

use crate::adapters::SourceAdapter;
use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::fetch::ProxyPool;
use crate::types::{Asset, Observation};

use super::{
    check_block, encode_query, extract_listings, json_ld_products, observations_from_listings,
    BlockMarkers, ScrapeContext, SelectorFamily,
};

const NAME: &str = "amazon-scraper";
const HOMEPAGE: &str = "https://www.amazon.com/";

const FAMILIES: &[SelectorFamily] = &[
    SelectorFamily {
        item: r#"div[data-component-type="s-search-result"]"#,
        title: "h2 a span",
        price: "span.a-price span.a-offscreen",
    },
    SelectorFamily {
        item: "div.s-result-item",
        title: "span.a-text-normal",
        price: "span.a-offscreen",
    },
];

const MARKERS: BlockMarkers = BlockMarkers {
    captcha: &[
        "enter the characters you see below",
        "api-services-support@amazon.com",
    ],
    blocked: &["robot check"],
    landmarks: &["s-search-result", "s-result-item", "s-main-slot"],
};

pub struct AmazonScraper {
    ctx: ScrapeContext,
}

impl AmazonScraper {
    pub fn from_config(
        config: &AppConfig,
        pool: &Arc<ProxyPool>,
    ) -> anyhow::Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(Self {
            ctx: ScrapeContext::new(NAME, "amazon", HOMEPAGE, config, pool)?,
        }))
    }

    fn parse(html: &str, asset: Asset, now: i64) -> Result<Vec<Observation>, AdapterError> {
        let doc = Html::parse_document(html);
        let mut listings = extract_listings(&doc, FAMILIES);
        if listings.is_empty() {
            listings = json_ld_products(&doc);
        }
        if listings.is_empty() {
            return Err(AdapterError::scrape_failed(NAME, "no listings parsed"));
        }
        Ok(observations_from_listings(NAME, asset, listings, now))
    }
}

#[async_trait]
impl SourceAdapter for AmazonScraper {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let url = format!("{HOMEPAGE}s?k={}", encode_query(asset.search_query()));
        let (status, html) = self.ctx.fetch_search(&url, false).await?;
        check_block(NAME, status, &html, &MARKERS)?;
        Self::parse(&html, asset, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_search_results() {
        let html = r#"<div class="s-main-slot">
          <div data-component-type="s-search-result">
            <h2><a href="/dp/1"><span>MSI Gaming GeForce RTX 4090 24GB</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$1,839.99</span></span>
          </div>
          <div data-component-type="s-search-result">
            <h2><a href="/dp/2"><span>Thermal pad kit for RTX 4090</span></a></h2>
            <span class="a-price"><span class="a-offscreen">$12.99</span></span>
          </div>
        </div>"#;
        let obs = AmazonScraper::parse(html, Asset::Rtx4090, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 1839.99);
    }

    #[test]
    fn test_captcha_page_detected() {
        let html = "<html>Enter the characters you see below</html>";
        let err = check_block(NAME, 200, html, &MARKERS).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Captcha);
    }
}
