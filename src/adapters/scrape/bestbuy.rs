//! Best Buy search-results scraper
//!
//! The results page is JavaScript-heavy, so rendering is requested when the
//! third-party fetch proxy is in use.

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

const NAME: &str = "bestbuy-scraper";
const HOMEPAGE: &str = "https://www.bestbuy.com/";

const FAMILIES: &[SelectorFamily] = &[
    SelectorFamily {
        item: "li.sku-item",
        title: "h4.sku-title a",
        price: r#"div.priceView-hero-price span[aria-hidden="true"]"#,
    },
    SelectorFamily {
        item: "li.sku-item",
        title: "h4.sku-header a",
        price: "div.priceView-customer-price span",
    },
];

const MARKERS: BlockMarkers = BlockMarkers {
    captcha: &["verify your identity", "press & hold"],
    blocked: &["access denied", "automated access"],
    landmarks: &["sku-item", "shop-sku-list", "sku-title"],
};

pub struct BestBuyScraper {
    ctx: ScrapeContext,
}

impl BestBuyScraper {
    pub fn from_config(
        config: &AppConfig,
        pool: &Arc<ProxyPool>,
    ) -> anyhow::Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(Self {
            ctx: ScrapeContext::new(NAME, "bestbuy", HOMEPAGE, config, pool)?,
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
impl SourceAdapter for BestBuyScraper {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let url = format!(
            "{HOMEPAGE}site/searchpage.jsp?st={}",
            encode_query(asset.search_query())
        );
        let (status, html) = self.ctx.fetch_search(&url, true).await?;
        check_block(NAME, status, &html, &MARKERS)?;
        Self::parse(&html, asset, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_sku_items() {
        let html = r#"<ol class="shop-sku-list">
          <li class="sku-item">
            <h4 class="sku-title"><a>NVIDIA GeForce RTX 4090 Founders Edition</a></h4>
            <div class="priceView-hero-price"><span aria-hidden="true">$1,599.99</span></div>
          </li>
        </ol>"#;
        let obs = BestBuyScraper::parse(html, Asset::Rtx4090, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 1599.99);
    }

    #[test]
    fn test_second_family_layout() {
        let html = r#"<ol class="shop-sku-list">
          <li class="sku-item">
            <h4 class="sku-header"><a>Corsair Vengeance DDR5 32GB kit</a></h4>
            <div class="priceView-customer-price"><span>$99.99</span></div>
          </li>
        </ol>"#;
        let obs = BestBuyScraper::parse(html, Asset::Ddr5Kit32, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 99.99);
    }
}
