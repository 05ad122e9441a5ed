//! Newegg search-results scraper

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

const NAME: &str = "newegg-scraper";
const HOMEPAGE: &str = "https://www.newegg.com/";

const FAMILIES: &[SelectorFamily] = &[
    SelectorFamily {
        item: "div.item-cell",
        title: "a.item-title",
        price: "li.price-current",
    },
    // Older grid layout still served to some sessions.
    SelectorFamily {
        item: "div.item-container",
        title: "a.item-title",
        price: "li.price-current",
    },
];

const MARKERS: BlockMarkers = BlockMarkers {
    captcha: &["are you a human", "recaptcha"],
    blocked: &["access denied", "request unsuccessful"],
    landmarks: &["item-cell", "item-container", "list-wrap"],
};

pub struct NeweggScraper {
    ctx: ScrapeContext,
}

impl NeweggScraper {
    pub fn from_config(
        config: &AppConfig,
        pool: &Arc<ProxyPool>,
    ) -> anyhow::Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(Self {
            ctx: ScrapeContext::new(NAME, "newegg", HOMEPAGE, config, pool)?,
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
impl SourceAdapter for NeweggScraper {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let url = format!(
            "{HOMEPAGE}p/pl?d={}",
            encode_query(asset.search_query())
        );
        let (status, html) = self.ctx.fetch_search(&url, false).await?;
        check_block(NAME, status, &html, &MARKERS)?;
        Self::parse(&html, asset, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_item_cells() {
        let html = r#"<div class="list-wrap">
          <div class="item-cell">
            <a class="item-title">GIGABYTE GeForce RTX 4090 GAMING OC 24G</a>
            <li class="price-current"><strong>1,729</strong><sup>.99</sup></li>
          </div>
          <div class="item-cell">
            <a class="item-title">RTX 4090 compatible riser cable</a>
            <li class="price-current"><strong>29</strong><sup>.99</sup></li>
          </div>
        </div>"#;
        let obs = NeweggScraper::parse(html, Asset::Rtx4090, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 1729.99);
        assert_eq!(obs[0].source, "newegg-scraper");
    }

    #[test]
    fn test_empty_page_is_scrape_failure() {
        let err = NeweggScraper::parse("<html><div class='list-wrap'></div></html>", Asset::Rtx4090, 1)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ScrapeFailed);
    }
}
