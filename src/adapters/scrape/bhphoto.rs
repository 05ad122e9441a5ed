//! B&H Photo search-results scraper

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

const NAME: &str = "bhphoto-scraper";
const HOMEPAGE: &str = "https://www.bhphotovideo.com/";

const FAMILIES: &[SelectorFamily] = &[
    SelectorFamily {
        item: r#"div[data-selenium="miniProductPage"]"#,
        title: r#"span[data-selenium="miniProductPageProductName"]"#,
        price: r#"span[data-selenium="uppedDecimalPriceFirst"]"#,
    },
    SelectorFamily {
        item: r#"div[data-selenium="miniProductPage"]"#,
        title: r#"h3[data-selenium="miniProductPageProductName"]"#,
        price: r#"span[data-selenium="pricingPrice"]"#,
    },
];

const MARKERS: BlockMarkers = BlockMarkers {
    captcha: &["pardon our interruption", "are you a robot"],
    blocked: &["access denied"],
    landmarks: &["miniProductPage", "bh-search"],
};

pub struct BhPhotoScraper {
    ctx: ScrapeContext,
}

impl BhPhotoScraper {
    pub fn from_config(
        config: &AppConfig,
        pool: &Arc<ProxyPool>,
    ) -> anyhow::Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(Self {
            ctx: ScrapeContext::new(NAME, "bhphoto", HOMEPAGE, config, pool)?,
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
impl SourceAdapter for BhPhotoScraper {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let url = format!(
            "{HOMEPAGE}c/search?q={}",
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
    fn test_parses_mini_product_pages() {
        let html = r#"<div class="bh-search">
          <div data-selenium="miniProductPage">
            <span data-selenium="miniProductPageProductName">ASUS TUF Gaming GeForce RTX 4090 OC</span>
            <span data-selenium="uppedDecimalPriceFirst">$1,699</span>
          </div>
        </div>"#;
        let obs = BhPhotoScraper::parse(html, Asset::Rtx4090, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 1699.0);
    }

    #[test]
    fn test_json_ld_fallback() {
        let html = r#"<div class="bh-search">
          <script type="application/ld+json">
            {"@type":"Product","name":"PNY GeForce RTX 4090 Verto",
             "offers":{"price":"1,649.00","priceCurrency":"USD"}}
          </script>
        </div>"#;
        let obs = BhPhotoScraper::parse(html, Asset::Rtx4090, 1).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].price, 1649.0);
    }
}
