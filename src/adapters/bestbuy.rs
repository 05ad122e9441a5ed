//! Best Buy products API adapter
//!
//! Keyword search against the public products API. Best Buy sells new
//! stock; listings are additionally gated on online availability.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use crate::error::AdapterError;
use crate::types::{Asset, Condition, ListingMeta, Observation};

use super::relevance;
use super::SourceAdapter;

const API_BASE: &str = "https://api.bestbuy.com/v1";

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    products: Option<Vec<Product>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    name: String,
    sale_price: Option<f64>,
    online_availability: Option<bool>,
    url: Option<String>,
}

pub struct BestBuyAdapter {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl BestBuyAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self { api_key, client }
    }

    /// Products query path: one `search=` clause per keyword.
    fn search_path(asset: Asset) -> String {
        let clauses: Vec<String> = asset
            .search_query()
            .split_whitespace()
            .map(|term| format!("search={term}"))
            .collect();
        format!("{API_BASE}/products({})", clauses.join("&"))
    }

    fn to_observation(asset: Asset, product: Product, now: i64) -> Option<Observation> {
        if product.online_availability == Some(false) {
            return None;
        }
        let price = product.sale_price?;
        if !price.is_finite() || !relevance::passes_floor(price) {
            return None;
        }
        if !relevance::is_relevant(asset, &product.name) {
            return None;
        }

        Some(
            Observation::new(asset, price, "bestbuy", now).with_meta(ListingMeta {
                title: product.name,
                seller: Some("Best Buy".to_string()),
                condition: Condition::New,
                url: product.url,
            }),
        )
    }
}

#[async_trait]
impl SourceAdapter for BestBuyAdapter {
    fn name(&self) -> &'static str {
        "bestbuy"
    }

    fn is_available(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            AdapterError::auth_missing("bestbuy", "BESTBUY_API_KEY not configured")
        })?;

        let response = self
            .client
            .get(Self::search_path(asset))
            .query(&[
                ("apiKey", key),
                ("format", "json"),
                ("pageSize", "25"),
                ("show", "name,salePrice,onlineAvailability,url"),
            ])
            .send()
            .await
            .map_err(|e| {
                AdapterError::fetch_failed("bestbuy", "products request failed").with_cause(e)
            })?;

        let status = response.status();
        if status.as_u16() == 403 {
            return Err(AdapterError::auth_failed("bestbuy", "API key rejected"));
        }
        if !status.is_success() {
            return Err(AdapterError::http_error("bestbuy", status.as_u16()));
        }

        let body: ProductsResponse = response.json().await.map_err(|e| {
            AdapterError::fetch_failed("bestbuy", "products response decode failed").with_cause(e)
        })?;

        let now = Utc::now().timestamp_millis();
        let observations: Vec<Observation> = body
            .products
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| Self::to_observation(asset, p, now))
            .collect();

        tracing::debug!(asset = %asset, count = observations.len(), "bestbuy listings accepted");
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_path_has_clause_per_keyword() {
        let path = BestBuyAdapter::search_path(Asset::Rtx4090);
        assert!(path.starts_with("https://api.bestbuy.com/v1/products("));
        assert!(path.contains("search=GeForce"));
        assert!(path.contains("search=4090"));
    }

    #[test]
    fn test_rejects_offline_and_cheap_products() {
        let offline = Product {
            name: "MSI GeForce RTX 4090 Suprim".to_string(),
            sale_price: Some(1999.99),
            online_availability: Some(false),
            url: None,
        };
        assert!(BestBuyAdapter::to_observation(Asset::Rtx4090, offline, 1).is_none());

        let accessory = Product {
            name: "GeForce RTX 4090 support bracket".to_string(),
            sale_price: Some(24.99),
            online_availability: Some(true),
            url: None,
        };
        assert!(BestBuyAdapter::to_observation(Asset::Rtx4090, accessory, 1).is_none());
    }

    #[test]
    fn test_accepts_valid_product() {
        let product = Product {
            name: "NVIDIA GeForce RTX 4090 Founders Edition".to_string(),
            sale_price: Some(1599.99),
            online_availability: Some(true),
            url: Some("https://www.bestbuy.com/site/1".to_string()),
        };
        let obs = BestBuyAdapter::to_observation(Asset::Rtx4090, product, 1).unwrap();
        assert_eq!(obs.price, 1599.99);
        assert_eq!(obs.source, "bestbuy");
    }
}
