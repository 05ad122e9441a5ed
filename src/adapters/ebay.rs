//! eBay Browse API adapter
//!
//! Authenticated marketplace API. Obtains short-lived client-credential
//! tokens and caches them with a safety margin before expiry. Only
//! fixed-price, USD, new-condition listings are emitted.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::AdapterError;
use crate::types::{Asset, Condition, ListingMeta, Observation};

use super::relevance;
use super::SourceAdapter;

const TOKEN_URL: &str = "https://api.ebay.com/identity/v1/oauth2/token";
const SEARCH_URL: &str = "https://api.ebay.com/buy/browse/v1/item_summary/search";
const OAUTH_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

/// Refresh tokens this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    item_summaries: Option<Vec<ItemSummary>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    title: String,
    price: Option<Money>,
    condition: Option<String>,
    item_web_url: Option<String>,
    seller: Option<Seller>,
}

#[derive(Debug, Deserialize)]
struct Money {
    value: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Seller {
    username: Option<String>,
}

pub struct EbayAdapter {
    app_id: Option<String>,
    cert_id: Option<String>,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl EbayAdapter {
    pub fn new(app_id: Option<String>, cert_id: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            app_id,
            cert_id,
            client,
            token: Mutex::new(None),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), AdapterError> {
        match (self.app_id.as_deref(), self.cert_id.as_deref()) {
            (Some(app), Some(cert)) if !app.is_empty() && !cert.is_empty() => Ok((app, cert)),
            _ => Err(AdapterError::auth_missing(
                "ebay",
                "EBAY_APP_ID / EBAY_CERT_ID not configured",
            )),
        }
    }

    /// Current access token, refreshing when within the expiry margin.
    async fn access_token(&self) -> Result<String, AdapterError> {
        let (app, cert) = self.credentials()?;
        let mut guard = self.token.lock().await;

        let now = Utc::now().timestamp_millis();
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > now {
                return Ok(cached.value.clone());
            }
        }

        let basic = general_purpose::STANDARD.encode(format!("{app}:{cert}"));
        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {basic}"))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", OAUTH_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| {
                AdapterError::fetch_failed("ebay", "token request failed").with_cause(e)
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AdapterError::auth_failed(
                "ebay",
                format!("token endpoint rejected credentials (HTTP {})", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(AdapterError::http_error("ebay", status.as_u16()));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AdapterError::fetch_failed("ebay", "token response decode failed").with_cause(e)
        })?;

        let cached = CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in * 1000 - TOKEN_EXPIRY_MARGIN_MS,
        };
        *guard = Some(cached);
        Ok(token.access_token)
    }

    fn to_observation(asset: Asset, item: ItemSummary, now: i64) -> Option<Observation> {
        let money = item.price?;
        if money.currency != "USD" {
            return None;
        }
        let price: f64 = money.value.parse().ok()?;
        if !price.is_finite() || !relevance::passes_floor(price) {
            return None;
        }
        if !relevance::is_relevant(asset, &item.title) {
            return None;
        }
        let condition = item
            .condition
            .as_deref()
            .map(Condition::from_listing)
            .unwrap_or(Condition::New);
        if condition != Condition::New {
            return None;
        }

        Some(
            Observation::new(asset, price, "ebay", now).with_meta(ListingMeta {
                title: item.title,
                seller: item.seller.and_then(|s| s.username),
                condition,
                url: item.item_web_url,
            }),
        )
    }
}

#[async_trait]
impl SourceAdapter for EbayAdapter {
    fn name(&self) -> &'static str {
        "ebay"
    }

    fn is_available(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let token = self.access_token().await?;

        let filter = format!(
            "buyingOptions:{{FIXED_PRICE}},conditions:{{NEW}},priceCurrency:USD,price:[{}..]",
            relevance::MIN_HARDWARE_PRICE_USD as u64
        );
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", asset.search_query()),
                ("limit", "50"),
                ("filter", filter.as_str()),
            ])
            .header("Authorization", format!("Bearer {token}"))
            .header("X-EBAY-C-MARKETPLACE-ID", "EBAY_US")
            .send()
            .await
            .map_err(|e| {
                AdapterError::fetch_failed("ebay", "search request failed").with_cause(e)
            })?;

        let status = response.status();
        if status.as_u16() == 401 {
            // Token may have been revoked; drop the cache for next round.
            *self.token.lock().await = None;
            return Err(AdapterError::auth_failed("ebay", "search rejected token"));
        }
        if !status.is_success() {
            return Err(AdapterError::http_error("ebay", status.as_u16()));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            AdapterError::fetch_failed("ebay", "search response decode failed").with_cause(e)
        })?;

        let now = Utc::now().timestamp_millis();
        let observations: Vec<Observation> = body
            .item_summaries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| Self::to_observation(asset, item, now))
            .collect();

        tracing::debug!(asset = %asset, count = observations.len(), "ebay listings accepted");
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, value: &str, currency: &str, condition: &str) -> ItemSummary {
        ItemSummary {
            title: title.to_string(),
            price: Some(Money {
                value: value.to_string(),
                currency: currency.to_string(),
            }),
            condition: Some(condition.to_string()),
            item_web_url: None,
            seller: None,
        }
    }

    #[test]
    fn test_accepts_new_usd_listing() {
        let obs = EbayAdapter::to_observation(
            Asset::Rtx4090,
            item("ASUS ROG Strix GeForce RTX 4090 OC", "1899.99", "USD", "New"),
            1,
        );
        let obs = obs.unwrap();
        assert_eq!(obs.price, 1899.99);
        assert_eq!(obs.source, "ebay");
    }

    #[test]
    fn test_rejects_non_usd_and_used() {
        assert!(EbayAdapter::to_observation(
            Asset::Rtx4090,
            item("GeForce RTX 4090 Founders", "1700.00", "EUR", "New"),
            1
        )
        .is_none());
        assert!(EbayAdapter::to_observation(
            Asset::Rtx4090,
            item("GeForce RTX 4090 Founders", "1400.00", "USD", "Used"),
            1
        )
        .is_none());
    }

    #[test]
    fn test_rejects_below_floor_and_irrelevant() {
        assert!(EbayAdapter::to_observation(
            Asset::Rtx4090,
            item("RTX 4090 power cable 12VHPWR", "29.99", "USD", "New"),
            1
        )
        .is_none());
        assert!(EbayAdapter::to_observation(
            Asset::Ddr5Kit32,
            item("DDR4 32GB kit", "80.00", "USD", "New"),
            1
        )
        .is_none());
    }

    #[test]
    fn test_unavailable_without_credentials() {
        let adapter = EbayAdapter::new(None, None);
        assert!(!adapter.is_available());
    }
}
