//! Amazon Product Advertising API adapter
//!
//! SearchItems over PA-API v5. Requests are SigV4-signed; only USD offer
//! prices on new-condition listings are emitted.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::AdapterError;
use crate::types::{Asset, Condition, ListingMeta, Observation};

use super::relevance;
use super::SourceAdapter;

type HmacSha256 = Hmac<Sha256>;

const HOST: &str = "webservices.amazon.com";
const REGION: &str = "us-east-1";
const SERVICE: &str = "ProductAdvertisingAPI";
const PATH: &str = "/paapi5/searchitems";
const TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems";

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItemsResponse {
    search_result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResult {
    items: Option<Vec<Item>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Item {
    item_info: Option<ItemInfo>,
    offers: Option<Offers>,
    #[serde(rename = "DetailPageURL")]
    detail_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemInfo {
    title: Option<Title>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Title {
    display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Offers {
    listings: Option<Vec<Listing>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Listing {
    price: Option<ListingPrice>,
    condition: Option<ListingCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingPrice {
    amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingCondition {
    value: Option<String>,
}

pub struct AmazonApiAdapter {
    access_key: Option<String>,
    secret_key: Option<String>,
    partner_tag: Option<String>,
    client: reqwest::Client,
}

impl AmazonApiAdapter {
    pub fn new(
        access_key: Option<String>,
        secret_key: Option<String>,
        partner_tag: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            access_key,
            secret_key,
            partner_tag,
            client,
        }
    }

    fn credentials(&self) -> Result<(&str, &str, &str), AdapterError> {
        match (
            self.access_key.as_deref(),
            self.secret_key.as_deref(),
            self.partner_tag.as_deref(),
        ) {
            (Some(a), Some(s), Some(t)) if !a.is_empty() && !s.is_empty() && !t.is_empty() => {
                Ok((a, s, t))
            }
            _ => Err(AdapterError::auth_missing(
                "amazon",
                "AMAZON_ACCESS_KEY / AMAZON_SECRET_KEY / AMAZON_PARTNER_TAG not configured",
            )),
        }
    }

    /// SigV4 Authorization header for the given payload at `amz_date`.
    fn sign(
        access_key: &str,
        secret_key: &str,
        payload: &str,
        amz_date: &str,
        date_stamp: &str,
    ) -> String {
        let canonical_headers = format!(
            "content-encoding:amz-1.0\ncontent-type:application/json; charset=utf-8\nhost:{HOST}\nx-amz-date:{amz_date}\nx-amz-target:{TARGET}\n"
        );
        let signed_headers = "content-encoding;content-type;host;x-amz-date;x-amz-target";
        let canonical_request = format!(
            "POST\n{PATH}\n\n{canonical_headers}\n{signed_headers}\n{}",
            sha256_hex(payload.as_bytes())
        );

        let scope = format!("{date_stamp}/{REGION}/{SERVICE}/aws4_request");
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, REGION.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
        )
    }

    fn to_observation(asset: Asset, item: Item, now: i64) -> Option<Observation> {
        let title = item.item_info?.title?.display_value?;
        let listing = item.offers?.listings?.into_iter().next()?;

        let price_info = listing.price?;
        if price_info.currency.as_deref() != Some("USD") {
            return None;
        }
        let price = price_info.amount?;
        if !price.is_finite() || !relevance::passes_floor(price) {
            return None;
        }
        if !relevance::is_relevant(asset, &title) {
            return None;
        }
        let condition = listing
            .condition
            .and_then(|c| c.value)
            .map(|v| Condition::from_listing(&v))
            .unwrap_or(Condition::New);
        if condition != Condition::New {
            return None;
        }

        Some(
            Observation::new(asset, price, "amazon", now).with_meta(ListingMeta {
                title,
                seller: None,
                condition,
                url: item.detail_page_url,
            }),
        )
    }
}

#[async_trait]
impl SourceAdapter for AmazonApiAdapter {
    fn name(&self) -> &'static str {
        "amazon"
    }

    fn is_available(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let (access_key, secret_key, partner_tag) = self.credentials()?;

        let payload = json!({
            "Keywords": asset.search_query(),
            "SearchIndex": "Electronics",
            "ItemCount": 10,
            "PartnerTag": partner_tag,
            "PartnerType": "Associates",
            "Marketplace": "www.amazon.com",
            "Resources": [
                "ItemInfo.Title",
                "Offers.Listings.Price",
                "Offers.Listings.Condition"
            ]
        })
        .to_string();

        let now_utc = Utc::now();
        let amz_date = now_utc.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now_utc.format("%Y%m%d").to_string();
        let authorization = Self::sign(access_key, secret_key, &payload, &amz_date, &date_stamp);

        let response = self
            .client
            .post(format!("https://{HOST}{PATH}"))
            .header("Content-Encoding", "amz-1.0")
            .header("Content-Type", "application/json; charset=utf-8")
            .header("X-Amz-Date", amz_date)
            .header("X-Amz-Target", TARGET)
            .header("Authorization", authorization)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                AdapterError::fetch_failed("amazon", "search request failed").with_cause(e)
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AdapterError::auth_failed(
                "amazon",
                format!("signature rejected (HTTP {})", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(AdapterError::http_error("amazon", status.as_u16()));
        }

        let body: SearchItemsResponse = response.json().await.map_err(|e| {
            AdapterError::fetch_failed("amazon", "search response decode failed").with_cause(e)
        })?;

        let now = Utc::now().timestamp_millis();
        let observations: Vec<Observation> = body
            .search_result
            .and_then(|r| r.items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| Self::to_observation(asset, item, now))
            .collect();

        tracing::debug!(asset = %asset, count = observations.len(), "amazon listings accepted");
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = AmazonApiAdapter::sign("AK", "SK", "{}", "20260101T000000Z", "20260101");
        let b = AmazonApiAdapter::sign("AK", "SK", "{}", "20260101T000000Z", "20260101");
        assert_eq!(a, b);
        assert!(a.starts_with("AWS4-HMAC-SHA256 Credential=AK/20260101/us-east-1/"));
        assert!(a.contains("SignedHeaders=content-encoding;content-type;host;x-amz-date;x-amz-target"));
    }

    #[test]
    fn test_signature_varies_with_payload() {
        let a = AmazonApiAdapter::sign("AK", "SK", "{}", "20260101T000000Z", "20260101");
        let b = AmazonApiAdapter::sign("AK", "SK", "{\"x\":1}", "20260101T000000Z", "20260101");
        assert_ne!(a, b);
    }

    #[test]
    fn test_unavailable_without_full_credentials() {
        let adapter = AmazonApiAdapter::new(Some("AK".into()), None, Some("tag".into()));
        assert!(!adapter.is_available());
    }

    #[test]
    fn test_response_decode_and_filter() {
        let raw = serde_json::json!({
            "SearchResult": {
                "Items": [
                    {
                        "ItemInfo": {"Title": {"DisplayValue": "MSI GeForce RTX 4090 Gaming X"}},
                        "Offers": {"Listings": [{"Price": {"Amount": 1849.0, "Currency": "USD"}}]},
                        "DetailPageURL": "https://www.amazon.com/dp/X"
                    },
                    {
                        "ItemInfo": {"Title": {"DisplayValue": "RTX 4090 riser cable"}},
                        "Offers": {"Listings": [{"Price": {"Amount": 19.0, "Currency": "USD"}}]}
                    }
                ]
            }
        });
        let parsed: SearchItemsResponse = serde_json::from_value(raw).unwrap();
        let items = parsed.search_result.unwrap().items.unwrap();
        let observations: Vec<_> = items
            .into_iter()
            .filter_map(|i| AmazonApiAdapter::to_observation(Asset::Rtx4090, i, 1))
            .collect();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].price, 1849.0);
    }
}
