//! Rental marketplace adapter
//!
//! One bundle-search request per GPU type against the Vast-style
//! marketplace. Offers are normalized to per-GPU-hour pricing. When the
//! endpoint is unavailable, a plausible set of offers is fabricated around
//! the per-type defaults so the stats pipeline still produces output; the
//! fallback is flagged and surfaced at the API layer.

use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::AdapterError;
use crate::types::{GpuType, ProviderClass, RentalOffer};

const BUNDLES_URL: &str = "https://console.vast.ai/api/v0/bundles/";

pub const RENTAL_ADAPTER_NAME: &str = "vast";

#[derive(Debug, Deserialize)]
struct BundlesResponse {
    offers: Option<Vec<RawOffer>>,
}

#[derive(Debug, Deserialize)]
struct RawOffer {
    num_gpus: Option<u32>,
    /// Total dollars-per-hour for the whole bundle.
    dph_total: Option<f64>,
    reliability2: Option<f64>,
    /// Present only on interruptible (spot-style) offers.
    min_bid: Option<f64>,
    verification: Option<String>,
}

/// Result of one per-type fetch, with fallback provenance.
#[derive(Debug, Clone)]
pub struct RentalFetch {
    pub offers: Vec<RentalOffer>,
    /// True when the marketplace was unreachable and offers were fabricated.
    pub simulated: bool,
}

pub struct RentalMarketplaceAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl RentalMarketplaceAdapter {
    pub fn new() -> Self {
        Self::with_base_url(BUNDLES_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(25))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        RENTAL_ADAPTER_NAME
    }

    /// Fetch current offers for one GPU type, fabricating a plausible set
    /// when the marketplace cannot be reached.
    pub async fn fetch_offers(&self, gpu: GpuType) -> RentalFetch {
        match self.query_marketplace(gpu).await {
            Ok(offers) if !offers.is_empty() => RentalFetch {
                offers,
                simulated: false,
            },
            Ok(_) => {
                tracing::warn!(gpu = %gpu, "marketplace returned no offers, using fabricated set");
                RentalFetch {
                    offers: fabricate_offers(gpu),
                    simulated: true,
                }
            }
            Err(err) => {
                tracing::warn!(gpu = %gpu, code = %err.code, error = %err, "marketplace fetch failed, using fabricated set");
                RentalFetch {
                    offers: fabricate_offers(gpu),
                    simulated: true,
                }
            }
        }
    }

    async fn query_marketplace(&self, gpu: GpuType) -> Result<Vec<RentalOffer>, AdapterError> {
        let query = json!({
            "gpu_name": { "eq": gpu.query() },
            "num_gpus": { "gte": 1 },
            "rentable": { "eq": true },
            "type": "ask",
            "order": [["dph_total", "asc"]],
        })
        .to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(|e| {
                AdapterError::fetch_failed(RENTAL_ADAPTER_NAME, "bundle search failed")
                    .with_cause(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::http_error(
                RENTAL_ADAPTER_NAME,
                status.as_u16(),
            ));
        }

        let body: BundlesResponse = response.json().await.map_err(|e| {
            AdapterError::fetch_failed(RENTAL_ADAPTER_NAME, "bundle decode failed").with_cause(e)
        })?;

        Ok(body
            .offers
            .unwrap_or_default()
            .into_iter()
            .filter_map(normalize_offer)
            .collect())
    }
}

impl Default for RentalMarketplaceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_offer(raw: RawOffer) -> Option<RentalOffer> {
    let gpu_count = raw.num_gpus.filter(|n| *n > 0)?;
    let price_per_hour = raw.dph_total.filter(|p| p.is_finite() && *p > 0.0)?;
    let provider_class = match raw.verification.as_deref() {
        Some("verified") => ProviderClass::Verified,
        _ => ProviderClass::Community,
    };
    Some(RentalOffer {
        gpu_count,
        price_per_hour,
        price_per_gpu_hour: price_per_hour / gpu_count as f64,
        reliability: raw.reliability2.unwrap_or(0.0).clamp(0.0, 1.0),
        provider_class,
        interruptible: raw.min_bid.is_some(),
    })
}

/// Plausible offer set around the per-type default rate. Interruptible
/// offers price below on-demand, as they do on the real marketplace.
fn fabricate_offers(gpu: GpuType) -> Vec<RentalOffer> {
    let mut rng = rand::thread_rng();
    let base = gpu.default_hourly();
    let count = rng.gen_range(8..=16);
    const GPU_COUNTS: &[u32] = &[1, 1, 1, 2, 2, 4, 8];

    (0..count)
        .map(|_| {
            let gpu_count = GPU_COUNTS[rng.gen_range(0..GPU_COUNTS.len())];
            let interruptible = rng.gen_bool(0.4);
            let discount = if interruptible { 0.65 } else { 1.0 };
            let per_gpu = base * discount * rng.gen_range(0.85..1.2);
            RentalOffer {
                gpu_count,
                price_per_hour: per_gpu * gpu_count as f64,
                price_per_gpu_hour: per_gpu,
                reliability: rng.gen_range(0.85..0.999),
                provider_class: if rng.gen_bool(0.6) {
                    ProviderClass::Verified
                } else {
                    ProviderClass::Community
                },
                interruptible,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_offer_per_gpu_price() {
        let raw = RawOffer {
            num_gpus: Some(4),
            dph_total: Some(2.0),
            reliability2: Some(0.97),
            min_bid: Some(0.3),
            verification: Some("verified".to_string()),
        };
        let offer = normalize_offer(raw).unwrap();
        assert_eq!(offer.price_per_gpu_hour, 0.5);
        assert!(offer.interruptible);
        assert_eq!(offer.provider_class, ProviderClass::Verified);
    }

    #[test]
    fn test_normalize_rejects_degenerate_offers() {
        assert!(normalize_offer(RawOffer {
            num_gpus: Some(0),
            dph_total: Some(1.0),
            reliability2: None,
            min_bid: None,
            verification: None,
        })
        .is_none());
        assert!(normalize_offer(RawOffer {
            num_gpus: Some(1),
            dph_total: Some(-0.5),
            reliability2: None,
            min_bid: None,
            verification: None,
        })
        .is_none());
    }

    #[test]
    fn test_fabricated_offers_are_plausible() {
        for gpu in GpuType::all() {
            let offers = fabricate_offers(*gpu);
            assert!((8..=16).contains(&offers.len()));
            let base = gpu.default_hourly();
            for offer in &offers {
                assert!(offer.price_per_gpu_hour > base * 0.4);
                assert!(offer.price_per_gpu_hour < base * 1.3);
                assert!(offer.gpu_count >= 1);
                assert!((offer.price_per_hour
                    - offer.price_per_gpu_hour * offer.gpu_count as f64)
                    .abs()
                    < 1e-9);
            }
        }
    }
}
