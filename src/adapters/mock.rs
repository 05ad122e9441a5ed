//! Simulated price source
//!
//! Deterministic-from-seed random walk around each asset's catalog base
//! price. Used in demo mode and as the fallback when no marketplace
//! credentials are configured.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AdapterError;
use crate::types::{Asset, Condition, ListingMeta, Observation};

use super::SourceAdapter;

/// The walk is clamped to this band around the base price.
const WALK_BAND: f64 = 0.15;
/// Inter-listing variance within one call.
const LISTING_SPREAD: f64 = 0.01;

struct MockState {
    rng: StdRng,
    prices: HashMap<Asset, f64>,
}

pub struct MockAdapter {
    volatility: f64,
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new(volatility: f64) -> Self {
        Self::seeded(volatility, rand::thread_rng().gen())
    }

    /// Fixed seed, for reproducible rounds in tests.
    pub fn seeded(volatility: f64, seed: u64) -> Self {
        Self {
            volatility,
            state: Mutex::new(MockState {
                rng: StdRng::seed_from_u64(seed),
                prices: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
        let now = Utc::now().timestamp_millis();
        let base = asset.base_price();

        let mut state = self.state.lock().expect("mock state lock poisoned");
        let MockState { rng, prices } = &mut *state;

        let current = prices.entry(asset).or_insert(base);
        let drift = rng.gen_range(-self.volatility..=self.volatility);
        *current = (*current * (1.0 + drift))
            .clamp(base * (1.0 - WALK_BAND), base * (1.0 + WALK_BAND));

        let count = rng.gen_range(3..=7);
        let anchor = *current;
        let observations = (0..count)
            .map(|i| {
                let wiggle = rng.gen_range(-LISTING_SPREAD..=LISTING_SPREAD);
                let price = (anchor * (1.0 + wiggle)).max(1.0);
                Observation::new(asset, price, "mock", now).with_meta(ListingMeta {
                    title: format!("Simulated listing #{} for {}", i + 1, asset.id()),
                    seller: None,
                    condition: Condition::New,
                    url: None,
                })
            })
            .collect();

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_three_to_seven_listings() {
        let adapter = MockAdapter::seeded(0.015, 7);
        for _ in 0..20 {
            let obs = adapter.fetch_prices(Asset::Rtx4090).await.unwrap();
            assert!((3..=7).contains(&obs.len()));
            assert!(obs.iter().all(|o| o.price > 0.0));
            assert!(obs.iter().all(|o| o.source == "mock"));
        }
    }

    #[tokio::test]
    async fn test_walk_stays_in_band() {
        let adapter = MockAdapter::seeded(0.05, 99);
        let base = Asset::Ddr5Kit32.base_price();
        for _ in 0..200 {
            let obs = adapter.fetch_prices(Asset::Ddr5Kit32).await.unwrap();
            for o in obs {
                // Listing wiggle can exceed the walk band slightly.
                assert!(o.price > base * 0.8 && o.price < base * 1.2);
            }
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let a = MockAdapter::seeded(0.015, 42);
        let b = MockAdapter::seeded(0.015, 42);
        for _ in 0..5 {
            let oa = a.fetch_prices(Asset::Rtx4080).await.unwrap();
            let ob = b.fetch_prices(Asset::Rtx4080).await.unwrap();
            let pa: Vec<f64> = oa.iter().map(|o| o.price).collect();
            let pb: Vec<f64> = ob.iter().map(|o| o.price).collect();
            assert_eq!(pa, pb);
        }
    }
}
