//! Price aggregator
//!
//! Fans out to every enabled adapter, filters outliers, fuses the round
//! into a single canonical price per asset, maintains the TWAP, and keeps
//! the last-value store that the HTTP surface reads.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::RwLock;

use crate::adapters::{display_name, SourceAdapter};
use crate::filters::{mad_filter, median, DEFAULT_MAD_THRESHOLD};
use crate::strategies::{PricingStrategy, StrategyInput};
use crate::twap::TwapCalculator;
use crate::types::{to_price_int, AggregatedPrice, Asset, Observation, SourceDetail};

/// Default relative move that counts as a price change.
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 0.005;

/// One round's outcome for an asset.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub record: AggregatedPrice,
    /// True when the price moved by at least the configured threshold
    /// (or there was no previous value).
    pub changed: bool,
}

pub struct PriceOracle {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    twap: TwapCalculator,
    last_prices: RwLock<HashMap<Asset, AggregatedPrice>>,
    change_threshold: f64,
    /// Optional illiquid-asset policy; replaces the plain median when set.
    strategy: Option<Mutex<Box<dyn PricingStrategy>>>,
}

impl PriceOracle {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        twap_window_ms: i64,
        change_threshold: f64,
    ) -> Self {
        Self {
            adapters,
            twap: TwapCalculator::new(twap_window_ms),
            last_prices: RwLock::new(HashMap::new()),
            change_threshold,
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn PricingStrategy>) -> Self {
        tracing::info!(strategy = strategy.name(), "illiquid pricing policy enabled");
        self.strategy = Some(Mutex::new(strategy));
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Collect this round's observations from every enabled adapter.
    /// Per-adapter failures are logged and contribute nothing.
    async fn collect_observations(&self, asset: Asset) -> Vec<Observation> {
        let fetches = self
            .adapters
            .iter()
            .filter(|a| a.is_available())
            .map(|adapter| {
                let adapter = adapter.clone();
                async move {
                    match adapter.fetch_prices(asset).await {
                        Ok(observations) => observations,
                        Err(err) => {
                            tracing::warn!(
                                adapter = adapter.name(),
                                code = %err.code,
                                error = %err,
                                "adapter failed, continuing round"
                            );
                            Vec::new()
                        }
                    }
                }
            });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// Run one full round for `asset`. Returns `None` when no adapter
    /// produced a usable price; the last good value (if any) is kept.
    pub async fn update_price(&self, asset: Asset) -> Option<PriceUpdate> {
        let observations = self.collect_observations(asset).await;
        tracing::debug!(asset = %asset, observations = observations.len(), "round collected");

        let now = Utc::now().timestamp_millis();
        let filtered = mad_filter(observations, DEFAULT_MAD_THRESHOLD);
        let prices: Vec<f64> = filtered.iter().map(|o| o.price).collect();
        let mut fused = median(&prices);

        if let Some(strategy) = &self.strategy {
            let mut guard = strategy.lock().expect("strategy lock poisoned");
            let input = StrategyInput {
                observations: &filtered,
                weights: None,
                best_bid: None,
                best_ask: None,
                external: None,
                now,
            };
            if let Some(quote) = guard.evaluate(&input) {
                fused = quote.price;
            }
        }

        if fused <= 0.0 {
            tracing::debug!(asset = %asset, "no usable observations this round");
            return None;
        }

        self.twap.add_observation(asset, fused, now);
        let twap = self.twap.get_twap(asset).unwrap_or(fused);

        // Collapse by source; BTreeMap keeps provenance order stable.
        let mut by_source: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
        for o in &filtered {
            by_source.entry(o.source).or_default().push(o.price);
        }
        let sources: Vec<SourceDetail> = by_source
            .into_iter()
            .map(|(source, prices)| SourceDetail {
                name: display_name(source),
                price: median(&prices),
                count: prices.len(),
                is_simulated: source == "mock",
            })
            .collect();

        let mut guard = self.last_prices.write().await;
        let previous = guard.get(&asset);
        let changed = match previous {
            None => true,
            Some(prev) if prev.price > 0.0 => {
                (fused - prev.price).abs() / prev.price >= self.change_threshold
            }
            Some(_) => true,
        };
        // Successive rounds must carry non-decreasing updatedAt even if the
        // wall clock steps backwards.
        let updated_at = previous.map_or(now, |p| p.updated_at.max(now));

        let record = AggregatedPrice {
            asset_id: asset,
            price: fused,
            twap,
            price_int: to_price_int(fused),
            source_count: sources.len(),
            timestamp: now,
            updated_at,
            currency: "USD",
            sources,
        };
        guard.insert(asset, record.clone());
        drop(guard);

        if changed {
            tracing::info!(
                asset = %asset,
                price = fused,
                twap,
                sources = record.source_count,
                "💹 price updated"
            );
        }

        Some(PriceUpdate { record, changed })
    }

    /// Run a round for every catalog asset. Per-asset failures never abort
    /// the sweep.
    pub async fn update_all_prices(&self) -> Vec<PriceUpdate> {
        let mut updates = Vec::with_capacity(Asset::all().len());
        for asset in Asset::all() {
            if let Some(update) = self.update_price(*asset).await {
                updates.push(update);
            }
        }
        updates
    }

    pub async fn get_price(&self, asset: Asset) -> Option<AggregatedPrice> {
        self.last_prices.read().await.get(&asset).cloned()
    }

    /// Snapshot copy of every current price.
    pub async fn get_all_prices(&self) -> HashMap<Asset, AggregatedPrice> {
        self.last_prices.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::error::AdapterError;
    use crate::twap::DEFAULT_WINDOW_MS;
    use async_trait::async_trait;

    /// Fixture adapter returning a fixed price list every round.
    struct FixtureAdapter {
        name: &'static str,
        prices: Vec<f64>,
    }

    #[async_trait]
    impl SourceAdapter for FixtureAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn fetch_prices(&self, asset: Asset) -> Result<Vec<Observation>, AdapterError> {
            let now = Utc::now().timestamp_millis();
            Ok(self
                .prices
                .iter()
                .map(|p| Observation::new(asset, *p, self.name, now))
                .collect())
        }
    }

    /// Fixture adapter that always fails.
    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn fetch_prices(&self, _asset: Asset) -> Result<Vec<Observation>, AdapterError> {
            Err(AdapterError::fetch_failed("failing", "always down"))
        }
    }

    fn fixture(name: &'static str, prices: &[f64]) -> Arc<dyn SourceAdapter> {
        Arc::new(FixtureAdapter {
            name,
            prices: prices.to_vec(),
        })
    }

    fn oracle(adapters: Vec<Arc<dyn SourceAdapter>>) -> PriceOracle {
        PriceOracle::new(adapters, DEFAULT_WINDOW_MS, DEFAULT_CHANGE_THRESHOLD)
    }

    #[tokio::test]
    async fn test_three_source_median_fusion() {
        let oracle = oracle(vec![
            fixture("ebay", &[1599.99]),
            fixture("bestbuy", &[1605.0, 1610.0]),
            fixture("amazon", &[1598.0]),
        ]);

        let update = oracle.update_price(Asset::Rtx4090).await.unwrap();
        let record = update.record;

        assert_eq!(record.source_count, 3);
        assert!((record.price - 1602.495).abs() < 1e-9);
        assert_eq!(record.price_int, 160_249_500_000);

        let by_name: HashMap<String, f64> = record
            .sources
            .iter()
            .map(|s| (s.name.clone(), s.price))
            .collect();
        assert_eq!(by_name["eBay"], 1599.99);
        assert_eq!(by_name["Best Buy API"], 1607.5);
        assert_eq!(by_name["Amazon API"], 1598.0);
    }

    #[tokio::test]
    async fn test_outlier_rejected_before_fusion() {
        let oracle = oracle(vec![
            fixture("a", &[1199.0, 1201.0, 1200.0]),
            fixture("b", &[1198.0, 1202.0, 9999.0]),
        ]);

        let update = oracle.update_price(Asset::Rtx4080).await.unwrap();
        assert_eq!(update.record.price, 1200.0);
    }

    #[tokio::test]
    async fn test_identical_prices_fuse_to_that_price() {
        let oracle = oracle(vec![fixture("a", &[750.0, 750.0]), fixture("b", &[750.0])]);
        let update = oracle.update_price(Asset::Rtx4070Ti).await.unwrap();
        assert_eq!(update.record.price, 750.0);
        assert_eq!(update.record.twap, 750.0);
    }

    #[tokio::test]
    async fn test_no_duplicate_source_names() {
        let oracle = oracle(vec![
            fixture("a", &[100.0, 101.0]),
            fixture("b", &[100.5, 99.5]),
        ]);
        let update = oracle.update_price(Asset::Ddr5Kit32).await.unwrap();
        let mut names: Vec<&str> = update.record.sources.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), update.record.sources.len());
    }

    #[tokio::test]
    async fn test_price_int_invariant() {
        let oracle = oracle(vec![fixture("a", &[93.37, 95.11, 94.02])]);
        let update = oracle.update_price(Asset::Ddr5Kit32).await.unwrap();
        assert_eq!(update.record.price_int, to_price_int(update.record.price));
        assert!(update.record.price_int > 0);
    }

    #[tokio::test]
    async fn test_adapter_failure_does_not_abort_round() {
        let oracle = oracle(vec![Arc::new(FailingAdapter), fixture("a", &[500.0])]);
        let update = oracle.update_price(Asset::Rtx4080).await.unwrap();
        assert_eq!(update.record.price, 500.0);
        assert_eq!(update.record.source_count, 1);
    }

    #[tokio::test]
    async fn test_all_adapters_failing_keeps_last_value() {
        let good = oracle(vec![fixture("a", &[800.0])]);
        good.update_price(Asset::Rtx4080).await.unwrap();
        let before = good.get_price(Asset::Rtx4080).await.unwrap();

        // Same oracle, but pretend the next round yields nothing usable:
        // a failing-only oracle never installs anything.
        let bad = oracle(vec![Arc::new(FailingAdapter)]);
        assert!(bad.update_price(Asset::Rtx4080).await.is_none());
        assert!(bad.get_price(Asset::Rtx4080).await.is_none());

        // And the good oracle still serves its last value.
        let after = good.get_price(Asset::Rtx4080).await.unwrap();
        assert_eq!(before.price, after.price);
        assert_eq!(before.timestamp, after.timestamp);
    }

    #[tokio::test]
    async fn test_change_detection_threshold() {
        let oracle = oracle(vec![fixture("a", &[1000.0])]);
        let first = oracle.update_price(Asset::Rtx4090).await.unwrap();
        assert!(first.changed);

        // Identical round: well under the 0.5% threshold.
        let second = oracle.update_price(Asset::Rtx4090).await.unwrap();
        assert!(!second.changed);
    }

    #[tokio::test]
    async fn test_updated_at_monotonic() {
        let oracle = oracle(vec![fixture("a", &[1000.0])]);
        let mut last = 0;
        for _ in 0..5 {
            let update = oracle.update_price(Asset::Rtx4090).await.unwrap();
            assert!(update.record.updated_at >= last);
            last = update.record.updated_at;
        }
    }

    #[tokio::test]
    async fn test_seeded_mock_rounds_are_reproducible() {
        let a = oracle(vec![Arc::new(MockAdapter::seeded(0.015, 1234))]);
        let b = oracle(vec![Arc::new(MockAdapter::seeded(0.015, 1234))]);

        let ua = a.update_price(Asset::Rtx4090).await.unwrap();
        let ub = b.update_price(Asset::Rtx4090).await.unwrap();
        assert_eq!(ua.record.price, ub.record.price);
        assert_eq!(ua.record.sources.len(), ub.record.sources.len());
        assert!(ua.record.sources[0].is_simulated);
        assert_eq!(ua.record.sources[0].name, "Simulated");
    }

    #[tokio::test]
    async fn test_update_all_covers_catalog() {
        let oracle = oracle(vec![fixture("a", &[100.0, 101.0, 99.0])]);
        let updates = oracle.update_all_prices().await;
        assert_eq!(updates.len(), Asset::all().len());
        let all = oracle.get_all_prices().await;
        assert_eq!(all.len(), Asset::all().len());
    }
}
