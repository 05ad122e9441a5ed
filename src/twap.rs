//! Time-weighted average price
//!
//! Per-asset rolling window of `(timestamp, price)` observations. Each price
//! is weighted by the duration it prevailed; the last observation is
//! extended forward to the evaluation instant. Observations are pruned
//! lazily on every operation.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::Asset;

/// Default rolling window (5 minutes).
pub const DEFAULT_WINDOW_MS: i64 = 300_000;

#[derive(Debug, Clone, Copy)]
struct TwapObservation {
    timestamp: i64,
    price: f64,
}

/// Rolling-window TWAP calculator, safe for concurrent rounds on distinct
/// assets.
pub struct TwapCalculator {
    window_ms: i64,
    windows: Mutex<HashMap<Asset, Vec<TwapObservation>>>,
}

impl TwapCalculator {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Append an observation, then prune everything older than the window.
    ///
    /// Callers must supply timestamps that are non-decreasing per asset.
    pub fn add_observation(&self, asset: Asset, price: f64, timestamp: i64) {
        self.add_observation_at(asset, price, timestamp, Self::now_ms());
    }

    pub(crate) fn add_observation_at(&self, asset: Asset, price: f64, timestamp: i64, now: i64) {
        let mut windows = self.windows.lock().expect("twap lock poisoned");
        let window = windows.entry(asset).or_default();
        window.push(TwapObservation { timestamp, price });
        let cutoff = now - self.window_ms;
        window.retain(|o| o.timestamp >= cutoff);
    }

    /// Time-weighted average over the current window, or `None` when the
    /// window is empty after pruning.
    pub fn get_twap(&self, asset: Asset) -> Option<f64> {
        self.get_twap_at(asset, Self::now_ms())
    }

    pub(crate) fn get_twap_at(&self, asset: Asset, now: i64) -> Option<f64> {
        let mut windows = self.windows.lock().expect("twap lock poisoned");
        let window = windows.get_mut(&asset)?;
        let cutoff = now - self.window_ms;
        window.retain(|o| o.timestamp >= cutoff);

        match window.len() {
            0 => None,
            1 => Some(window[0].price),
            _ => {
                let mut sorted = window.clone();
                sorted.sort_by_key(|o| o.timestamp);

                let mut weighted_sum = 0.0;
                let mut total_weight = 0.0;
                for pair in sorted.windows(2) {
                    let width = (pair[1].timestamp - pair[0].timestamp) as f64;
                    weighted_sum += pair[0].price * width;
                    total_weight += width;
                }

                // The most recent price prevails until now.
                let last = sorted[sorted.len() - 1];
                let tail = (now - last.timestamp) as f64;
                weighted_sum += last.price * tail;
                total_weight += tail;

                if total_weight <= 0.0 {
                    Some(last.price)
                } else {
                    Some(weighted_sum / total_weight)
                }
            }
        }
    }

    /// Most recent observation in the window.
    pub fn get_spot_price(&self, asset: Asset) -> Option<f64> {
        self.get_spot_price_at(asset, Self::now_ms())
    }

    pub(crate) fn get_spot_price_at(&self, asset: Asset, now: i64) -> Option<f64> {
        let mut windows = self.windows.lock().expect("twap lock poisoned");
        let window = windows.get_mut(&asset)?;
        let cutoff = now - self.window_ms;
        window.retain(|o| o.timestamp >= cutoff);
        window
            .iter()
            .max_by_key(|o| o.timestamp)
            .map(|o| o.price)
    }

    pub fn clear(&self, asset: Asset) {
        self.windows
            .lock()
            .expect("twap lock poisoned")
            .remove(&asset);
    }

    pub fn clear_all(&self) {
        self.windows.lock().expect("twap lock poisoned").clear();
    }
}

impl Default for TwapCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: i64 = 300_000;

    #[test]
    fn test_empty_window_is_none() {
        let twap = TwapCalculator::new(W);
        assert_eq!(twap.get_twap_at(Asset::Rtx4090, 1_000), None);
    }

    #[test]
    fn test_single_observation_returns_price() {
        let twap = TwapCalculator::new(W);
        twap.add_observation_at(Asset::Rtx4090, 1500.0, 0, 0);
        assert_eq!(twap.get_twap_at(Asset::Rtx4090, 1_000), Some(1500.0));
    }

    #[test]
    fn test_heterogeneous_durations() {
        // 1000 for 120s, 1100 for 60s, evaluated at t=180s.
        let twap = TwapCalculator::new(W);
        twap.add_observation_at(Asset::Rtx4090, 1000.0, 0, 0);
        twap.add_observation_at(Asset::Rtx4090, 1100.0, 120_000, 120_000);

        let value = twap.get_twap_at(Asset::Rtx4090, 180_000).unwrap();
        let expected = (1000.0 * 120_000.0 + 1100.0 * 60_000.0) / 180_000.0;
        assert!((value - expected).abs() < 1e-9);
        assert!((value - 1033.3333).abs() < 0.001);

        assert_eq!(twap.get_spot_price_at(Asset::Rtx4090, 180_000), Some(1100.0));
    }

    #[test]
    fn test_prunes_outside_window() {
        let twap = TwapCalculator::new(W);
        twap.add_observation_at(Asset::Rtx4090, 900.0, 0, 0);
        twap.add_observation_at(Asset::Rtx4090, 1000.0, 400_000, 400_000);
        // The t=0 observation is now outside the 300s window.
        assert_eq!(twap.get_twap_at(Asset::Rtx4090, 400_000), Some(1000.0));
    }

    #[test]
    fn test_zero_total_weight_returns_last() {
        let twap = TwapCalculator::new(W);
        twap.add_observation_at(Asset::Rtx4090, 10.0, 5_000, 5_000);
        twap.add_observation_at(Asset::Rtx4090, 20.0, 5_000, 5_000);
        assert_eq!(twap.get_twap_at(Asset::Rtx4090, 5_000), Some(20.0));
    }

    #[test]
    fn test_assets_are_independent() {
        let twap = TwapCalculator::new(W);
        twap.add_observation_at(Asset::Rtx4090, 1800.0, 0, 0);
        twap.add_observation_at(Asset::Ddr5Kit32, 95.0, 0, 0);
        twap.clear(Asset::Rtx4090);
        assert_eq!(twap.get_twap_at(Asset::Rtx4090, 1_000), None);
        assert_eq!(twap.get_twap_at(Asset::Ddr5Kit32, 1_000), Some(95.0));
    }
}
