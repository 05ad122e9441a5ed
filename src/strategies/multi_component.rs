//! Multi-component fusion
//!
//! Combines up to three independent price components by median:
//! a trade-weighted average, an exponentially time-decayed sales floor
//! over MAD-filtered observations, and the bid-ask mid when the market is
//! not crossed. Components that stray too far from the combined median are
//! winsorized before a final re-median.

use crate::filters::{mad_filter, median, DEFAULT_MAD_THRESHOLD};

use super::{PricingStrategy, StrategyInput, StrategyQuote};

/// Components deviating from the median by more than this fraction are
/// clamped to the edge of the band.
const DEFAULT_WINSOR_FRACTION: f64 = 0.05;
/// Half-life of the sales-floor decay (30 minutes).
const DEFAULT_FLOOR_HALF_LIFE_MS: f64 = 1_800_000.0;

pub struct MultiComponentStrategy {
    pub winsor_fraction: f64,
    pub floor_half_life_ms: f64,
}

impl Default for MultiComponentStrategy {
    fn default() -> Self {
        Self {
            winsor_fraction: DEFAULT_WINSOR_FRACTION,
            floor_half_life_ms: DEFAULT_FLOOR_HALF_LIFE_MS,
        }
    }
}

impl MultiComponentStrategy {
    fn trade_weighted(input: &StrategyInput<'_>) -> Option<f64> {
        let obs = input.observations;
        if obs.is_empty() {
            return None;
        }
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (i, o) in obs.iter().enumerate() {
            let w = input
                .weights
                .and_then(|ws| ws.get(i).copied())
                .unwrap_or(1.0);
            if w <= 0.0 {
                continue;
            }
            weighted += w * o.price;
            total += w;
        }
        (total > 0.0).then(|| weighted / total)
    }

    fn sales_floor(&self, input: &StrategyInput<'_>) -> Option<f64> {
        let filtered = mad_filter(input.observations.to_vec(), DEFAULT_MAD_THRESHOLD);
        if filtered.is_empty() {
            return None;
        }
        let mut weighted = 0.0;
        let mut total = 0.0;
        for o in &filtered {
            let age = (input.now - o.timestamp).max(0) as f64;
            let w = 0.5f64.powf(age / self.floor_half_life_ms);
            weighted += w * o.price;
            total += w;
        }
        if total > 0.0 {
            Some(weighted / total)
        } else {
            let prices: Vec<f64> = filtered.iter().map(|o| o.price).collect();
            Some(median(&prices))
        }
    }

    fn bid_ask_mid(input: &StrategyInput<'_>) -> Option<f64> {
        match (input.best_bid, input.best_ask) {
            // Crossed markets are noise, not signal.
            (Some(bid), Some(ask)) if bid <= ask && bid > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

impl PricingStrategy for MultiComponentStrategy {
    fn name(&self) -> &'static str {
        "multi-component"
    }

    fn evaluate(&mut self, input: &StrategyInput<'_>) -> Option<StrategyQuote> {
        let mut components: Vec<f64> = [
            Self::trade_weighted(input),
            self.sales_floor(input),
            Self::bid_ask_mid(input),
        ]
        .into_iter()
        .flatten()
        .collect();

        if components.is_empty() {
            return None;
        }

        let combined = median(&components);
        if combined <= 0.0 {
            return None;
        }

        // Winsorize stragglers, then re-median.
        for c in components.iter_mut() {
            let deviation = (*c - combined).abs() / combined;
            if deviation > self.winsor_fraction {
                *c = if *c > combined {
                    combined * (1.0 + self.winsor_fraction)
                } else {
                    combined * (1.0 - self.winsor_fraction)
                };
            }
        }
        let price = median(&components);

        let max = components.iter().cloned().fold(f64::MIN, f64::max);
        let min = components.iter().cloned().fold(f64::MAX, f64::min);
        let spread = max - min;
        // The spread term is measured against the combine-median the
        // components were winsorized around, not the re-medianed output.
        let confidence = 0.5 * (components.len() as f64 / 3.0).min(1.0)
            + 0.5 * (1.0 - spread / combined * 2.0).max(0.0);

        Some(StrategyQuote { price, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Asset, Observation};

    fn obs(prices: &[(f64, i64)]) -> Vec<Observation> {
        prices
            .iter()
            .map(|(p, t)| Observation::new(Asset::Rtx4090, *p, "test", *t))
            .collect()
    }

    #[test]
    fn test_identical_inputs_give_that_price() {
        let observations = obs(&[(1000.0, 0), (1000.0, 0), (1000.0, 0)]);
        let mut strategy = MultiComponentStrategy::default();
        let quote = strategy
            .evaluate(&StrategyInput {
                observations: &observations,
                weights: None,
                best_bid: Some(999.0),
                best_ask: Some(1001.0),
                external: None,
                now: 0,
            })
            .unwrap();
        assert!((quote.price - 1000.0).abs() < 1e-9);
        // Three agreeing components: full count factor, tiny spread.
        assert!(quote.confidence > 0.95);
    }

    #[test]
    fn test_crossed_market_drops_mid_component() {
        let observations = obs(&[(1000.0, 0), (1002.0, 0), (998.0, 0)]);
        let mut strategy = MultiComponentStrategy::default();
        let quote = strategy
            .evaluate(&StrategyInput {
                observations: &observations,
                weights: None,
                best_bid: Some(1100.0),
                best_ask: Some(900.0),
                external: None,
                now: 0,
            })
            .unwrap();
        // Only trade-weighted + sales floor remain.
        assert!(quote.confidence < 0.95);
        assert!((quote.price - 1000.0).abs() < 3.0);
    }

    #[test]
    fn test_confidence_formula_after_winsorization() {
        // Components come out 100 / 100 / 120; the mid is clamped to 105
        // while the combine-median stays 100.
        let observations = obs(&[(100.0, 0), (100.0, 0), (100.0, 0)]);
        let mut strategy = MultiComponentStrategy::default();
        let quote = strategy
            .evaluate(&StrategyInput {
                observations: &observations,
                weights: None,
                best_bid: Some(118.0),
                best_ask: Some(122.0),
                external: None,
                now: 0,
            })
            .unwrap();
        assert!((quote.price - 100.0).abs() < 1e-9);
        // 0.5 * min(3/3, 1) + 0.5 * (1 - 5/100 * 2)
        assert!((quote.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_weights_shift_trade_weighted_component() {
        let observations = obs(&[(100.0, 0), (200.0, 0), (100.0, 0)]);
        let weights = [10.0, 1.0, 10.0];
        let tw = MultiComponentStrategy::trade_weighted(&StrategyInput {
            observations: &observations,
            weights: Some(&weights),
            best_bid: None,
            best_ask: None,
            external: None,
            now: 0,
        })
        .unwrap();
        assert!(tw < 110.0);
    }

    #[test]
    fn test_no_observations_no_quote() {
        let mut strategy = MultiComponentStrategy::default();
        assert!(strategy
            .evaluate(&StrategyInput {
                observations: &[],
                weights: None,
                best_bid: None,
                best_ask: None,
                external: None,
                now: 0,
            })
            .is_none());
    }

    #[test]
    fn test_stale_observations_decay() {
        // A fresh 1100 should outweigh an hour-old 900 in the sales floor.
        let observations = obs(&[(900.0, 0), (1100.0, 3_600_000)]);
        let strategy = MultiComponentStrategy::default();
        let floor = strategy
            .sales_floor(&StrategyInput {
                observations: &observations,
                weights: None,
                best_bid: None,
                best_ask: None,
                external: None,
                now: 3_600_000,
            })
            .unwrap();
        assert!(floor > 1000.0);
    }
}
