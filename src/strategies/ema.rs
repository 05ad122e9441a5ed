//! EMA-smoothed pricing
//!
//! Maintains an exponential moving average of a mark price with an alpha
//! derived from the inter-sample interval, so irregular update cadences
//! still decay at the configured window. Output blends an external
//! reference with the EMA when one is present.

use crate::filters::median;

use super::{PricingStrategy, StrategyInput, StrategyQuote};

/// Default smoothing window (2 hours).
const DEFAULT_WINDOW_MS: f64 = 7_200_000.0;
const DEFAULT_EXTERNAL_WEIGHT: f64 = 1.0 / 3.0;
const DEFAULT_MARK_WEIGHT: f64 = 2.0 / 3.0;

/// Confidence saturates after this many samples.
const CONFIDENCE_SATURATION_SAMPLES: f64 = 12.0;

#[derive(Debug, Clone, Copy)]
struct EmaState {
    last_ts: i64,
    value: f64,
}

pub struct EmaStrategy {
    pub window_ms: f64,
    pub external_weight: f64,
    pub mark_weight: f64,
    state: Option<EmaState>,
    samples: u64,
}

impl Default for EmaStrategy {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            external_weight: DEFAULT_EXTERNAL_WEIGHT,
            mark_weight: DEFAULT_MARK_WEIGHT,
            state: None,
            samples: 0,
        }
    }
}

impl EmaStrategy {
    /// Fold one mark sample into the EMA and return the updated value.
    fn update(&mut self, mark: f64, now: i64) -> f64 {
        let value = match self.state {
            None => mark,
            Some(state) => {
                let dt = (now - state.last_ts).max(0) as f64;
                let alpha = 1.0 - (-dt / (self.window_ms / 3.0)).exp();
                state.value + alpha * (mark - state.value)
            }
        };
        self.state = Some(EmaState {
            last_ts: now,
            value,
        });
        self.samples += 1;
        value
    }

    fn confidence(&self) -> f64 {
        (self.samples as f64 / CONFIDENCE_SATURATION_SAMPLES).clamp(0.3, 1.0)
    }

    /// Shared path for direct use and for the hybrid policy, which feeds a
    /// pre-fused mark.
    pub(crate) fn smooth(
        &mut self,
        mark: f64,
        external: Option<f64>,
        now: i64,
    ) -> StrategyQuote {
        let ema = self.update(mark, now);
        let price = match external {
            Some(ext) => self.external_weight * ext + self.mark_weight * ema,
            None => ema,
        };
        StrategyQuote {
            price,
            confidence: self.confidence(),
        }
    }
}

impl PricingStrategy for EmaStrategy {
    fn name(&self) -> &'static str {
        "ema"
    }

    fn evaluate(&mut self, input: &StrategyInput<'_>) -> Option<StrategyQuote> {
        let mark = if input.observations.is_empty() {
            input.external?
        } else {
            let prices: Vec<f64> = input.observations.iter().map(|o| o.price).collect();
            median(&prices)
        };
        if mark <= 0.0 {
            return None;
        }
        Some(self.smooth(mark, input.external, input.now))
    }
}
