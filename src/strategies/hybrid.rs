//! Hybrid policy
//!
//! Runs the multi-component fusion first and feeds its output as the mark
//! into the EMA smoother. The emitted price is the EMA output; confidence
//! blends both stages.

use super::{EmaStrategy, MultiComponentStrategy, PricingStrategy, StrategyInput, StrategyQuote};

const MULTI_CONFIDENCE_WEIGHT: f64 = 0.6;
const EMA_CONFIDENCE_WEIGHT: f64 = 0.4;

pub struct HybridStrategy {
    multi: MultiComponentStrategy,
    ema: EmaStrategy,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self {
            multi: MultiComponentStrategy::default(),
            ema: EmaStrategy::default(),
        }
    }
}

impl PricingStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn evaluate(&mut self, input: &StrategyInput<'_>) -> Option<StrategyQuote> {
        let multi = self.multi.evaluate(input)?;
        let smoothed = self.ema.smooth(multi.price, input.external, input.now);
        Some(StrategyQuote {
            price: smoothed.price,
            confidence: MULTI_CONFIDENCE_WEIGHT * multi.confidence
                + EMA_CONFIDENCE_WEIGHT * smoothed.confidence,
        })
    }
}
