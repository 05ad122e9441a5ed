//! Illiquid-asset pricing policies
//!
//! Three composable policies behind one "compute a canonical price from
//! many observations" intent, selected by configuration. None of them is
//! on the default path; the aggregator uses a plain median unless a policy
//! is configured.

mod ema;
mod hybrid;
mod multi_component;

pub use ema::EmaStrategy;
pub use hybrid::HybridStrategy;
pub use multi_component::MultiComponentStrategy;

use crate::types::Observation;

/// Inputs available to a pricing policy for one round.
pub struct StrategyInput<'a> {
    /// Outlier-filtered observations for this round.
    pub observations: &'a [Observation],
    /// Optional per-observation weights, aligned by index; absent means
    /// uniform weighting.
    pub weights: Option<&'a [f64]>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    /// External reference price, when one exists.
    pub external: Option<f64>,
    pub now: i64,
}

/// A policy's output for one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyQuote {
    pub price: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

pub trait PricingStrategy: Send {
    fn name(&self) -> &'static str;

    /// Compute a quote, or `None` when the inputs cannot support one.
    fn evaluate(&mut self, input: &StrategyInput<'_>) -> Option<StrategyQuote>;
}

/// Resolve a policy by its configuration name.
pub fn from_config(name: &str) -> Option<Box<dyn PricingStrategy>> {
    match name.trim().to_lowercase().as_str() {
        "multi-component" | "multi_component" => {
            Some(Box::new(MultiComponentStrategy::default()))
        }
        "ema" => Some(Box::new(EmaStrategy::default())),
        "hybrid" => Some(Box::new(HybridStrategy::default())),
        _ => None,
    }
}
