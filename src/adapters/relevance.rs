//! Listing relevance checks
//!
//! Marketplace searches return plenty of near-miss results: cables for the
//! card, mounts, waterblocks, single sticks instead of kits. Every adapter
//! runs its listings through the same title predicate and price floor
//! before emitting observations.

use crate::types::Asset;

/// Hardware listings below this price are accessories or scams, not units.
pub const MIN_HARDWARE_PRICE_USD: f64 = 50.0;

/// Obvious accessory keywords that disqualify a listing outright.
const ACCESSORY_BLACKLIST: &[&str] = &[
    "cable",
    "adapter",
    "mount",
    "bracket",
    "riser",
    "waterblock",
    "water block",
    "backplate",
    "shroud",
    "sticker",
    "holder",
    "stand",
    "extension",
    "connector",
    "thermal pad",
    "anti-sag",
    "box only",
    "for parts",
];

/// True iff `title` plausibly describes the asset itself: it must contain
/// the model identifier and a family keyword, and must not hit the
/// accessory blacklist.
pub fn is_relevant(asset: Asset, title: &str) -> bool {
    let lower = title.to_lowercase();

    if !lower.contains(asset.model_token()) {
        return false;
    }
    if !asset.family_tokens().iter().any(|t| lower.contains(t)) {
        return false;
    }
    !ACCESSORY_BLACKLIST.iter().any(|word| lower.contains(word))
}

/// Hardware price floor.
pub fn passes_floor(price: f64) -> bool {
    price >= MIN_HARDWARE_PRICE_USD
}
