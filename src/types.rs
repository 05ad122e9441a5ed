//! Core types used throughout the oracle
//!
//! Fixed asset catalogs, adapter observations, and the fused price records
//! served over HTTP.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Scale factor for the fixed-point integer price consumed downstream.
pub const PRICE_INT_SCALE: f64 = 1e8;

/// Tracked hardware assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    Rtx4090,
    Rtx4080,
    Rtx4070Ti,
    Ddr5Kit32,
    Ddr5Kit64,
}

impl Asset {
    /// All catalog members, in canonical order.
    pub fn all() -> &'static [Asset] {
        &[
            Asset::Rtx4090,
            Asset::Rtx4080,
            Asset::Rtx4070Ti,
            Asset::Ddr5Kit32,
            Asset::Ddr5Kit64,
        ]
    }

    /// Stable identifier used in API paths, envelopes, and history rows.
    pub fn id(&self) -> &'static str {
        match self {
            Asset::Rtx4090 => "GPU_RTX4090",
            Asset::Rtx4080 => "GPU_RTX4080",
            Asset::Rtx4070Ti => "GPU_RTX4070TI",
            Asset::Ddr5Kit32 => "RAM_DDR5_32",
            Asset::Ddr5Kit64 => "RAM_DDR5_64",
        }
    }

    /// Parse from the stable identifier.
    pub fn from_id(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GPU_RTX4090" => Some(Asset::Rtx4090),
            "GPU_RTX4080" => Some(Asset::Rtx4080),
            "GPU_RTX4070TI" => Some(Asset::Rtx4070Ti),
            "RAM_DDR5_32" => Some(Asset::Ddr5Kit32),
            "RAM_DDR5_64" => Some(Asset::Ddr5Kit64),
            _ => None,
        }
    }

    /// Primary search query sent to marketplace APIs and scrapers.
    pub fn search_query(&self) -> &'static str {
        match self {
            Asset::Rtx4090 => "GeForce RTX 4090 graphics card",
            Asset::Rtx4080 => "GeForce RTX 4080 graphics card",
            Asset::Rtx4070Ti => "GeForce RTX 4070 Ti graphics card",
            Asset::Ddr5Kit32 => "DDR5 32GB desktop memory kit",
            Asset::Ddr5Kit64 => "DDR5 64GB desktop memory kit",
        }
    }

    /// Model token a listing title must contain to be considered relevant.
    pub fn model_token(&self) -> &'static str {
        match self {
            Asset::Rtx4090 => "4090",
            Asset::Rtx4080 => "4080",
            Asset::Rtx4070Ti => "4070 ti",
            Asset::Ddr5Kit32 => "32gb",
            Asset::Ddr5Kit64 => "64gb",
        }
    }

    /// Family keywords, at least one of which must appear in the title.
    pub fn family_tokens(&self) -> &'static [&'static str] {
        match self {
            Asset::Rtx4090 | Asset::Rtx4080 | Asset::Rtx4070Ti => &["rtx", "geforce"],
            Asset::Ddr5Kit32 | Asset::Ddr5Kit64 => &["ddr5"],
        }
    }

    /// Nominal street price, anchor for the mock adapter's walk.
    pub fn base_price(&self) -> f64 {
        match self {
            Asset::Rtx4090 => 1799.0,
            Asset::Rtx4080 => 1099.0,
            Asset::Rtx4070Ti => 749.0,
            Asset::Ddr5Kit32 => 94.99,
            Asset::Ddr5Kit64 => 189.99,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Asset::from_id(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown asset id: {raw}")))
    }
}

/// Rental GPU types tracked on the cloud marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuType {
    Rtx4090,
    Rtx3090,
    A100Sxm,
    H100Sxm,
    RtxA6000,
}

impl GpuType {
    pub fn all() -> &'static [GpuType] {
        &[
            GpuType::Rtx4090,
            GpuType::Rtx3090,
            GpuType::A100Sxm,
            GpuType::H100Sxm,
            GpuType::RtxA6000,
        ]
    }

    /// Stable identifier used in API paths and history rows.
    pub fn id(&self) -> &'static str {
        match self {
            GpuType::Rtx4090 => "RTX_4090",
            GpuType::Rtx3090 => "RTX_3090",
            GpuType::A100Sxm => "A100_SXM",
            GpuType::H100Sxm => "H100_SXM",
            GpuType::RtxA6000 => "RTX_A6000",
        }
    }

    pub fn from_id(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "RTX_4090" => Some(GpuType::Rtx4090),
            "RTX_3090" => Some(GpuType::Rtx3090),
            "A100_SXM" => Some(GpuType::A100Sxm),
            "H100_SXM" => Some(GpuType::H100Sxm),
            "RTX_A6000" => Some(GpuType::RtxA6000),
            _ => None,
        }
    }

    /// Display query matched against the marketplace `gpu_name` field.
    pub fn query(&self) -> &'static str {
        match self {
            GpuType::Rtx4090 => "RTX 4090",
            GpuType::Rtx3090 => "RTX 3090",
            GpuType::A100Sxm => "A100 SXM4",
            GpuType::H100Sxm => "H100 SXM5",
            GpuType::RtxA6000 => "RTX A6000",
        }
    }

    /// Nominal VRAM in GB.
    pub fn vram_gb(&self) -> u32 {
        match self {
            GpuType::Rtx4090 => 24,
            GpuType::Rtx3090 => 24,
            GpuType::A100Sxm => 80,
            GpuType::H100Sxm => 80,
            GpuType::RtxA6000 => 48,
        }
    }

    /// Typical per-GPU hourly rate, anchor for fabricated fallback offers.
    pub fn default_hourly(&self) -> f64 {
        match self {
            GpuType::Rtx4090 => 0.44,
            GpuType::Rtx3090 => 0.22,
            GpuType::A100Sxm => 1.10,
            GpuType::H100Sxm => 2.49,
            GpuType::RtxA6000 => 0.55,
        }
    }
}

impl fmt::Display for GpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for GpuType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for GpuType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        GpuType::from_id(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown gpu type: {raw}")))
    }
}

/// Listing condition, derived from marketplace metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
    Refurbished,
}

impl Condition {
    /// Loose parse from marketplace condition strings ("New", "NEW_OTHER",
    /// "Seller refurbished", ...).
    pub fn from_listing(s: &str) -> Condition {
        let lower = s.to_lowercase();
        if lower.contains("refurb") {
            Condition::Refurbished
        } else if lower.contains("used") || lower.contains("pre-owned") || lower.contains("open box")
        {
            Condition::Used
        } else {
            Condition::New
        }
    }
}

/// Optional listing metadata carried on an observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingMeta {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    pub condition: Condition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single timestamped price reading from one adapter.
///
/// Immutable once emitted; observations from different adapters are never
/// combined before outlier filtering.
#[derive(Debug, Clone)]
pub struct Observation {
    pub asset: Asset,
    /// Price in USD, always > 0.
    pub price: f64,
    /// Adapter name (stable lowercase form, e.g. `newegg-scraper`).
    pub source: &'static str,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub meta: Option<ListingMeta>,
}

impl Observation {
    pub fn new(asset: Asset, price: f64, source: &'static str, timestamp: i64) -> Self {
        Self {
            asset,
            price,
            source,
            timestamp,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ListingMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Per-source summary after one aggregation round
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetail {
    /// Display form of the adapter name (e.g. "Newegg").
    pub name: String,
    /// Median of this source's observations this round.
    pub price: f64,
    pub count: usize,
    pub is_simulated: bool,
}

pub(crate) fn price_int_as_string<S: Serializer>(v: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&v.to_string())
}

/// Current fused price for one hardware asset.
///
/// Replaced atomically each successful round; readers never observe a
/// partially updated record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPrice {
    pub asset_id: Asset,
    /// Fused USD price (median of filtered observations).
    pub price: f64,
    /// Time-weighted average over the configured window.
    pub twap: f64,
    /// `round(price * 1e8)`, the scalar consumed by the downstream feed.
    /// Serialized as a string to survive JSON number precision limits.
    #[serde(serialize_with = "price_int_as_string")]
    pub price_int: i64,
    pub source_count: usize,
    pub timestamp: i64,
    pub updated_at: i64,
    pub currency: &'static str,
    pub sources: Vec<SourceDetail>,
}

/// Compute the downstream fixed-point integer for a USD price.
pub fn to_price_int(price: f64) -> i64 {
    (price * PRICE_INT_SCALE).round() as i64
}

/// Provider class of a rental offer host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderClass {
    Verified,
    Community,
}

/// One normalized rental offer from the marketplace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalOffer {
    pub gpu_count: u32,
    pub price_per_hour: f64,
    pub price_per_gpu_hour: f64,
    /// Host reliability score in [0, 1].
    pub reliability: f64,
    pub provider_class: ProviderClass,
    /// True iff the offer carries a minimum-bid field (spot-style pricing).
    pub interruptible: bool,
}

/// Fused per-type rental statistics for the current round
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalPriceStats {
    pub gpu_type: GpuType,
    pub min_price: f64,
    pub max_price: f64,
    pub median_price: f64,
    pub avg_price: f64,
    pub offer_count: usize,
    pub interruptible_avg: f64,
    pub on_demand_avg: f64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_roundtrip() {
        for asset in Asset::all() {
            assert_eq!(Asset::from_id(asset.id()), Some(*asset));
        }
        assert_eq!(Asset::from_id("gpu_rtx4090"), Some(Asset::Rtx4090));
        assert_eq!(Asset::from_id("GPU_RTX9999"), None);
    }

    #[test]
    fn test_gpu_type_roundtrip() {
        for gpu in GpuType::all() {
            assert_eq!(GpuType::from_id(gpu.id()), Some(*gpu));
        }
        assert_eq!(GpuType::from_id("T4"), None);
    }

    #[test]
    fn test_price_int_scaling() {
        assert_eq!(to_price_int(1599.99), 159_999_000_000);
        assert_eq!(to_price_int(1602.495), 160_249_500_000);
        assert_eq!(to_price_int(0.0), 0);
    }

    #[test]
    fn test_condition_from_listing() {
        assert_eq!(Condition::from_listing("New"), Condition::New);
        assert_eq!(Condition::from_listing("NEW_OTHER"), Condition::New);
        assert_eq!(
            Condition::from_listing("Seller refurbished"),
            Condition::Refurbished
        );
        assert_eq!(Condition::from_listing("Used - Like New"), Condition::Used);
    }

    #[test]
    fn test_aggregated_price_serializes_price_int_as_string() {
        let record = AggregatedPrice {
            asset_id: Asset::Rtx4090,
            price: 1599.99,
            twap: 1599.99,
            price_int: to_price_int(1599.99),
            source_count: 1,
            timestamp: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            currency: "USD",
            sources: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["priceInt"], "159999000000");
        assert_eq!(json["assetId"], "GPU_RTX4090");
        assert_eq!(json["currency"], "USD");
    }
}
