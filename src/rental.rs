//! Rental price service
//!
//! Fuses marketplace offers into per-type statistics behind a short TTL
//! cache, and appends each refresh to the history store in the background.
//! On a cache miss, recent history rows are preferred over a fresh
//! marketplace sweep when every GPU type has one.

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adapters::{RentalFetch, RentalMarketplaceAdapter};
use crate::filters::median;
use crate::history::{HistoryQuery, HistoryStore, RentalHistoryRecord};
use crate::types::{GpuType, RentalOffer, RentalPriceStats};

/// How long a fused rental snapshot stays servable.
pub const CACHE_TTL_MS: i64 = 60_000;

/// History rows older than one sweep interval are not worth serving.
pub const HISTORY_FRESHNESS_MS: i64 = 300_000;

/// Where the served data came from this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RentalDataSource {
    /// Restored from recent history-store rows.
    Supabase,
    /// At least one type fell back to fabricated offers.
    Simulated,
    /// Fetched live from the marketplace.
    OracleService,
}

/// One fused rental round across all GPU types.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalSnapshot {
    pub stats: Vec<RentalPriceStats>,
    pub source: RentalDataSource,
    pub fetched_at: i64,
}

/// Compute per-type statistics from one round's offers.
pub fn compute_stats(gpu: GpuType, offers: &[RentalOffer], now: i64) -> RentalPriceStats {
    let per_gpu: Vec<f64> = offers.iter().map(|o| o.price_per_gpu_hour).collect();

    let avg = |values: &[f64]| -> f64 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let interruptible: Vec<f64> = offers
        .iter()
        .filter(|o| o.interruptible)
        .map(|o| o.price_per_gpu_hour)
        .collect();
    let on_demand: Vec<f64> = offers
        .iter()
        .filter(|o| !o.interruptible)
        .map(|o| o.price_per_gpu_hour)
        .collect();

    let min_price = if per_gpu.is_empty() {
        0.0
    } else {
        per_gpu.iter().cloned().fold(f64::INFINITY, f64::min)
    };

    RentalPriceStats {
        gpu_type: gpu,
        min_price,
        max_price: per_gpu.iter().cloned().fold(0.0, f64::max),
        median_price: median(&per_gpu),
        avg_price: avg(&per_gpu),
        offer_count: offers.len(),
        interruptible_avg: avg(&interruptible),
        on_demand_avg: avg(&on_demand),
        timestamp: now,
    }
}

/// Rebuild per-type stats from a persisted row. The row carries no
/// median; the average stands in for it.
fn stats_from_record(row: &RentalHistoryRecord) -> RentalPriceStats {
    RentalPriceStats {
        gpu_type: row.gpu_type,
        min_price: row.min_price,
        max_price: row.max_price,
        median_price: row.avg_price,
        avg_price: row.avg_price,
        offer_count: row.offer_count.max(0) as usize,
        interruptible_avg: row.interruptible_avg,
        on_demand_avg: row.on_demand_avg,
        timestamp: row.timestamp,
    }
}

/// Newest row per type, rebuilt into stats; `None` unless every GPU type
/// is represented.
fn stats_from_history(rows: &[RentalHistoryRecord]) -> Option<Vec<RentalPriceStats>> {
    let mut latest: HashMap<GpuType, &RentalHistoryRecord> = HashMap::new();
    for row in rows {
        let entry = latest.entry(row.gpu_type).or_insert(row);
        if row.timestamp > entry.timestamp {
            *entry = row;
        }
    }
    GpuType::all()
        .iter()
        .map(|gpu| latest.get(gpu).map(|row| stats_from_record(row)))
        .collect()
}

pub struct RentalService {
    adapter: RentalMarketplaceAdapter,
    cache: RwLock<Option<RentalSnapshot>>,
    history: Option<Arc<HistoryStore>>,
}

impl RentalService {
    pub fn new(adapter: RentalMarketplaceAdapter, history: Option<Arc<HistoryStore>>) -> Self {
        Self {
            adapter,
            cache: RwLock::new(None),
            history,
        }
    }

    /// Serve the cached snapshot when fresh; on a miss prefer recent
    /// history rows, then fall back to a live marketplace refresh. The
    /// bool is true on a cache hit.
    pub async fn get_prices(&self) -> (RentalSnapshot, bool) {
        let now = chrono::Utc::now().timestamp_millis();
        if let Some(snapshot) = self.cache.read().await.as_ref() {
            if now - snapshot.fetched_at < CACHE_TTL_MS {
                return (snapshot.clone(), true);
            }
        }
        if let Some(snapshot) = self.load_from_history(now).await {
            *self.cache.write().await = Some(snapshot.clone());
            return (snapshot, false);
        }
        (self.refresh().await, false)
    }

    /// Snapshot rebuilt from history rows written within the freshness
    /// window; `None` when the store is unconfigured, unreachable, or
    /// missing a type.
    async fn load_from_history(&self, now: i64) -> Option<RentalSnapshot> {
        let store = self.history.as_ref()?;
        let query = HistoryQuery {
            series: None,
            start_time: Some(now - HISTORY_FRESHNESS_MS),
            end_time: None,
            limit: Some(GpuType::all().len() * 8),
        };
        let rows = match store.query_rental(&query).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::debug!(error = %err, "history-backed rental read failed");
                return None;
            }
        };
        let stats = stats_from_history(&rows)?;
        tracing::debug!(types = stats.len(), "rental prices restored from history");
        Some(RentalSnapshot {
            stats,
            source: RentalDataSource::Supabase,
            fetched_at: now,
        })
    }

    /// Fetch every GPU type, fuse stats, update the cache, and append
    /// history rows in the background. Persistence failures never fail the
    /// caller.
    pub async fn refresh(&self) -> RentalSnapshot {
        let now = chrono::Utc::now().timestamp_millis();

        let fetches = GpuType::all().iter().map(|gpu| {
            let gpu = *gpu;
            async move { (gpu, self.adapter.fetch_offers(gpu).await) }
        });
        let results: Vec<(GpuType, RentalFetch)> = join_all(fetches).await;

        let any_simulated = results.iter().any(|(_, fetch)| fetch.simulated);
        let stats: Vec<RentalPriceStats> = results
            .iter()
            .map(|(gpu, fetch)| compute_stats(*gpu, &fetch.offers, now))
            .collect();

        let snapshot = RentalSnapshot {
            stats: stats.clone(),
            source: if any_simulated {
                RentalDataSource::Simulated
            } else {
                RentalDataSource::OracleService
            },
            fetched_at: now,
        };
        *self.cache.write().await = Some(snapshot.clone());

        if let Some(store) = &self.history {
            for stat in stats {
                let store = store.clone();
                let record = RentalHistoryRecord::from(&stat);
                tokio::spawn(async move {
                    if let Err(err) = store.insert_rental(&record).await {
                        tracing::warn!(gpu = %record.gpu_type, error = %err, "rental history append failed");
                    }
                });
            }
        }

        tracing::info!(
            types = snapshot.stats.len(),
            source = ?snapshot.source,
            "🖥️ rental prices refreshed"
        );
        snapshot
    }

    /// Raw offers for one type, bypassing the cache.
    pub async fn get_offers(&self, gpu: GpuType) -> RentalFetch {
        self.adapter.fetch_offers(gpu).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderClass;

    fn offer(per_gpu: f64, interruptible: bool) -> RentalOffer {
        RentalOffer {
            gpu_count: 1,
            price_per_hour: per_gpu,
            price_per_gpu_hour: per_gpu,
            reliability: 0.95,
            provider_class: ProviderClass::Verified,
            interruptible,
        }
    }

    #[test]
    fn test_stats_split_interruptible_and_on_demand() {
        let offers = vec![
            offer(0.40, false),
            offer(0.50, false),
            offer(0.20, true),
            offer(0.30, true),
        ];
        let stats = compute_stats(GpuType::Rtx4090, &offers, 1000);
        assert_eq!(stats.offer_count, 4);
        assert_eq!(stats.min_price, 0.20);
        assert_eq!(stats.max_price, 0.50);
        assert!((stats.on_demand_avg - 0.45).abs() < 1e-9);
        assert!((stats.interruptible_avg - 0.25).abs() < 1e-9);
        assert!((stats.median_price - 0.35).abs() < 1e-9);
        assert_eq!(stats.timestamp, 1000);
    }

    #[test]
    fn test_stats_empty_offers() {
        let stats = compute_stats(GpuType::H100Sxm, &[], 5);
        assert_eq!(stats.offer_count, 0);
        assert_eq!(stats.median_price, 0.0);
        assert_eq!(stats.avg_price, 0.0);
        assert_eq!(stats.interruptible_avg, 0.0);
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_value(RentalDataSource::OracleService).unwrap(),
            "oracle-service"
        );
        assert_eq!(
            serde_json::to_value(RentalDataSource::Simulated).unwrap(),
            "simulated"
        );
        assert_eq!(
            serde_json::to_value(RentalDataSource::Supabase).unwrap(),
            "supabase"
        );
    }

    fn row(gpu: GpuType, timestamp: i64, avg: f64) -> RentalHistoryRecord {
        RentalHistoryRecord {
            gpu_type: gpu,
            timestamp,
            avg_price: avg,
            min_price: avg * 0.8,
            max_price: avg * 1.2,
            offer_count: 10,
            interruptible_avg: avg * 0.7,
            on_demand_avg: avg * 1.1,
        }
    }

    #[test]
    fn test_stats_from_history_requires_every_type() {
        let rows: Vec<RentalHistoryRecord> = GpuType::all()
            .iter()
            .map(|gpu| row(*gpu, 100, gpu.default_hourly()))
            .collect();
        let stats = stats_from_history(&rows).unwrap();
        assert_eq!(stats.len(), GpuType::all().len());

        // One type missing: no snapshot.
        assert!(stats_from_history(&rows[1..]).is_none());
        assert!(stats_from_history(&[]).is_none());
    }

    #[test]
    fn test_stats_from_history_picks_newest_row() {
        let mut rows: Vec<RentalHistoryRecord> = GpuType::all()
            .iter()
            .map(|gpu| row(*gpu, 100, 0.5))
            .collect();
        rows.push(row(GpuType::Rtx4090, 200, 0.9));

        let stats = stats_from_history(&rows).unwrap();
        let restored = stats
            .iter()
            .find(|s| s.gpu_type == GpuType::Rtx4090)
            .unwrap();
        assert_eq!(restored.timestamp, 200);
        assert_eq!(restored.avg_price, 0.9);
        // The persisted row has no median; the average stands in.
        assert_eq!(restored.median_price, 0.9);
        assert_eq!(restored.offer_count, 10);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        // The adapter will fail to reach the marketplace and fabricate
        // offers, which is fine for cache behavior.
        let adapter = RentalMarketplaceAdapter::with_base_url("http://127.0.0.1:1/unreachable");
        let service = RentalService::new(adapter, None);

        let (first, cached_first) = service.get_prices().await;
        assert!(!cached_first);
        assert_eq!(first.source, RentalDataSource::Simulated);

        let (second, cached_second) = service.get_prices().await;
        assert!(cached_second);
        assert_eq!(first.fetched_at, second.fetched_at);
    }
}
