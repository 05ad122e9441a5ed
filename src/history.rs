//! Append-only history store
//!
//! Time-series persistence for hardware and rental rounds, reached over a
//! PostgREST-compatible HTTP interface (Supabase). When unconfigured,
//! writes are no-ops and range queries answer 503 at the HTTP layer.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::types::{AggregatedPrice, Asset, GpuType, RentalPriceStats};

const HARDWARE_TABLE: &str = "hardware_price_history";
const RENTAL_TABLE: &str = "rental_price_history";

/// Default range-query row cap.
pub const DEFAULT_QUERY_LIMIT: usize = 1000;

/// Row cap when scanning for stats.
const STATS_SCAN_LIMIT: usize = 10_000;

/// One hardware round, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareHistoryRecord {
    pub asset_id: Asset,
    pub timestamp: i64,
    pub price: f64,
    pub twap: f64,
    pub source_count: i64,
}

impl From<&AggregatedPrice> for HardwareHistoryRecord {
    fn from(record: &AggregatedPrice) -> Self {
        Self {
            asset_id: record.asset_id,
            timestamp: record.timestamp,
            price: record.price,
            twap: record.twap,
            source_count: record.source_count as i64,
        }
    }
}

/// One rental round for one GPU type, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalHistoryRecord {
    pub gpu_type: GpuType,
    pub timestamp: i64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub offer_count: i64,
    pub interruptible_avg: f64,
    pub on_demand_avg: f64,
}

impl From<&RentalPriceStats> for RentalHistoryRecord {
    fn from(stats: &RentalPriceStats) -> Self {
        Self {
            gpu_type: stats.gpu_type,
            timestamp: stats.timestamp,
            avg_price: stats.avg_price,
            min_price: stats.min_price,
            max_price: stats.max_price,
            offer_count: stats.offer_count as i64,
            interruptible_avg: stats.interruptible_avg,
            on_demand_avg: stats.on_demand_avg,
        }
    }
}

/// Filtered range query over one series table.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Series key (asset id or GPU type id); absent means all series.
    pub series: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<usize>,
}

/// Aggregate shape served by `/rental/history/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalHistoryStats {
    pub total_records: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    pub per_type_counts: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    gpu_type: String,
    timestamp: i64,
}

fn range_params(series_column: &str, query: &HistoryQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), "timestamp.desc".to_string()),
        (
            "limit".to_string(),
            query.limit.unwrap_or(DEFAULT_QUERY_LIMIT).to_string(),
        ),
    ];
    if let Some(series) = &query.series {
        params.push((series_column.to_string(), format!("eq.{series}")));
    }
    if let Some(start) = query.start_time {
        params.push(("timestamp".to_string(), format!("gte.{start}")));
    }
    if let Some(end) = query.end_time {
        params.push(("timestamp".to_string(), format!("lte.{end}")));
    }
    params
}

fn stats_from_rows(rows: &[StatsRow]) -> RentalHistoryStats {
    let mut per_type_counts: HashMap<String, usize> = HashMap::new();
    for row in rows {
        *per_type_counts.entry(row.gpu_type.clone()).or_default() += 1;
    }
    RentalHistoryStats {
        total_records: rows.len(),
        oldest_timestamp: rows.iter().map(|r| r.timestamp).min(),
        newest_timestamp: rows.iter().map(|r| r.timestamp).max(),
        per_type_counts,
    }
}

pub struct HistoryStore {
    client: reqwest::Client,
    base_url: String,
}

impl HistoryStore {
    pub fn new(base_url: &str, key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(key).context("invalid history store key")?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .context("invalid history store key")?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from configuration; `None` when the store is unconfigured.
    pub fn from_config(config: &AppConfig) -> Option<Arc<Self>> {
        let url = config.supabase_url.as_deref().filter(|s| !s.is_empty())?;
        let key = config.supabase_key.as_deref().filter(|s| !s.is_empty())?;
        match Self::new(url, key) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                tracing::warn!(error = %err, "history store misconfigured, disabling");
                None
            }
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn insert<T: Serialize>(&self, table: &str, record: &T) -> Result<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .with_context(|| format!("history insert into {table} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("history insert into {table} returned HTTP {}", status.as_u16());
        }
        Ok(())
    }

    pub async fn insert_hardware(&self, record: &HardwareHistoryRecord) -> Result<()> {
        self.insert(HARDWARE_TABLE, record).await
    }

    pub async fn insert_rental(&self, record: &RentalHistoryRecord) -> Result<()> {
        self.insert(RENTAL_TABLE, record).await
    }

    async fn query_rows<T: for<'de> Deserialize<'de>>(
        &self,
        table: &str,
        params: Vec<(String, String)>,
    ) -> Result<Vec<T>> {
        let response = self
            .client
            .get(self.table_url(table))
            .query(&params)
            .send()
            .await
            .with_context(|| format!("history query of {table} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("history query of {table} returned HTTP {}", status.as_u16());
        }
        response
            .json()
            .await
            .with_context(|| format!("history rows from {table} failed to decode"))
    }

    pub async fn query_hardware(&self, query: &HistoryQuery) -> Result<Vec<HardwareHistoryRecord>> {
        self.query_rows(HARDWARE_TABLE, range_params("asset_id", query))
            .await
    }

    pub async fn query_rental(&self, query: &HistoryQuery) -> Result<Vec<RentalHistoryRecord>> {
        self.query_rows(RENTAL_TABLE, range_params("gpu_type", query))
            .await
    }

    /// Totals, oldest/newest timestamps, and per-type counts for the rental
    /// series. Computed client-side over a bounded scan.
    pub async fn rental_stats(&self) -> Result<RentalHistoryStats> {
        let params = vec![
            ("select".to_string(), "gpu_type,timestamp".to_string()),
            ("order".to_string(), "timestamp.desc".to_string()),
            ("limit".to_string(), STATS_SCAN_LIMIT.to_string()),
        ];
        let rows: Vec<StatsRow> = self.query_rows(RENTAL_TABLE, params).await?;
        Ok(stats_from_rows(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_params_full_filter() {
        let query = HistoryQuery {
            series: Some("GPU_RTX4090".to_string()),
            start_time: Some(100),
            end_time: Some(200),
            limit: Some(50),
        };
        let params = range_params("asset_id", &query);
        assert!(params.contains(&("asset_id".to_string(), "eq.GPU_RTX4090".to_string())));
        assert!(params.contains(&("timestamp".to_string(), "gte.100".to_string())));
        assert!(params.contains(&("timestamp".to_string(), "lte.200".to_string())));
        assert!(params.contains(&("limit".to_string(), "50".to_string())));
    }

    #[test]
    fn test_range_params_defaults() {
        let params = range_params("gpu_type", &HistoryQuery::default());
        assert!(params.contains(&("limit".to_string(), "1000".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "gpu_type"));
    }

    #[test]
    fn test_stats_from_rows() {
        let rows = vec![
            StatsRow {
                gpu_type: "RTX_4090".to_string(),
                timestamp: 300,
            },
            StatsRow {
                gpu_type: "RTX_4090".to_string(),
                timestamp: 100,
            },
            StatsRow {
                gpu_type: "H100_SXM".to_string(),
                timestamp: 200,
            },
        ];
        let stats = stats_from_rows(&rows);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.oldest_timestamp, Some(100));
        assert_eq!(stats.newest_timestamp, Some(300));
        assert_eq!(stats.per_type_counts["RTX_4090"], 2);
        assert_eq!(stats.per_type_counts["H100_SXM"], 1);
    }

    #[test]
    fn test_record_conversion() {
        let record = AggregatedPrice {
            asset_id: Asset::Rtx4090,
            price: 1600.0,
            twap: 1602.0,
            price_int: 160_000_000_000,
            source_count: 3,
            timestamp: 42,
            updated_at: 42,
            currency: "USD",
            sources: vec![],
        };
        let row = HardwareHistoryRecord::from(&record);
        assert_eq!(row.source_count, 3);
        assert_eq!(row.timestamp, 42);
        assert_eq!(row.twap, 1602.0);
    }
}
