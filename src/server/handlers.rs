//! Convenience JSON handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::history::HistoryQuery;
use crate::scheduler::run_hardware_round;
use crate::types::{price_int_as_string, AggregatedPrice, Asset, SourceDetail};

use super::AppState;

/// Canonical `/prices` entry: the published contract, without the
/// record-internal fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PriceView {
    pub price: f64,
    pub twap: f64,
    #[serde(serialize_with = "price_int_as_string")]
    pub price_int: i64,
    pub source_count: usize,
    pub timestamp: i64,
    pub currency: &'static str,
    pub sources: Vec<SourceDetail>,
}

impl From<&AggregatedPrice> for PriceView {
    fn from(record: &AggregatedPrice) -> Self {
        Self {
            price: record.price,
            twap: record.twap,
            price_int: record.price_int,
            source_count: record.source_count,
            timestamp: record.timestamp,
            currency: record.currency,
            sources: record.sources.clone(),
        }
    }
}

fn catalog_ids() -> Vec<&'static str> {
    Asset::all().iter().map(|a| a.id()).collect()
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().timestamp_millis(),
        "assets": catalog_ids(),
        "scraperApi": state.scraper_api,
    }))
}

/// POST /refresh - run a full sweep now and report what moved.
pub async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    let updates = run_hardware_round(&state.oracle, state.history.as_ref()).await;
    let changed = updates.iter().filter(|u| u.changed).count();
    let assets: Vec<_> = updates
        .iter()
        .map(|u| {
            json!({
                "assetId": u.record.asset_id,
                "price": u.record.price,
                "sources": u.record.sources,
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "updated": changed,
        "assets": assets,
    }))
}

/// GET /prices - everything currently known; may be partial before the
/// first successful round for an asset.
pub async fn all_prices(State(state): State<AppState>) -> impl IntoResponse {
    let all = state.oracle.get_all_prices().await;
    let prices: HashMap<&'static str, PriceView> = all
        .iter()
        .map(|(asset, record)| (asset.id(), PriceView::from(record)))
        .collect();

    Json(json!({
        "prices": prices,
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

/// GET /price/:asset_id - 400 outside the catalog, 404 before the first
/// successful round, else the full record.
pub async fn price_by_id(
    Path(asset_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let Some(asset) = Asset::from_id(&asset_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid asset",
                "message": format!("unknown asset id: {asset_id}"),
                "validAssets": catalog_ids(),
            })),
        )
            .into_response();
    };

    match state.oracle.get_price(asset).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No price available",
                "message": format!("no successful round yet for {asset_id}"),
            })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HardwareHistoryParams {
    asset_id: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    limit: Option<usize>,
}

/// GET /prices/history - range query against the hardware series.
pub async fn hardware_history(
    Query(params): Query<HardwareHistoryParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(store) = &state.history else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "History store not configured",
                "history": [],
            })),
        )
            .into_response();
    };

    if let Some(id) = &params.asset_id {
        if Asset::from_id(id).is_none() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid asset",
                    "message": format!("unknown asset id: {id}"),
                    "validAssets": catalog_ids(),
                })),
            )
                .into_response();
        }
    }

    let query = HistoryQuery {
        series: params.asset_id,
        start_time: params.start_time,
        end_time: params.end_time,
        limit: params.limit,
    };
    match store.query_hardware(&query).await {
        Ok(rows) => {
            let count = rows.len();
            Json(json!({ "history": rows, "count": count })).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "hardware history query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "History query failed" })),
            )
                .into_response()
        }
    }
}
