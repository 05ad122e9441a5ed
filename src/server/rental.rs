//! Rental sub-API handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::history::HistoryQuery;
use crate::types::GpuType;

use super::AppState;

fn valid_types() -> Vec<&'static str> {
    GpuType::all().iter().map(|g| g.id()).collect()
}

fn invalid_type(raw: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "Invalid GPU type",
            "message": format!("unknown gpu type: {raw}"),
            "validTypes": valid_types(),
        })),
    )
        .into_response()
}

/// GET /rental/prices - serves the 60s TTL cache, refreshing on miss.
pub async fn prices(State(state): State<AppState>) -> impl IntoResponse {
    let (snapshot, cached) = state.rental.get_prices().await;
    Json(json!({
        "prices": snapshot.stats,
        "source": snapshot.source,
        "cached": cached,
        "timestamp": snapshot.fetched_at,
    }))
}

/// GET /rental/prices/:gpu_type
pub async fn price_by_type(
    Path(gpu_type): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let Some(gpu) = GpuType::from_id(&gpu_type) else {
        return invalid_type(&gpu_type);
    };

    let (snapshot, cached) = state.rental.get_prices().await;
    match snapshot.stats.iter().find(|s| s.gpu_type == gpu) {
        Some(stats) => Json(json!({
            "stats": stats,
            "source": snapshot.source,
            "cached": cached,
            "timestamp": snapshot.fetched_at,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No rental data",
                "message": format!("no current round for {gpu_type}"),
            })),
        )
            .into_response(),
    }
}

/// GET /rental/offers/:gpu_type - raw offer list from this round, no cache.
pub async fn offers(Path(gpu_type): Path<String>, State(state): State<AppState>) -> Response {
    let Some(gpu) = GpuType::from_id(&gpu_type) else {
        return invalid_type(&gpu_type);
    };

    let fetch = state.rental.get_offers(gpu).await;
    Json(json!({
        "gpuType": gpu,
        "offers": fetch.offers,
        "count": fetch.offers.len(),
        "source": if fetch.simulated { "simulated" } else { "oracle-service" },
        "timestamp": Utc::now().timestamp_millis(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RentalHistoryParams {
    gpu_type: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    limit: Option<usize>,
}

fn store_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "History store not configured",
            "history": [],
        })),
    )
        .into_response()
}

/// GET /rental/history - range query over the rental series.
pub async fn history(
    Query(params): Query<RentalHistoryParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(store) = &state.history else {
        return store_unavailable();
    };

    if let Some(raw) = &params.gpu_type {
        if GpuType::from_id(raw).is_none() {
            return invalid_type(raw);
        }
    }

    let query = HistoryQuery {
        series: params.gpu_type,
        start_time: params.start_time,
        end_time: params.end_time,
        limit: params.limit,
    };
    match store.query_rental(&query).await {
        Ok(rows) => {
            let count = rows.len();
            Json(json!({ "history": rows, "count": count })).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "rental history query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "History query failed" })),
            )
                .into_response()
        }
    }
}

/// GET /rental/history/stats
pub async fn history_stats(State(state): State<AppState>) -> Response {
    let Some(store) = &state.history else {
        return store_unavailable();
    };

    match store.rental_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "rental history stats failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "History stats failed" })),
            )
                .into_response()
        }
    }
}
