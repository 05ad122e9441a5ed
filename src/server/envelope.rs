//! Oracle-adapter envelope
//!
//! Request/response shape compatible with the external adapter convention:
//! the request carries a `jobRunID` (`id`) and `data.assetId`; every reply
//! echoes the `jobRunID` and carries a numeric `statusCode`. The envelope
//! HTTP status mirrors the `statusCode`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::types::{AggregatedPrice, Asset};

use super::AppState;

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The request's `id` (or an echoed `jobRunID`), defaulting to `"0"`.
pub fn job_run_id(body: &Value) -> String {
    body.get("id")
        .and_then(id_to_string)
        .or_else(|| body.get("jobRunID").and_then(id_to_string))
        .unwrap_or_else(|| "0".to_string())
}

/// Validate the outer envelope: an object with an object `data`.
pub fn validate_request(body: &Value) -> Result<(String, &Value), (String, u16, String)> {
    if !body.is_object() {
        return Err(("0".to_string(), 400, "Invalid request format".to_string()));
    }
    let job = job_run_id(body);
    match body.get("data") {
        Some(data) if data.is_object() => Ok((job, data)),
        _ => Err((job, 400, "Missing data object".to_string())),
    }
}

fn price_data(record: &AggregatedPrice) -> Value {
    let price_int = record.price_int.to_string();
    json!({
        "result": price_int,
        "price": record.price,
        "twap": record.twap,
        "priceInt": price_int,
        "sourceCount": record.source_count,
        "timestamp": record.timestamp,
        "assetId": record.asset_id,
    })
}

pub fn success_response(job_run_id: &str, record: &AggregatedPrice) -> Value {
    json!({
        "jobRunID": job_run_id,
        "statusCode": 200,
        "data": price_data(record),
    })
}

pub fn error_response(job_run_id: &str, status_code: u16, error: &str) -> Value {
    json!({
        "jobRunID": job_run_id,
        "statusCode": status_code,
        "error": error,
    })
}

/// HTTP status mirrors the envelope's statusCode.
fn reply(envelope: Value) -> (StatusCode, Json<Value>) {
    let status = envelope
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|code| StatusCode::from_u16(code as u16).ok())
        .unwrap_or(StatusCode::OK);
    (status, Json(envelope))
}

/// POST /price - single-asset envelope.
pub async fn price_envelope(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = body else {
        return reply(error_response("0", 400, "Invalid request format"));
    };

    let (job, data) = match validate_request(&body) {
        Ok(parsed) => parsed,
        Err((job, status, message)) => return reply(error_response(&job, status, &message)),
    };

    let raw = data
        .get("assetId")
        .or_else(|| data.get("asset"))
        .and_then(Value::as_str);
    let Some(raw) = raw else {
        return reply(error_response(&job, 400, "Missing data.assetId or data.asset"));
    };
    let Some(asset) = Asset::from_id(raw) else {
        let message = format!("Invalid asset: {raw}");
        return reply(error_response(&job, 400, &message));
    };

    match state.oracle.get_price(asset).await {
        Some(record) => reply(success_response(&job, &record)),
        None => {
            let message = format!("No price available for {raw}");
            reply(error_response(&job, 404, &message))
        }
    }
}

/// POST /prices - multi-asset envelope. `data.assets[]` or
/// `data.assetIds[]` selects a subset; absence means the whole catalog;
/// any unknown id rejects the request.
pub async fn prices_envelope(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = body else {
        return reply(error_response("0", 400, "Invalid request format"));
    };

    let (job, data) = match validate_request(&body) {
        Ok(parsed) => parsed,
        Err((job, status, message)) => return reply(error_response(&job, status, &message)),
    };

    let selection = data.get("assets").or_else(|| data.get("assetIds"));
    let assets: Vec<Asset> = match selection {
        None => Asset::all().to_vec(),
        Some(Value::Array(items)) => {
            let mut assets = Vec::with_capacity(items.len());
            for item in items {
                let Some(raw) = item.as_str() else {
                    return reply(error_response(&job, 400, "Asset ids must be strings"));
                };
                let Some(asset) = Asset::from_id(raw) else {
                    let message = format!("Invalid asset: {raw}");
                    return reply(error_response(&job, 400, &message));
                };
                assets.push(asset);
            }
            assets
        }
        Some(_) => {
            return reply(error_response(
                &job,
                400,
                "data.assets must be an array of asset ids",
            ))
        }
    };

    let mut prices = Map::new();
    for asset in assets {
        if let Some(record) = state.oracle.get_price(asset).await {
            prices.insert(asset.id().to_string(), price_data(&record));
        }
    }

    reply(json!({
        "jobRunID": job,
        "statusCode": 200,
        "data": {
            "prices": Value::Object(prices),
            "timestamp": Utc::now().timestamp_millis(),
        }
    }))
}
