//! HTTP surface
//!
//! REST endpoints for the convenience JSON API, the oracle-adapter
//! envelope, and the rental sub-API. All responses are JSON; CORS origins
//! come from configuration.

pub mod envelope;
mod handlers;
mod rental;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::aggregator::PriceOracle;
use crate::history::HistoryStore;
use crate::rental::RentalService;

#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<PriceOracle>,
    pub rental: Arc<RentalService>,
    pub history: Option<Arc<HistoryStore>>,
    /// Whether the third-party fetch proxy is configured (reported by
    /// `/health`).
    pub scraper_api: bool,
}

fn build_cors(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let list: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the API router with all endpoints.
pub fn create_router(state: AppState, cors_origins: &str) -> Router {
    Router::new()
        // Convenience JSON API
        .route("/health", get(handlers::health))
        .route("/refresh", post(handlers::refresh))
        .route(
            "/prices",
            get(handlers::all_prices).post(envelope::prices_envelope),
        )
        .route("/prices/history", get(handlers::hardware_history))
        // Oracle-adapter envelope
        .route("/price", post(envelope::price_envelope))
        .route("/price/:asset_id", get(handlers::price_by_id))
        // Rental sub-API
        .route("/rental/prices", get(rental::prices))
        .route("/rental/prices/:gpu_type", get(rental::price_by_type))
        .route("/rental/offers/:gpu_type", get(rental::offers))
        .route("/rental/history", get(rental::history))
        .route("/rental/history/stats", get(rental::history_stats))
        .with_state(state)
        .layer(build_cors(cors_origins))
}
