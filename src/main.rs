//! Service entrypoint
//!
//! Wires configuration, adapters, the aggregator, the scheduler loops, and
//! the HTTP server together, and coordinates a clean shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use rigoracle::adapters::{build_adapters, RentalMarketplaceAdapter};
use rigoracle::aggregator::PriceOracle;
use rigoracle::config::AppConfig;
use rigoracle::history::HistoryStore;
use rigoracle::rental::RentalService;
use rigoracle::scheduler::Scheduler;
use rigoracle::server::{create_router, AppState};
use rigoracle::strategies;

fn init_tracing(log_level: &str) {
    // A bare level gets noisy-crate overrides; directive strings pass
    // through untouched.
    let spec = if log_level.contains(',') || log_level.contains('=') {
        log_level.to_string()
    } else {
        format!("{log_level},hyper=info,hyper_util=info,reqwest=info,h2=info")
    };
    let filter = EnvFilter::try_new(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.log_level);
    tracing::info!("🚀 starting hardware price oracle: {}", config.digest());

    let adapters = build_adapters(&config);
    let mut oracle = PriceOracle::new(
        adapters,
        config.twap_window_ms,
        config.price_change_threshold,
    );
    if let Some(name) = config.pricing_strategy.as_deref() {
        match strategies::from_config(name) {
            Some(strategy) => oracle = oracle.with_strategy(strategy),
            None => tracing::warn!(strategy = name, "unknown pricing strategy, using median"),
        }
    }
    let oracle = Arc::new(oracle);

    let history = HistoryStore::from_config(&config);
    let rental = Arc::new(RentalService::new(
        RentalMarketplaceAdapter::new(),
        history.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("🛑 shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // The rental loop only runs when its history sink exists; the rental
    // endpoints work on demand either way.
    let rental_loop = history.is_some().then(|| rental.clone());
    let scheduler = Scheduler::start(
        oracle.clone(),
        rental_loop,
        history.clone(),
        Duration::from_millis(config.update_interval_ms),
        shutdown_rx.clone(),
    )
    .await;

    let state = AppState {
        oracle,
        rental,
        history,
        scraper_api: config.scraper_api_enabled(),
    };
    let app = create_router(state, &config.cors_origins);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "🌐 HTTP server listening");

    let mut serve_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await
        .context("HTTP server failed")?;

    scheduler.join().await;
    tracing::info!("shutdown complete");
    Ok(())
}
