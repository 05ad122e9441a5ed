//! Periodic update loops
//!
//! Two independent loops: the hardware sweep at the configured interval,
//! and the rental refresh every five minutes (only when the history store
//! is configured). Both run once synchronously at startup. A tick never
//! overlaps itself; a shutdown signal stops the loops at the next tick
//! boundary while in-flight work completes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::aggregator::{PriceOracle, PriceUpdate};
use crate::history::{HardwareHistoryRecord, HistoryStore};
use crate::rental::RentalService;

/// Rental sweep cadence.
pub const RENTAL_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

/// Run one full hardware sweep and append the results to the history store
/// in the background. Persistence failures never surface to the caller.
pub async fn run_hardware_round(
    oracle: &PriceOracle,
    history: Option<&Arc<HistoryStore>>,
) -> Vec<PriceUpdate> {
    let updates = oracle.update_all_prices().await;
    if let Some(store) = history {
        for update in &updates {
            let store = store.clone();
            let record = HardwareHistoryRecord::from(&update.record);
            tokio::spawn(async move {
                if let Err(err) = store.insert_hardware(&record).await {
                    tracing::warn!(asset = %record.asset_id, error = %err, "hardware history append failed");
                }
            });
        }
    }
    updates
}

pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Run both loops once synchronously, then enter periodic mode.
    pub async fn start(
        oracle: Arc<PriceOracle>,
        rental: Option<Arc<RentalService>>,
        history: Option<Arc<HistoryStore>>,
        update_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        tracing::info!(interval_ms = update_interval.as_millis() as u64, "⏱️ running initial update");
        run_hardware_round(&oracle, history.as_ref()).await;
        if let Some(rental) = &rental {
            rental.refresh().await;
        }

        let mut handles = Vec::new();
        handles.push(tokio::spawn(hardware_loop(
            oracle,
            history,
            update_interval,
            shutdown.clone(),
        )));
        if let Some(rental) = rental {
            handles.push(tokio::spawn(rental_loop(rental, shutdown)));
        }
        Self { handles }
    }

    /// Wait for the loops to observe the shutdown signal and finish their
    /// in-flight work.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn hardware_loop(
    oracle: Arc<PriceOracle>,
    history: Option<Arc<HistoryStore>>,
    update_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(update_interval);
    // A slow round delays the next tick instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the initial round already ran.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_hardware_round(&oracle, history.as_ref()).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("hardware update loop stopped");
}

async fn rental_loop(rental: Arc<RentalService>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(RENTAL_UPDATE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                rental.refresh().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("rental update loop stopped");
}
