//! # Background Workers
//!
//! Periodic maintenance tasks for the transaction core.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ReservationSweeper   every 3 min   DELETE ... WHERE expires_at <= now  │
//! │  PromotionRefresher   every 2 min   reload promotions, bump version     │
//! │                                                                         │
//! │  Each runs as its own tokio task and stops when its handle's           │
//! │  shutdown() is called. A failed tick is logged; the next tick runs     │
//! │  as usual.                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sweeper only tidies up. Expired holds already stop counting against
//! availability the moment they expire.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{DbError, DbResult};
use crate::repository::{PromotionCache, ReservationStore};

// =============================================================================
// Handle
// =============================================================================

/// Handle for stopping a background worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerHandle {
    fn new(name: &'static str) -> (Self, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (WorkerHandle { name, shutdown_tx }, shutdown_rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> DbResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DbError::Internal(format!("{} shutdown channel closed", self.name)))
    }
}

// =============================================================================
// Reservation Sweeper
// =============================================================================

/// Deletes expired stock reservations on a timer.
pub struct ReservationSweeper {
    store: ReservationStore,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReservationSweeper {
    /// Creates a sweeper and returns its handle.
    pub fn new(store: ReservationStore, interval: Duration) -> (Self, WorkerHandle) {
        let (handle, shutdown_rx) = WorkerHandle::new("reservation sweeper");
        let sweeper = ReservationSweeper {
            store,
            interval,
            shutdown_rx,
        };
        (sweeper, handle)
    }

    /// Runs the sweep loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Reservation sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.sweep_expired().await {
                        Ok(0) => debug!("No expired reservations"),
                        Ok(_) => {}
                        Err(e) => error!(?e, "Failed to sweep expired reservations"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reservation sweeper shutting down");
                    break;
                }
            }
        }

        info!("Reservation sweeper stopped");
    }
}

// =============================================================================
// Promotion Refresher
// =============================================================================

/// Reloads the promotion cache on a timer.
pub struct PromotionRefresher {
    cache: PromotionCache,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PromotionRefresher {
    pub fn new(cache: PromotionCache, interval: Duration) -> (Self, WorkerHandle) {
        let (handle, shutdown_rx) = WorkerHandle::new("promotion refresher");
        let refresher = PromotionRefresher {
            cache,
            interval,
            shutdown_rx,
        };
        (refresher, handle)
    }

    /// Runs the refresh loop. The first tick fires immediately, so the cache
    /// is loaded as soon as the task starts.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Promotion refresher starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Failure is logged by the cache; the old snapshot stays
                    if let Ok(snapshot) = self.cache.refresh().await {
                        debug!(version = snapshot.version, "Promotions refreshed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Promotion refresher shutting down");
                    break;
                }
            }
        }

        info!("Promotion refresher stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
