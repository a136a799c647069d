//! # tillpoint-db: Transactional Core of Tillpoint
//!
//! Everything between the cart screen and SQLite: stock holds, invoice and
//! return numbers, checkout, returns, and the workers that keep the
//! reservation table and promotion cache fresh.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Tillpoint Data Flow                               │
//! │                                                                         │
//! │  Cart / Returns UI                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  tillpoint-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌───────────────┐   ┌─────────────────┐   │   │
//! │  │   │   PosCore    │──►│  Coordinators │──►│  Repositories   │   │   │
//! │  │   │ (service.rs) │   │ checkout.rs   │   │ reservation.rs  │   │   │
//! │  │   │              │   │ returns.rs    │   │ sequence.rs ... │   │   │
//! │  │   └──────┬───────┘   └───────────────┘   └────────┬────────┘   │   │
//! │  │          │  workers (sweeper, refresher)          │            │   │
//! │  └──────────┼────────────────────────────────────────┼────────────┘   │
//! │             ▼                                        ▼                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Per-table access (inventory, reservations, sequences, ...)
//! - [`coordinator`] - Checkout and returns units of work
//! - [`worker`] - Reservation sweeper and promotion refresher
//! - [`config`] - `pos.toml` loading with environment overrides
//! - [`service`] - The [`PosCore`] facade
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillpoint_db::{PosConfig, PosCore};
//!
//! tillpoint_db::init_tracing();
//!
//! let config = PosConfig::load_or_default(None);
//! let core = PosCore::open(config).await?;
//! let workers = core.spawn_workers();
//!
//! core.reserve("cart-7", "MUG-01", 2).await?;
//! let receipt = core.checkout(&request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
pub mod worker;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, PosConfig};
pub use coordinator::{CheckoutCoordinator, ReturnsCoordinator};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::PosCore;
pub use worker::{PromotionRefresher, ReservationSweeper, WorkerHandle};

// Repository re-exports for convenience
pub use repository::{
    ActivityLogRepository, InventoryRepository, NewInventoryItem, PromotionCache,
    PromotionRepository, ReservationStore, ReturnRepository, SequenceIssuer,
    TransactionRepository,
};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tillpoint_db=trace` - Trace this crate only
/// - Default: `info,tillpoint_db=debug,sqlx=warn`
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tillpoint_db=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
