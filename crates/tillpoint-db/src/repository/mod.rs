//! # Repository Module
//!
//! Data access for each table group.
//!
//! Each file exposes a repository type over the pool for standalone use, plus
//! `pub(crate)` functions over a `SqliteConnection` that the coordinators call
//! inside their own database transaction.
//!
//! | Repository | Tables |
//! |------------|--------|
//! | [`InventoryRepository`] | `in_store_items`, `online_items` |
//! | [`ReservationStore`] | `stock_reservations` |
//! | [`SequenceIssuer`] | `sequences` |
//! | [`PromotionRepository`] | `promotions` |
//! | [`TransactionRepository`] | `pos_transactions`, `pos_transaction_items` |
//! | [`ReturnRepository`] | `pos_returns`, `pos_return_items` |
//! | [`ActivityLogRepository`] | `activity_log` |

pub mod activity;
pub mod inventory;
pub mod promotion;
pub mod reservation;
pub mod returns;
pub mod sequence;
pub mod transaction;

pub use activity::ActivityLogRepository;
pub use inventory::{InventoryRepository, NewInventoryItem};
pub use promotion::{PromotionCache, PromotionRepository};
pub use reservation::ReservationStore;
pub use returns::ReturnRepository;
pub use sequence::SequenceIssuer;
pub use transaction::TransactionRepository;
