//! # tillpoint-core: Pure Business Logic for the Tillpoint Transaction Core
//!
//! This crate holds every rule of the transaction core that can be expressed
//! without touching the database: pricing, totals, return eligibility and the
//! display format of invoice / return numbers.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tillpoint Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Cart UI / Returns UI (out of scope)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ PosCore facade (tillpoint-db)          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ tillpoint-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ promotion │  │ checkout  │  │  returns  │  │ sequence  │  │   │
//! │  │   │ resolver  │  │  totals   │  │  rules    │  │  format   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     tillpoint-db (reservations, coordinators, SQLite)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (inventory, reservations, sales, returns)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//! - [`promotion`] - Promotion snapshots and best-discount resolution
//! - [`sequence`] - Invoice / return number formatting
//! - [`checkout`] - Cart totals and checkout preconditions
//! - [`returns`] - Return eligibility, return request rules, refund proration
//!
//! ## Example Usage
//!
//! ```rust
//! use tillpoint_core::money::Money;
//! use tillpoint_core::promotion::{best_promotion, PricingLine};
//!
//! let line = PricingLine {
//!     sku: "TEE-RED-M",
//!     category_id: Some("apparel"),
//!     unit_price: Money::from_cents(2500),
//!     quantity: 2,
//! };
//!
//! // No promotions loaded: nothing applies
//! assert!(best_promotion(&line, &[]).is_none());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod money;
pub mod promotion;
pub mod returns;
pub mod sequence;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ReturnRejection, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single SKU in a cart.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest accepted unit price, in cents (100,000,000.00).
///
/// A full cart at this price and [`MAX_ITEM_QUANTITY`] stays far inside
/// `i64` cents.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Default lifetime of a stock reservation, measured from its last update.
pub const DEFAULT_RESERVATION_TTL_MINUTES: i64 = 15;

/// Default number of days after a sale during which it may be returned.
pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 7;

/// Default interval between promotion cache refreshes.
pub const DEFAULT_PROMOTION_REFRESH_SECS: u64 = 120;
