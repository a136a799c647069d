//! # Domain Types
//!
//! Core domain types shared by the reservation store and both coordinators.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │ InventoryItem   │   │ StockReservation │   │  PosTransaction │      │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────  │      │
//! │  │  id + table     │◄──│  item_ref        │   │  invoice_no     │      │
//! │  │  sku (business) │   │  transaction_id  │   │  totals         │      │
//! │  │  quantity       │   │  expires_at      │   │  items[]        │      │
//! │  └─────────────────┘   └──────────────────┘   └────────┬────────┘      │
//! │                                                        │ invoice_no    │
//! │                                               ┌────────▼────────┐      │
//! │                                               │    PosReturn    │      │
//! │                                               │  return_no      │      │
//! │                                               │  items[]        │      │
//! │                                               └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Headers carry a UUID `id` for relations and a human-readable business
//! number (`invoice_no`, `return_no`). Inventory rows and line items use
//! integer ids because returns reference them by positive integer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (825 bps = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Channel & Backing Table
// =============================================================================

/// Which sales channel an item (or promotion) belongs to.
///
/// ## Backing tables
/// ```text
/// Channel::InStore ─────────────► in_store_items
/// Channel::Online  ─┬───────────► online_items
/// Channel::Both    ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InStore,
    Online,
    Both,
}

impl Channel {
    /// The physical table that stores items of this channel.
    pub const fn backing_table(&self) -> StockTable {
        match self {
            Channel::InStore => StockTable::InStore,
            Channel::Online | Channel::Both => StockTable::Online,
        }
    }

    /// Whether something scoped to `self` is visible when selling on `channel`.
    ///
    /// `Both` covers every channel.
    pub fn covers(&self, channel: Channel) -> bool {
        *self == Channel::Both || channel == Channel::Both || *self == channel
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::InStore => "in_store",
            Channel::Online => "online",
            Channel::Both => "both",
        }
    }
}

/// One of the two physical inventory tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockTable {
    InStore,
    Online,
}

impl StockTable {
    /// SQL table name. Only ever one of two fixed literals, never user input.
    pub const fn table_name(&self) -> &'static str {
        match self {
            StockTable::InStore => "in_store_items",
            StockTable::Online => "online_items",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            StockTable::InStore => "in_store",
            StockTable::Online => "online",
        }
    }
}

/// Reference to one inventory row: an online item id XOR an in-store item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "table", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    InStore(i64),
    Online(i64),
}

impl ItemRef {
    pub const fn new(table: StockTable, id: i64) -> Self {
        match table {
            StockTable::InStore => ItemRef::InStore(id),
            StockTable::Online => ItemRef::Online(id),
        }
    }

    pub const fn table(&self) -> StockTable {
        match self {
            ItemRef::InStore(_) => StockTable::InStore,
            ItemRef::Online(_) => StockTable::Online,
        }
    }

    pub const fn id(&self) -> i64 {
        match self {
            ItemRef::InStore(id) | ItemRef::Online(id) => *id,
        }
    }

    /// Splits into the `(online_item_id, in_store_item_id)` column pair.
    pub const fn split(&self) -> (Option<i64>, Option<i64>) {
        match self {
            ItemRef::Online(id) => (Some(*id), None),
            ItemRef::InStore(id) => (None, Some(*id)),
        }
    }
}

// =============================================================================
// Inventory Item
// =============================================================================

/// One sellable SKU and the row that backs it.
///
/// ## Invariants
/// - A SKU resolves to exactly one backing row.
/// - `channel` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryItem {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub category_id: Option<String>,
    pub unit_price_cents: i64,
    /// Physical stock on hand.
    pub quantity: i64,
    pub channel: Channel,
}

impl InventoryItem {
    #[inline]
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.channel.backing_table(), self.id)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Stock Reservation
// =============================================================================

/// A time-boxed hold on stock for one cart.
///
/// At most one row exists per `(transaction_id, item_ref)`; changing the cart
/// quantity overwrites `quantity` and pushes `expires_at` out again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReservation {
    pub reservation_id: String,
    /// Cart session key.
    pub transaction_id: String,
    pub item_ref: ItemRef,
    pub sku: String,
    pub quantity: i64,
    pub channel: Channel,
    #[ts(as = "String")]
    pub reserved_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl StockReservation {
    /// A reservation stops counting the instant `expires_at` is reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Availability {
    pub sku: String,
    pub requested: i64,
    /// Physical stock in the backing row.
    pub total_stock: i64,
    /// Unexpired holds by other carts.
    pub reserved: i64,
    /// `total_stock - reserved`.
    pub available: i64,
    /// Whether `requested <= available`.
    pub sufficient: bool,
    /// Human-readable explanation when `sufficient` is false.
    pub reason: Option<String>,
}

impl Availability {
    /// Builds an availability result from stock and holds.
    pub fn compute(sku: &str, requested: i64, total_stock: i64, reserved: i64) -> Self {
        let available = total_stock - reserved;
        let sufficient = requested <= available;
        let reason = if sufficient {
            None
        } else {
            Some(format!(
                "Only {} of {} available ({} in stock, {} held by other carts)",
                available.max(0),
                sku,
                total_stock,
                reserved
            ))
        };

        Availability {
            sku: sku.to_string(),
            requested,
            total_stock,
            reserved,
            available,
            sufficient,
            reason,
        }
    }

    /// Converts an insufficient result into the matching error.
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.sufficient {
            Ok(self)
        } else {
            Err(CoreError::InsufficientStock {
                sku: self.sku,
                requested: self.requested,
                available: self.available.max(0),
                total_stock: self.total_stock,
                reserved: self.reserved,
            })
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    EWallet,
    BankTransfer,
}

impl PaymentMethod {
    /// Every non-cash tender must carry a reference number.
    pub const fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

/// How the customer paid for a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub amount_received_cents: i64,
    pub reference_no: Option<String>,
}

impl PaymentInfo {
    pub fn cash(amount_received: Money) -> Self {
        PaymentInfo {
            method: PaymentMethod::Cash,
            amount_received_cents: amount_received.cents(),
            reference_no: None,
        }
    }

    #[inline]
    pub fn amount_received(&self) -> Money {
        Money::from_cents(self.amount_received_cents)
    }
}

// =============================================================================
// Cart Line
// =============================================================================

/// One line of the cart handed to pricing and checkout.
///
/// The unit price is frozen when the item was added to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub sku: String,
    pub category_id: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(sku: impl Into<String>, unit_price: Money, quantity: i64) -> Self {
        CartLine {
            sku: sku.into(),
            category_id: None,
            unit_price_cents: unit_price.cents(),
            quantity,
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// POS Transaction
// =============================================================================

/// A committed sale. Never mutated after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosTransaction {
    pub id: String,
    pub invoice_no: String,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub staff_id: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_amount_cents: i64,
    pub received_amount_cents: i64,
    pub change_cents: i64,
    pub payment_ref_no: Option<String>,
    /// Promotion snapshot the lines were priced against.
    pub promotion_version: Option<i64>,
}

impl PosTransaction {
    /// Net merchandise value: subtotal minus discount.
    #[inline]
    pub fn net_subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents - self.discount_cents)
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

/// A line of a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosTransactionItem {
    pub id: i64,
    pub transaction_id: String,
    pub sku: String,
    pub order_quantity: i64,
    /// Physical stock of the row just before this sale decremented it.
    pub stock_quantity_at_sale: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    /// `unit_price × order_quantity − discount`.
    pub subtotal_cents: i64,
    pub promotion_id: Option<String>,
    pub sale_channel: Channel,
    pub item_ref: ItemRef,
}

// =============================================================================
// POS Return
// =============================================================================

/// A committed return. At most one exists per invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosReturn {
    pub return_id: String,
    pub return_no: String,
    pub invoice_no: String,
    pub cashier_id: i64,
    pub supervisor_id: i64,
    pub refund_total_cents: i64,
    pub refund_method: PaymentMethod,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A line of a committed return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosReturnItem {
    pub id: i64,
    pub return_id: String,
    pub invoice_item_id: i64,
    pub online_item_id: Option<i64>,
    pub in_store_item_id: Option<i64>,
    pub qty_returned: i64,
    pub refund_amount_cents: i64,
}

// =============================================================================
// Activity Log
// =============================================================================

/// Kinds of audit entries written by the coordinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Sale,
    ReturnAuthorized,
    ReturnProcessed,
}

/// An append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActivityEntry {
    pub id: i64,
    pub staff_id: i64,
    pub activity_type: ActivityType,
    pub details: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
