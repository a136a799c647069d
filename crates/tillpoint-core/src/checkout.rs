//! # Checkout Rules
//!
//! Cart totals and the preconditions a cart must meet before the checkout
//! coordinator opens a database transaction.
//!
//! ## Totals
//! ```text
//! subtotal = Σ unit_price × quantity
//! discount = Σ line discount (best promotion per line)
//! tax      = (subtotal − discount) × tax_rate
//! total    = subtotal − discount + tax
//! change   = received − total
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::promotion::{LinePricing, PricingLine, PromotionSnapshot};
use crate::types::{CartLine, Channel, PaymentInfo, TaxRate};
use crate::validation::{
    validate_cart_size, validate_payment_reference, validate_price_cents, validate_quantity,
    validate_sku, validate_staff_id,
};

/// Everything needed to turn a cart into a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub payment: PaymentInfo,
    pub staff_id: i64,
    /// Cart session key. When present, the cart's holds are released in the
    /// same database transaction as the sale.
    pub reservation_key: Option<String>,
}

/// What the cashier gets back from a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutReceipt {
    pub transaction_id: String,
    pub invoice_no: String,
    pub totals: CartTotals,
    pub change: Money,
    /// Reservation rows removed along with the sale.
    pub released_reservations: u64,
}

/// A cart line with its promotion already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub line: CartLine,
    pub pricing: LinePricing,
}

impl PricedLine {
    #[inline]
    pub fn gross(&self) -> Money {
        self.line.line_total()
    }

    /// Line total after its discount.
    #[inline]
    pub fn net(&self) -> Money {
        self.gross() - self.pricing.discount
    }
}

/// Resolves the best promotion for every line of a cart.
pub fn price_cart(
    lines: &[CartLine],
    snapshot: &PromotionSnapshot,
    now: chrono::DateTime<chrono::Utc>,
    channel: Channel,
) -> Vec<PricedLine> {
    lines
        .iter()
        .map(|line| PricedLine {
            pricing: snapshot.price_line(&PricingLine::from(line), now, channel),
            line: line.clone(),
        })
        .collect()
}

// =============================================================================
// Cart Totals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl CartTotals {
    /// Computes totals for priced lines at the given tax rate.
    pub fn compute(lines: &[PricedLine], tax_rate: TaxRate) -> Self {
        let subtotal: Money = lines.iter().map(PricedLine::gross).sum();
        let discount: Money = lines.iter().map(|l| l.pricing.discount).sum();
        let taxable = subtotal - discount;
        let tax = taxable.calculate_tax(tax_rate);

        CartTotals {
            subtotal,
            discount,
            tax,
            total: taxable + tax,
        }
    }
}

// =============================================================================
// Preconditions
// =============================================================================

/// Checks the request shape before any pricing or write.
///
/// ## Rules (first failure wins)
/// 1. Staff id positive
/// 2. Cart has 1..=100 lines
/// 3. Every line: valid SKU, non-negative price, quantity 1..=999
/// 4. Payment reference present for non-cash tenders
pub fn validate_request(request: &CheckoutRequest) -> CoreResult<()> {
    validate_staff_id("staff_id", request.staff_id)?;
    validate_cart_size(request.lines.len())?;

    for line in &request.lines {
        validate_sku(&line.sku)?;
        validate_price_cents(line.unit_price_cents)?;
        validate_quantity(line.quantity)?;
    }

    validate_payment_reference(request.payment.method, request.payment.reference_no.as_deref())?;
    Ok(())
}

/// Checks the tendered amount against the total and returns the change.
pub fn settle_payment(payment: &PaymentInfo, totals: &CartTotals) -> CoreResult<Money> {
    let received = payment.amount_received();
    if received < totals.total {
        return Err(CoreError::InsufficientPayment {
            due_cents: totals.total.cents(),
            received_cents: received.cents(),
        });
    }

    Ok(received - totals.total)
}

/// Sums ordered quantity per SKU so repeated lines decrement stock once.
pub fn quantities_by_sku(lines: &[CartLine]) -> Vec<(String, i64)> {
    let mut totals: Vec<(String, i64)> = Vec::new();
    for line in lines {
        match totals.iter_mut().find(|(sku, _)| *sku == line.sku) {
            Some((_, qty)) => *qty += line.quantity,
            None => totals.push((line.sku.clone(), line.quantity)),
        }
    }
    totals
}

// =============================================================================
// Unit Tests
// =============================================================================
