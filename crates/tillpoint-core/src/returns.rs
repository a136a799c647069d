//! # Return Rules
//!
//! Eligibility of an invoice for return, the shape rules for return data,
//! and refund proration.
//!
//! ## Return State Machine
//! ```text
//!                 ┌───────────┐
//!   invoice_no ──►│ Validate  │──rejected──► NotFound / TooOld / AlreadyReturned
//!                 └─────┬─────┘
//!                       │ eligible
//!                 ┌─────▼─────┐
//!                 │   Build   │──rejected──► InvalidReturn { first failing rule }
//!                 └─────┬─────┘
//!                       │ valid
//!                 ┌─────▼─────┐
//!                 │  Commit   │──► accepted (return_no)
//!                 └───────────┘   (re-validates inside the DB transaction)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ReturnRejection};
use crate::money::Money;
use crate::types::{ItemRef, PaymentMethod, PosTransaction, PosTransactionItem};
use crate::DEFAULT_RETURN_WINDOW_DAYS;

// =============================================================================
// Eligibility
// =============================================================================

/// The facts about an invoice that decide whether it can be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceStatus {
    pub transaction_date: DateTime<Utc>,
    pub prior_returns: i64,
}

/// How long after a sale a return is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnPolicy {
    pub window_days: i64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        ReturnPolicy {
            window_days: DEFAULT_RETURN_WINDOW_DAYS,
        }
    }
}

impl ReturnPolicy {
    pub fn new(window_days: i64) -> Self {
        ReturnPolicy { window_days }
    }

    /// Runs the eligibility checks in order: exists, within window, not yet
    /// returned. `invoice` is `None` when the invoice does not exist.
    pub fn check(
        &self,
        invoice_no: &str,
        invoice: Option<InvoiceStatus>,
        now: DateTime<Utc>,
    ) -> Result<(), ReturnRejection> {
        let status = invoice.ok_or_else(|| ReturnRejection::NotFound {
            invoice_no: invoice_no.to_string(),
        })?;

        let age = now - status.transaction_date;
        if age > Duration::days(self.window_days) {
            return Err(ReturnRejection::TooOld {
                invoice_no: invoice_no.to_string(),
                age_days: age.num_days(),
                window_days: self.window_days,
            });
        }

        if status.prior_returns > 0 {
            return Err(ReturnRejection::AlreadyReturned {
                invoice_no: invoice_no.to_string(),
            });
        }

        Ok(())
    }
}

/// Result of validating an invoice for return.
///
/// Rejections are an expected outcome at the returns counter, so they are a
/// variant here rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnEligibility {
    /// The sale and its lines, ready for the cashier to pick from.
    Eligible {
        transaction: PosTransaction,
        items: Vec<PosTransactionItem>,
    },
    Rejected(ReturnRejection),
}

impl ReturnEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, ReturnEligibility::Eligible { .. })
    }

    /// The rejection, if any.
    pub fn rejection(&self) -> Option<&ReturnRejection> {
        match self {
            ReturnEligibility::Rejected(rejection) => Some(rejection),
            ReturnEligibility::Eligible { .. } => None,
        }
    }
}

// =============================================================================
// Return Request
// =============================================================================

/// One line being returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnLine {
    /// `pos_transaction_items.id` of the line being returned.
    pub invoice_item_id: i64,
    pub online_item_id: Option<i64>,
    pub in_store_item_id: Option<i64>,
    pub qty_returned: i64,
    pub refund_amount_cents: i64,
}

impl ReturnLine {
    /// Builds a line that restocks the row the item was sold from.
    pub fn for_item(item: &PosTransactionItem, qty_returned: i64, refund: Money) -> Self {
        let (online_item_id, in_store_item_id) = item.item_ref.split();
        ReturnLine {
            invoice_item_id: item.id,
            online_item_id,
            in_store_item_id,
            qty_returned,
            refund_amount_cents: refund.cents(),
        }
    }

    /// The inventory row this line names. `None` unless exactly one of the
    /// two ids is set.
    pub fn item_ref(&self) -> Option<ItemRef> {
        match (self.online_item_id, self.in_store_item_id) {
            (Some(id), None) => Some(ItemRef::Online(id)),
            (None, Some(id)) => Some(ItemRef::InStore(id)),
            _ => None,
        }
    }
}

/// Everything the returns coordinator needs to commit a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequest {
    pub invoice_no: String,
    pub cashier_id: i64,
    pub supervisor_id: i64,
    pub refund_total_cents: i64,
    pub refund_method: PaymentMethod,
    pub notes: Option<String>,
    pub lines: Vec<ReturnLine>,
}

impl ReturnRequest {
    #[inline]
    pub fn refund_total(&self) -> Money {
        Money::from_cents(self.refund_total_cents)
    }

    /// Checks the build rules, reporting the first one that fails.
    ///
    /// ## Rule order
    /// 1. cashier id positive
    /// 2. supervisor id positive
    /// 3. refund total > 0
    /// 4. at least one line
    /// 5. per line: invoice item id positive, refund amount non-negative,
    ///    quantity positive, exactly one inventory reference
    /// 6. refund total equals the sum of the line refunds
    pub fn validate(&self) -> CoreResult<()> {
        if self.cashier_id <= 0 {
            return Err(CoreError::invalid_return("cashier id must be a positive identifier"));
        }
        if self.supervisor_id <= 0 {
            return Err(CoreError::invalid_return(
                "supervisor id must be a positive identifier",
            ));
        }
        if self.refund_total_cents <= 0 {
            return Err(CoreError::invalid_return("refund total must be greater than zero"));
        }
        if self.lines.is_empty() {
            return Err(CoreError::invalid_return("at least one item must be returned"));
        }

        for (index, line) in self.lines.iter().enumerate() {
            let n = index + 1;
            if line.invoice_item_id <= 0 {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: invoice item reference must be positive"
                )));
            }
            if line.refund_amount_cents < 0 {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: refund amount must not be negative"
                )));
            }
            if line.qty_returned <= 0 {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: quantity returned must be positive"
                )));
            }
            if line.online_item_id.is_none() && line.in_store_item_id.is_none() {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: an online or in-store item reference is required"
                )));
            }
            if line.item_ref().is_none() {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: only one of online or in-store item reference may be set"
                )));
            }
        }

        let lines_total = self
            .lines
            .iter()
            .fold(0i64, |sum, l| sum.saturating_add(l.refund_amount_cents));
        if lines_total != self.refund_total_cents {
            return Err(CoreError::invalid_return(format!(
                "refund total {} does not match the line refunds {}",
                self.refund_total(),
                Money::from_cents(lines_total)
            )));
        }

        Ok(())
    }
}

/// Outcome of a committed return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnReceipt {
    pub return_id: String,
    pub return_no: String,
    pub invoice_no: String,
    pub refund_total: Money,
}

// =============================================================================
// Refund Proration
// =============================================================================

/// Suggests the refund for returning `qty` units of `item`.
///
/// The merchandise share is the line's net subtotal prorated by quantity.
/// Tax is prorated from the sale's aggregate tax by that share of the sale's
/// net subtotal, so returning every line refunds exactly the sale total
/// up to per-line rounding.
pub fn suggest_refund(transaction: &PosTransaction, item: &PosTransactionItem, qty: i64) -> Money {
    let qty = qty.clamp(0, item.order_quantity);
    let net_share =
        Money::from_cents(item.subtotal_cents).prorate(qty, item.order_quantity);

    let tax_share = Money::from_cents(transaction.tax_cents)
        .prorate(net_share.cents(), transaction.net_subtotal().cents());

    net_share + tax_share
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;

    fn status(days_ago: i64, prior_returns: i64, now: DateTime<Utc>) -> Option<InvoiceStatus> {
        Some(InvoiceStatus {
            transaction_date: now - Duration::days(days_ago),
            prior_returns,
        })
    }

    fn request() -> ReturnRequest {
        ReturnRequest {
            invoice_no: "0000001".to_string(),
            cashier_id: 3,
            supervisor_id: 9,
            refund_total_cents: 10000,
            refund_method: PaymentMethod::Cash,
            notes: None,
            lines: vec![ReturnLine {
                invoice_item_id: 1,
                online_item_id: None,
                in_store_item_id: Some(4),
                qty_returned: 1,
                refund_amount_cents: 10000,
            }],
        }
    }

    #[test]
    fn test_eligibility_window() {
        let now = Utc::now();
        let policy = ReturnPolicy::default();

        assert!(policy.check("0000001", status(6, 0, now), now).is_ok());
        assert_eq!(
            policy.check("0000001", status(8, 0, now), now),
            Err(ReturnRejection::TooOld {
                invoice_no: "0000001".to_string(),
                age_days: 8,
                window_days: 7,
            })
        );
    }

    #[test]
    fn test_eligibility_order() {
        let now = Utc::now();
        let policy = ReturnPolicy::default();

        assert!(matches!(
            policy.check("0000404", None, now),
            Err(ReturnRejection::NotFound { .. })
        ));
        // Too old is reported before already returned
        assert!(matches!(
            policy.check("0000001", status(30, 1, now), now),
            Err(ReturnRejection::TooOld { .. })
        ));
        assert!(matches!(
            policy.check("0000001", status(1, 1, now), now),
            Err(ReturnRejection::AlreadyReturned { .. })
        ));
    }

    #[test]
    fn test_request_rules_report_first_failure() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.cashier_id = 0;
        bad.supervisor_id = 0;
        let err = bad.validate().unwrap_err().to_string();
        assert!(err.contains("cashier"), "{err}");

        let mut no_total = request();
        no_total.refund_total_cents = 0;
        assert!(no_total.validate().is_err());

        let mut no_lines = request();
        no_lines.lines.clear();
        assert!(no_lines.validate().is_err());

        let mut no_ref = request();
        no_ref.lines[0].in_store_item_id = None;
        let err = no_ref.validate().unwrap_err().to_string();
        assert!(err.contains("line 1"), "{err}");

        let mut negative_refund = request();
        negative_refund.lines[0].refund_amount_cents = -1;
        assert!(negative_refund.validate().is_err());
    }

    #[test]
    fn test_line_with_both_refs_rejected() {
        let mut both = request();
        both.lines[0].online_item_id = Some(4);
        let err = both.validate().unwrap_err().to_string();
        assert!(err.contains("only one"), "{err}");
        assert_eq!(both.lines[0].item_ref(), None);
    }

    #[test]
    fn test_refund_total_must_match_lines() {
        let mut header_high = request();
        header_high.refund_total_cents = 15000;
        let err = header_high.validate().unwrap_err().to_string();
        assert!(err.contains("does not match"), "{err}");

        let mut split = request();
        split.lines.push(ReturnLine {
            invoice_item_id: 2,
            online_item_id: Some(8),
            in_store_item_id: None,
            qty_returned: 1,
            refund_amount_cents: 2500,
        });
        assert!(split.validate().is_err());
        split.refund_total_cents = 12500;
        assert!(split.validate().is_ok());
    }

    #[test]
    fn test_suggest_refund_prorates_tax() {
        let transaction = PosTransaction {
            id: "t".to_string(),
            invoice_no: "0000001".to_string(),
            transaction_date: Utc::now(),
            payment_method: PaymentMethod::Cash,
            staff_id: 1,
            subtotal_cents: 25000,
            discount_cents: 0,
            tax_cents: 2500,
            total_amount_cents: 27500,
            received_amount_cents: 30000,
            change_cents: 2500,
            payment_ref_no: None,
            promotion_version: None,
        };
        let item = PosTransactionItem {
            id: 1,
            transaction_id: "t".to_string(),
            sku: "A".to_string(),
            order_quantity: 2,
            stock_quantity_at_sale: 10,
            unit_price_cents: 10000,
            discount_cents: 0,
            subtotal_cents: 20000,
            promotion_id: None,
            sale_channel: Channel::InStore,
            item_ref: ItemRef::InStore(1),
        };

        // One of two units: 100.00 net + 10.00 tax
        assert_eq!(suggest_refund(&transaction, &item, 1).cents(), 11000);
        // Quantity is capped at what was sold
        assert_eq!(suggest_refund(&transaction, &item, 5).cents(), 22000);

        let line = ReturnLine::for_item(&item, 1, Money::from_cents(11000));
        assert_eq!(line.item_ref(), Some(ItemRef::InStore(1)));
    }
}
