//! # Checkout Coordinator
//!
//! Turns a priced cart into a committed sale in one database transaction.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_request (no writes)                                          │
//! │       │                                                                 │
//! │  BEGIN                                                                  │
//! │   1. resolve every SKU                     UnknownSku ──► ROLLBACK     │
//! │   2. price lines against the snapshot                                  │
//! │   3. settle payment                        InsufficientPayment         │
//! │   4. stock − others' holds ≥ ordered       InsufficientStock           │
//! │   5. issue invoice number                                              │
//! │   6. insert header + lines                                             │
//! │   7. batched decrement, one UPDATE per table                           │
//! │   8. audit entry (savepoint, never fails the sale)                     │
//! │   9. release this cart's holds                                         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure after BEGIN rolls back every step, including the invoice
//! number.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{activity, inventory, reservation, sequence, transaction};
use tillpoint_core::checkout::{
    price_cart, quantities_by_sku, settle_payment, validate_request, CartTotals, CheckoutReceipt,
    CheckoutRequest, PricedLine,
};
use tillpoint_core::promotion::PromotionSnapshot;
use tillpoint_core::sequence::SequenceKind;
use tillpoint_core::{
    ActivityType, CartLine, Channel, InventoryItem, PosTransaction, StockTable, TaxRate,
};

/// Commits sales.
#[derive(Debug, Clone)]
pub struct CheckoutCoordinator {
    pool: SqlitePool,
    tax_rate: TaxRate,
    channel: Channel,
}

impl CheckoutCoordinator {
    /// Creates a coordinator that taxes at `tax_rate` and prices promotions
    /// for `channel`.
    pub fn new(pool: SqlitePool, tax_rate: TaxRate, channel: Channel) -> Self {
        CheckoutCoordinator {
            pool,
            tax_rate,
            channel,
        }
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    /// Commits a sale priced against `snapshot`.
    pub async fn commit_sale(
        &self,
        request: &CheckoutRequest,
        snapshot: &PromotionSnapshot,
    ) -> DbResult<CheckoutReceipt> {
        self.commit_sale_at(request, snapshot, Utc::now()).await
    }

    /// [`commit_sale`](Self::commit_sale) as of `now`.
    pub async fn commit_sale_at(
        &self,
        request: &CheckoutRequest,
        snapshot: &PromotionSnapshot,
        now: DateTime<Utc>,
    ) -> DbResult<CheckoutReceipt> {
        validate_request(request)?;

        let mut tx = self.pool.begin().await?;
        match self.run(&mut tx, request, snapshot, now).await {
            Ok(receipt) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::in_transaction("checkout", e.into()))?;

                info!(
                    invoice_no = %receipt.invoice_no,
                    total = %receipt.totals.total,
                    lines = request.lines.len(),
                    staff_id = request.staff_id,
                    "Sale committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(?rollback_err, "Checkout rollback failed");
                }
                debug!(?e, staff_id = request.staff_id, "Checkout rolled back");
                Err(DbError::in_transaction("checkout", e))
            }
        }
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        request: &CheckoutRequest,
        snapshot: &PromotionSnapshot,
        now: DateTime<Utc>,
    ) -> DbResult<CheckoutReceipt> {
        // 1. Resolve, reading stock inside the transaction
        let mut catalog: HashMap<String, InventoryItem> = HashMap::new();
        for line in &request.lines {
            if !catalog.contains_key(&line.sku) {
                let item = inventory::resolve_sku(conn, &line.sku).await?;
                catalog.insert(line.sku.clone(), item);
            }
        }

        // 2. Price; lines without a category inherit the catalog's
        let lines: Vec<CartLine> = request
            .lines
            .iter()
            .map(|line| {
                let mut line = line.clone();
                if line.category_id.is_none() {
                    line.category_id = catalog
                        .get(&line.sku)
                        .and_then(|item| item.category_id.clone());
                }
                line
            })
            .collect();
        let priced = price_cart(&lines, snapshot, now, self.channel);
        let totals = CartTotals::compute(&priced, self.tax_rate);

        // 3. Payment
        let change = settle_payment(&request.payment, &totals)?;

        // 4. Stock net of other carts' holds
        let ordered = quantities_by_sku(&lines);
        let mut decrements: HashMap<StockTable, Vec<(String, i64)>> = HashMap::new();
        for (sku, qty) in &ordered {
            let item = lookup(&catalog, sku)?;
            reservation::availability_for(
                conn,
                item,
                *qty,
                request.reservation_key.as_deref(),
                now,
            )
            .await?
            .into_result()?;

            decrements
                .entry(item.item_ref().table())
                .or_default()
                .push((sku.clone(), -qty));
        }

        // 5. Number
        let invoice_no = sequence::issue(conn, SequenceKind::Invoice).await?;

        // 6. Header and lines
        let header = PosTransaction {
            id: Uuid::new_v4().to_string(),
            invoice_no: invoice_no.clone(),
            transaction_date: now,
            payment_method: request.payment.method,
            staff_id: request.staff_id,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tax_cents: totals.tax.cents(),
            total_amount_cents: totals.total.cents(),
            received_amount_cents: request.payment.amount_received_cents,
            change_cents: change.cents(),
            payment_ref_no: request.payment.reference_no.clone(),
            promotion_version: Some(snapshot.version),
        };
        transaction::insert_header(conn, &header).await?;

        let items = priced
            .iter()
            .map(|line| lookup(&catalog, &line.line.sku).map(|item| sale_item(line, item)))
            .collect::<DbResult<Vec<_>>>()?;
        transaction::insert_items(conn, &header.id, &items).await?;

        // 7. Stock
        for table in [StockTable::InStore, StockTable::Online] {
            if let Some(deltas) = decrements.get(&table) {
                inventory::adjust_by_sku(conn, table, deltas, now).await?;
            }
        }

        // 8. Audit
        let details = json!({
            "invoice_no": invoice_no,
            "transaction_id": header.id,
            "total_cents": header.total_amount_cents,
            "lines": items.len(),
        });
        activity::append_in_savepoint(conn, request.staff_id, ActivityType::Sale, &details, now)
            .await;

        // 9. Holds
        let released_reservations = match request.reservation_key.as_deref() {
            Some(key) => reservation::clear_for_transaction(conn, key).await?,
            None => 0,
        };

        Ok(CheckoutReceipt {
            transaction_id: header.id,
            invoice_no,
            totals,
            change,
            released_reservations,
        })
    }
}

fn lookup<'a>(catalog: &'a HashMap<String, InventoryItem>, sku: &str) -> DbResult<&'a InventoryItem> {
    catalog
        .get(sku)
        .ok_or_else(|| DbError::Internal(format!("SKU {sku} was not resolved")))
}

fn sale_item(line: &PricedLine, item: &InventoryItem) -> transaction::NewTransactionItem {
    transaction::NewTransactionItem {
        sku: line.line.sku.clone(),
        order_quantity: line.line.quantity,
        stock_quantity_at_sale: item.quantity,
        unit_price_cents: line.line.unit_price_cents,
        discount_cents: line.pricing.discount.cents(),
        subtotal_cents: line.net().cents(),
        promotion_id: line.pricing.promotion_id.clone(),
        sale_channel: item.channel,
        item_ref: item.item_ref(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_db, stock_item};
    use chrono::Duration;
    use tillpoint_core::promotion::{AppliesTo, Promotion, PromotionType};
    use tillpoint_core::{CoreError, Money, PaymentInfo, PaymentMethod, ValidationError};

    fn coordinator(db: &crate::Database) -> CheckoutCoordinator {
        CheckoutCoordinator::new(db.pool().clone(), TaxRate::zero(), Channel::InStore)
    }

    fn request(lines: Vec<CartLine>, received_cents: i64) -> CheckoutRequest {
        CheckoutRequest {
            lines,
            payment: PaymentInfo::cash(Money::from_cents(received_cents)),
            staff_id: 7,
            reservation_key: None,
        }
    }

    fn empty_snapshot() -> PromotionSnapshot {
        PromotionSnapshot::empty(Utc::now())
    }

    #[tokio::test]
    async fn test_checkout_roundtrip() {
        let db = memory_db().await;
        let a = stock_item(&db, "A", Channel::InStore, 10000, 10).await;
        let b = stock_item(&db, "B", Channel::Both, 5000, 4).await;

        let cart = vec![
            CartLine::new("A", Money::from_cents(10000), 2),
            CartLine::new("B", Money::from_cents(5000), 1),
        ];
        let receipt = coordinator(&db)
            .commit_sale(&request(cart, 30000), &empty_snapshot())
            .await
            .unwrap();

        assert_eq!(receipt.invoice_no, "0000001");
        assert_eq!(receipt.totals.subtotal.to_string(), "250.00");
        assert_eq!(receipt.totals.discount.to_string(), "0.00");
        assert_eq!(receipt.totals.total.to_string(), "250.00");
        assert_eq!(receipt.change.to_string(), "50.00");

        // Decremented exactly once, in both backing tables
        let inventory = db.inventory();
        assert_eq!(inventory.stock_of(a.item_ref()).await.unwrap(), 8);
        assert_eq!(inventory.stock_of(b.item_ref()).await.unwrap(), 3);

        let sale = db.transactions().find_by_invoice("0000001").await.unwrap().unwrap();
        assert_eq!(sale.id, receipt.transaction_id);
        assert_eq!(sale.total_amount_cents, 25000);
        assert_eq!(sale.change_cents, 5000);
        assert_eq!(sale.promotion_version, Some(0));

        let items = db.transactions().items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].stock_quantity_at_sale, 10);
        assert_eq!(items[0].item_ref, a.item_ref());
        assert_eq!(items[1].sale_channel, Channel::Both);

        let audit = db.activity().for_staff(7).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].activity_type, ActivityType::Sale);
    }

    #[tokio::test]
    async fn test_repeated_sku_lines_decrement_once() {
        let db = memory_db().await;
        let a = stock_item(&db, "A", Channel::InStore, 100, 10).await;

        let cart = vec![
            CartLine::new("A", Money::from_cents(100), 2),
            CartLine::new("A", Money::from_cents(100), 3),
        ];
        coordinator(&db)
            .commit_sale(&request(cart, 500), &empty_snapshot())
            .await
            .unwrap();

        assert_eq!(db.inventory().stock_of(a.item_ref()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_promotion_discount_and_tax() {
        let db = memory_db().await;
        stock_item(&db, "TEE", Channel::InStore, 10000, 5).await;

        let snapshot = PromotionSnapshot {
            version: 4,
            fetched_at: Utc::now(),
            promotions: vec![Promotion {
                id: "ten-pct".to_string(),
                title: "10% off".to_string(),
                promotion_type: PromotionType::Percentage,
                value: 1000,
                min_purchase_cents: 0,
                sale_channel: Channel::Both,
                activation_date: Utc::now() - Duration::days(1),
                expiration_date: None,
                applies_to: AppliesTo::Category,
                applies_to_id: Some("general".to_string()),
            }],
        };
        let checkout =
            CheckoutCoordinator::new(db.pool().clone(), TaxRate::from_bps(1000), Channel::InStore);

        // Category comes from the catalog row
        let cart = vec![CartLine::new("TEE", Money::from_cents(10000), 2)];
        let receipt = checkout.commit_sale(&request(cart, 20000), &snapshot).await.unwrap();

        assert_eq!(receipt.totals.discount.cents(), 2000);
        assert_eq!(receipt.totals.tax.cents(), 1800);
        assert_eq!(receipt.totals.total.cents(), 19800);

        let sale = db.transactions().find_by_invoice(&receipt.invoice_no).await.unwrap().unwrap();
        assert_eq!(sale.promotion_version, Some(4));
        let items = db.transactions().items(&sale.id).await.unwrap();
        assert_eq!(items[0].promotion_id.as_deref(), Some("ten-pct"));
        assert_eq!(items[0].subtotal_cents, 18000);
    }

    #[tokio::test]
    async fn test_insufficient_payment_writes_nothing() {
        let db = memory_db().await;
        let a = stock_item(&db, "A", Channel::InStore, 10000, 10).await;

        let cart = vec![CartLine::new("A", Money::from_cents(10000), 1)];
        let err = coordinator(&db)
            .commit_sale(&request(cart, 9999), &empty_snapshot())
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::InsufficientPayment { .. })
        ));
        assert_eq!(db.inventory().stock_of(a.item_ref()).await.unwrap(), 10);
        assert!(db.transactions().recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_carts_holds_block_checkout() {
        let db = memory_db().await;
        let a = stock_item(&db, "A", Channel::InStore, 100, 3).await;
        db.reservations(Duration::minutes(15))
            .upsert("other-cart", "A", 2)
            .await
            .unwrap();

        let cart = vec![CartLine::new("A", Money::from_cents(100), 2)];
        let err = coordinator(&db)
            .commit_sale(&request(cart, 200), &empty_snapshot())
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::InsufficientStock { available: 1, .. })
        ));
        assert_eq!(db.inventory().stock_of(a.item_ref()).await.unwrap(), 3);

        // The failed attempt did not consume an invoice number
        let next = db.sequences().next_invoice_number().await.unwrap();
        assert_eq!(next, "0000001");
    }

    #[tokio::test]
    async fn test_own_holds_released_with_sale() {
        let db = memory_db().await;
        stock_item(&db, "A", Channel::InStore, 100, 3).await;
        let store = db.reservations(Duration::minutes(15));
        store.upsert("cart-1", "A", 3).await.unwrap();

        let mut req = request(vec![CartLine::new("A", Money::from_cents(100), 3)], 300);
        req.reservation_key = Some("cart-1".to_string());

        let receipt = coordinator(&db).commit_sale(&req, &empty_snapshot()).await.unwrap();
        assert_eq!(receipt.released_reservations, 1);
        assert!(store.reservations_for("cart-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sku_rolls_back() {
        let db = memory_db().await;
        stock_item(&db, "A", Channel::InStore, 100, 3).await;

        let cart = vec![
            CartLine::new("A", Money::from_cents(100), 1),
            CartLine::new("GHOST", Money::from_cents(100), 1),
        ];
        let err = coordinator(&db)
            .commit_sale(&request(cart, 1000), &empty_snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err.as_rejection(), Some(CoreError::UnknownSku(_))));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_writes() {
        let db = memory_db().await;

        let err = coordinator(&db)
            .commit_sale(&request(vec![], 0), &empty_snapshot())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::Validation(ValidationError::Empty { .. }))
        ));

        let mut card = request(vec![CartLine::new("A", Money::from_cents(100), 1)], 100);
        card.payment.method = PaymentMethod::Card;
        assert!(coordinator(&db).commit_sale(&card, &empty_snapshot()).await.is_err());
    }

    #[tokio::test]
    async fn test_successive_sales_get_increasing_invoices() {
        let db = memory_db().await;
        stock_item(&db, "A", Channel::InStore, 100, 10).await;
        let checkout = coordinator(&db);
        let cart = vec![CartLine::new("A", Money::from_cents(100), 1)];

        let first = checkout.commit_sale(&request(cart.clone(), 100), &empty_snapshot()).await.unwrap();
        let second = checkout.commit_sale(&request(cart, 100), &empty_snapshot()).await.unwrap();
        assert!(second.invoice_no > first.invoice_no);
    }
}
