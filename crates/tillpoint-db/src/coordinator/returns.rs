//! # Returns Coordinator
//!
//! Validates an invoice for return and commits the return in one database
//! transaction.
//!
//! ## Commit
//! ```text
//! request.validate()               InvalidReturn (first failing rule)
//!      │
//! BEGIN
//!  1. re-check eligibility         NotFound / TooOld / AlreadyReturned
//!  2. lines belong to the invoice, name the sold inventory row, and
//!     stay within the quantity sold
//!  3. issue return number
//!  4. insert header                UNIQUE(invoice_no) ──► AlreadyReturned
//!  5. insert lines
//!  6. restock, one UPDATE per table
//!  7. audit: supervisor authorized, cashier processed
//! COMMIT
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{activity, inventory, returns, sequence, transaction};
use tillpoint_core::returns::{ReturnEligibility, ReturnPolicy, ReturnReceipt, ReturnRequest};
use tillpoint_core::sequence::SequenceKind;
use tillpoint_core::validation::validate_invoice_no;
use tillpoint_core::{ActivityType, CoreError, PosReturn, ReturnRejection, StockTable};

/// Drives returns from invoice lookup to commit.
#[derive(Debug, Clone)]
pub struct ReturnsCoordinator {
    pool: SqlitePool,
    policy: ReturnPolicy,
}

impl ReturnsCoordinator {
    pub fn new(pool: SqlitePool, policy: ReturnPolicy) -> Self {
        ReturnsCoordinator { pool, policy }
    }

    pub fn policy(&self) -> ReturnPolicy {
        self.policy
    }

    // =========================================================================
    // Validate
    // =========================================================================

    /// Checks whether an invoice can be returned and loads its lines.
    pub async fn validate_invoice_for_return(&self, invoice_no: &str) -> DbResult<ReturnEligibility> {
        self.validate_invoice_for_return_at(invoice_no, Utc::now())
            .await
    }

    /// [`validate_invoice_for_return`](Self::validate_invoice_for_return) as of `now`.
    pub async fn validate_invoice_for_return_at(
        &self,
        invoice_no: &str,
        now: DateTime<Utc>,
    ) -> DbResult<ReturnEligibility> {
        validate_invoice_no(invoice_no)?;

        let mut conn = self.pool.acquire().await?;
        let status = transaction::invoice_status(&mut conn, invoice_no).await?;
        if let Err(rejection) = self.policy.check(invoice_no, status, now) {
            debug!(invoice_no = %invoice_no, %rejection, "Invoice not eligible for return");
            return Ok(ReturnEligibility::Rejected(rejection));
        }

        let transaction = transaction::find_by_invoice(&mut conn, invoice_no)
            .await?
            .ok_or_else(|| ReturnRejection::NotFound {
                invoice_no: invoice_no.to_string(),
            })?;
        let items = transaction::items_of(&mut conn, &transaction.id).await?;

        Ok(ReturnEligibility::Eligible { transaction, items })
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commits a return and restocks its lines.
    pub async fn commit_return(&self, request: &ReturnRequest) -> DbResult<ReturnReceipt> {
        self.commit_return_at(request, Utc::now()).await
    }

    /// [`commit_return`](Self::commit_return) as of `now`.
    pub async fn commit_return_at(
        &self,
        request: &ReturnRequest,
        now: DateTime<Utc>,
    ) -> DbResult<ReturnReceipt> {
        validate_invoice_no(&request.invoice_no)?;
        request.validate()?;

        let mut tx = self.pool.begin().await?;
        match self.run(&mut tx, request, now).await {
            Ok(receipt) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::in_transaction("return", e.into()))?;

                info!(
                    return_no = %receipt.return_no,
                    invoice_no = %receipt.invoice_no,
                    refund = %receipt.refund_total,
                    cashier_id = request.cashier_id,
                    supervisor_id = request.supervisor_id,
                    "Return committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(?rollback_err, "Return rollback failed");
                }
                debug!(?e, invoice_no = %request.invoice_no, "Return rolled back");
                Err(DbError::in_transaction("return", e))
            }
        }
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        request: &ReturnRequest,
        now: DateTime<Utc>,
    ) -> DbResult<ReturnReceipt> {
        let invoice_no = request.invoice_no.as_str();

        // 1. Eligibility, again, under the write transaction
        let status = transaction::invoice_status(conn, invoice_no).await?;
        self.policy.check(invoice_no, status, now)?;

        let sale = transaction::find_by_invoice(conn, invoice_no)
            .await?
            .ok_or_else(|| ReturnRejection::NotFound {
                invoice_no: invoice_no.to_string(),
            })?;
        let sold = transaction::items_of(conn, &sale.id).await?;

        // 2. Lines against what was sold; stock goes back to the sold row
        let mut returned: BTreeMap<i64, i64> = BTreeMap::new();
        let mut restock: BTreeMap<StockTable, BTreeMap<i64, i64>> = BTreeMap::new();
        for (index, line) in request.lines.iter().enumerate() {
            let n = index + 1;
            let item = sold
                .iter()
                .find(|item| item.id == line.invoice_item_id)
                .ok_or_else(|| {
                    CoreError::invalid_return(format!(
                        "line {n}: item {} is not part of invoice {invoice_no}",
                        line.invoice_item_id
                    ))
                })?;

            if line.item_ref() != Some(item.item_ref) {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: inventory reference does not match the {} sold on invoice {invoice_no}",
                    item.sku
                ))
                .into());
            }

            let total = returned.entry(item.id).or_insert(0);
            *total += line.qty_returned;
            if *total > item.order_quantity {
                return Err(CoreError::invalid_return(format!(
                    "line {n}: returning {} of {} exceeds the {} sold",
                    total, item.sku, item.order_quantity
                ))
                .into());
            }

            *restock
                .entry(item.item_ref.table())
                .or_default()
                .entry(item.item_ref.id())
                .or_insert(0) += line.qty_returned;
        }

        if request.refund_total() > sale.total_amount() {
            return Err(CoreError::invalid_return(format!(
                "refund total {} exceeds invoice total {}",
                request.refund_total(),
                sale.total_amount()
            ))
            .into());
        }

        // 3. Number
        let return_no = sequence::issue(conn, SequenceKind::Return).await?;

        // 4-5. Header and lines
        let header = PosReturn {
            return_id: Uuid::new_v4().to_string(),
            return_no: return_no.clone(),
            invoice_no: invoice_no.to_string(),
            cashier_id: request.cashier_id,
            supervisor_id: request.supervisor_id,
            refund_total_cents: request.refund_total_cents,
            refund_method: request.refund_method,
            notes: request.notes.clone(),
            created_at: now,
        };
        returns::insert_header(conn, &header).await.map_err(|e| {
            if e.is_unique_violation_on("pos_returns.invoice_no") {
                ReturnRejection::AlreadyReturned {
                    invoice_no: invoice_no.to_string(),
                }
                .into()
            } else {
                e
            }
        })?;
        returns::insert_lines(conn, &header.return_id, &request.lines).await?;

        // 6. Restock
        for (table, deltas) in &restock {
            let deltas: Vec<(i64, i64)> = deltas.iter().map(|(id, qty)| (*id, *qty)).collect();
            inventory::adjust_by_id(conn, *table, &deltas, now).await?;
        }

        // 7. Audit
        let details = json!({
            "return_no": return_no,
            "invoice_no": invoice_no,
            "refund_total_cents": request.refund_total_cents,
            "refund_method": request.refund_method,
        });
        activity::append_in_savepoint(
            conn,
            request.supervisor_id,
            ActivityType::ReturnAuthorized,
            &details,
            now,
        )
        .await;
        activity::append_in_savepoint(
            conn,
            request.cashier_id,
            ActivityType::ReturnProcessed,
            &details,
            now,
        )
        .await;

        Ok(ReturnReceipt {
            return_id: header.return_id,
            return_no,
            invoice_no: invoice_no.to_string(),
            refund_total: request.refund_total(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CheckoutCoordinator;
    use crate::testing::{file_db, memory_db, stock_item};
    use crate::Database;
    use chrono::Duration;
    use tillpoint_core::checkout::CheckoutRequest;
    use tillpoint_core::promotion::PromotionSnapshot;
    use tillpoint_core::returns::{suggest_refund, ReturnLine};
    use tillpoint_core::{CartLine, Channel, ItemRef, Money, PaymentInfo, PaymentMethod, TaxRate};

    /// Sells 2 × A at 100.00 and 1 × B at 50.00, `days_ago` days before now.
    async fn sell(db: &Database, days_ago: i64) -> (String, DateTime<Utc>) {
        let now = Utc::now();
        let sold_at = now - Duration::days(days_ago);
        let checkout =
            CheckoutCoordinator::new(db.pool().clone(), TaxRate::zero(), Channel::InStore);
        let receipt = checkout
            .commit_sale_at(
                &CheckoutRequest {
                    lines: vec![
                        CartLine::new("A", Money::from_cents(10000), 2),
                        CartLine::new("B", Money::from_cents(5000), 1),
                    ],
                    payment: PaymentInfo::cash(Money::from_cents(25000)),
                    staff_id: 3,
                    reservation_key: None,
                },
                &PromotionSnapshot::empty(sold_at),
                sold_at,
            )
            .await
            .unwrap();
        (receipt.invoice_no, now)
    }

    async fn setup() -> (Database, ItemRef, ItemRef) {
        stock(memory_db().await).await
    }

    async fn stock(db: Database) -> (Database, ItemRef, ItemRef) {
        let a = stock_item(&db, "A", Channel::InStore, 10000, 10).await;
        let b = stock_item(&db, "B", Channel::Online, 5000, 10).await;
        (db, a.item_ref(), b.item_ref())
    }

    async fn full_return(
        returns: &ReturnsCoordinator,
        invoice_no: &str,
        now: DateTime<Utc>,
    ) -> ReturnRequest {
        let eligibility = returns
            .validate_invoice_for_return_at(invoice_no, now)
            .await
            .unwrap();
        let ReturnEligibility::Eligible { transaction, items } = eligibility else {
            panic!("expected eligible invoice");
        };

        let lines: Vec<ReturnLine> = items
            .iter()
            .map(|item| {
                let refund = suggest_refund(&transaction, item, item.order_quantity);
                ReturnLine::for_item(item, item.order_quantity, refund)
            })
            .collect();

        ReturnRequest {
            invoice_no: invoice_no.to_string(),
            cashier_id: 3,
            supervisor_id: 9,
            refund_total_cents: lines.iter().map(|l| l.refund_amount_cents).sum(),
            refund_method: PaymentMethod::Cash,
            notes: Some("customer changed mind".to_string()),
            lines,
        }
    }

    #[tokio::test]
    async fn test_return_within_window_restocks() {
        let (db, a, b) = setup().await;
        let (invoice_no, now) = sell(&db, 6).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let request = full_return(&returns, &invoice_no, now).await;
        assert_eq!(request.refund_total_cents, 25000);

        let receipt = returns.commit_return_at(&request, now).await.unwrap();
        assert_eq!(receipt.return_no, "RTN-000001");
        assert_eq!(receipt.refund_total.cents(), 25000);

        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 10);
        assert_eq!(db.inventory().stock_of(b).await.unwrap(), 10);

        let stored = db.returns().find_by_invoice(&invoice_no).await.unwrap().unwrap();
        assert_eq!(stored.return_no, "RTN-000001");
        assert_eq!(db.returns().items(&stored.return_id).await.unwrap().len(), 2);

        let supervisor = db.activity().for_staff(9).await.unwrap();
        assert_eq!(supervisor[0].activity_type, ActivityType::ReturnAuthorized);
        let cashier = db.activity().for_staff(3).await.unwrap();
        assert!(cashier
            .iter()
            .any(|e| e.activity_type == ActivityType::ReturnProcessed));
    }

    #[tokio::test]
    async fn test_too_old_invoice_rejected() {
        let (db, _, _) = setup().await;
        let (invoice_no, now) = sell(&db, 8).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let eligibility = returns
            .validate_invoice_for_return_at(&invoice_no, now)
            .await
            .unwrap();
        assert!(matches!(
            eligibility.rejection(),
            Some(ReturnRejection::TooOld { age_days: 8, window_days: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_second_return_already_returned() {
        let (db, a, _) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let request = full_return(&returns, &invoice_no, now).await;
        returns.commit_return_at(&request, now).await.unwrap();

        let eligibility = returns
            .validate_invoice_for_return_at(&invoice_no, now)
            .await
            .unwrap();
        assert!(matches!(
            eligibility.rejection(),
            Some(ReturnRejection::AlreadyReturned { .. })
        ));

        // Committing the same request again is rejected and restocks nothing
        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::ReturnRejected(ReturnRejection::AlreadyReturned { .. }))
        ));
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_unknown_invoice_not_found() {
        let (db, _, _) = setup().await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let eligibility = returns.validate_invoice_for_return("0000404").await.unwrap();
        assert!(matches!(
            eligibility.rejection(),
            Some(ReturnRejection::NotFound { .. })
        ));

        assert!(returns.validate_invoice_for_return("RTN-1").await.is_err());
    }

    #[tokio::test]
    async fn test_over_return_rejected() {
        let (db, a, _) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let mut request = full_return(&returns, &invoice_no, now).await;
        request.lines[0].qty_returned = 3;

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::InvalidReturn { .. })
        ));
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 8);

        // Nothing was consumed
        assert_eq!(db.sequences().next_return_number().await.unwrap(), "RTN-000001");
    }

    #[tokio::test]
    async fn test_foreign_invoice_item_rejected() {
        let (db, _, _) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let mut request = full_return(&returns, &invoice_no, now).await;
        request.lines[0].invoice_item_id = 9999;

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(err.to_string().contains("not part of invoice"), "{err}");
    }

    #[tokio::test]
    async fn test_build_rules_checked_first() {
        let (db, _, _) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let mut request = full_return(&returns, &invoice_no, now).await;
        request.supervisor_id = 0;

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(err.to_string().contains("supervisor"), "{err}");
    }

    #[tokio::test]
    async fn test_line_must_name_the_sold_row() {
        let (db, a, _) = setup().await;
        let c = stock_item(&db, "C", Channel::InStore, 100, 5).await.item_ref();
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let mut request = full_return(&returns, &invoice_no, now).await;
        let line = request
            .lines
            .iter_mut()
            .find(|line| line.item_ref() == Some(a))
            .unwrap();
        line.in_store_item_id = Some(c.id());

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 8);
        assert_eq!(db.inventory().stock_of(c).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_line_with_both_refs_restocks_nothing() {
        let (db, a, b) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());

        let mut request = full_return(&returns, &invoice_no, now).await;
        let line = request
            .lines
            .iter_mut()
            .find(|line| line.item_ref() == Some(a))
            .unwrap();
        line.online_item_id = Some(b.id());

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(err.to_string().contains("only one"), "{err}");
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 8);
        assert_eq!(db.inventory().stock_of(b).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_return_landing_between_check_and_insert_is_already_returned() {
        let (db, a, _) = setup().await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());
        let request = full_return(&returns, &invoice_no, now).await;

        // Another till's return is written right after this one passes the
        // eligibility check, when the return number is issued.
        sqlx::query(&format!(
            r#"
            CREATE TRIGGER competing_return AFTER UPDATE ON sequences
            WHEN NEW.name = 'return'
            BEGIN
                INSERT INTO pos_returns (
                    id, return_no, invoice_no, cashier_id, supervisor_id,
                    refund_total_cents, refund_method, created_at
                ) VALUES (
                    'other-till', 'RTN-999999', '{invoice_no}', 4, 9,
                    100, 'cash', '2026-01-01T00:00:00Z'
                );
            END
            "#
        ))
        .execute(db.pool())
        .await
        .unwrap();

        let err = returns.commit_return_at(&request, now).await.unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::ReturnRejected(ReturnRejection::AlreadyReturned { .. }))
        ));
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 8);
        assert!(db.returns().find_by_invoice(&invoice_no).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_returns_restock_once() {
        let (db, a, b) = stock(file_db(4).await).await;
        let (invoice_no, now) = sell(&db, 1).await;
        let returns = ReturnsCoordinator::new(db.pool().clone(), ReturnPolicy::default());
        let request = full_return(&returns, &invoice_no, now).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let returns = returns.clone();
                let request = request.clone();
                tokio::spawn(async move { returns.commit_return_at(&request, now).await })
            })
            .collect();

        let mut committed = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                committed += 1;
            }
        }

        assert_eq!(committed, 1);
        assert_eq!(db.inventory().stock_of(a).await.unwrap(), 10);
        assert_eq!(db.inventory().stock_of(b).await.unwrap(), 10);
        assert!(db.returns().find_by_invoice(&invoice_no).await.unwrap().is_some());
        db.close().await;
    }
}
