//! # Transaction Repository
//!
//! Sale headers (`pos_transactions`) and their lines
//! (`pos_transaction_items`).
//!
//! Writes happen only inside the checkout coordinator's database transaction,
//! so the insert functions take a connection. The repository type is the read
//! side used by returns and reporting.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tillpoint_core::returns::InvoiceStatus;
use tillpoint_core::{Channel, ItemRef, PaymentMethod, PosTransaction, PosTransactionItem};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    invoice_no: String,
    transaction_date: DateTime<Utc>,
    payment_method: PaymentMethod,
    staff_id: i64,
    subtotal_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    total_amount_cents: i64,
    received_amount_cents: i64,
    change_cents: i64,
    payment_ref_no: Option<String>,
    promotion_version: Option<i64>,
}

impl From<TransactionRow> for PosTransaction {
    fn from(row: TransactionRow) -> Self {
        PosTransaction {
            id: row.id,
            invoice_no: row.invoice_no,
            transaction_date: row.transaction_date,
            payment_method: row.payment_method,
            staff_id: row.staff_id,
            subtotal_cents: row.subtotal_cents,
            discount_cents: row.discount_cents,
            tax_cents: row.tax_cents,
            total_amount_cents: row.total_amount_cents,
            received_amount_cents: row.received_amount_cents,
            change_cents: row.change_cents,
            payment_ref_no: row.payment_ref_no,
            promotion_version: row.promotion_version,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionItemRow {
    id: i64,
    transaction_id: String,
    sku: String,
    order_quantity: i64,
    stock_quantity_at_sale: i64,
    unit_price_cents: i64,
    discount_cents: i64,
    subtotal_cents: i64,
    promotion_id: Option<String>,
    sale_channel: Channel,
    online_item_id: Option<i64>,
    in_store_item_id: Option<i64>,
}

impl TryFrom<TransactionItemRow> for PosTransactionItem {
    type Error = DbError;

    fn try_from(row: TransactionItemRow) -> Result<Self, Self::Error> {
        let item_ref = match (row.in_store_item_id, row.online_item_id) {
            (Some(id), None) => ItemRef::InStore(id),
            (None, Some(id)) => ItemRef::Online(id),
            _ => {
                return Err(DbError::Internal(format!(
                    "transaction item {} must reference exactly one inventory row",
                    row.id
                )))
            }
        };

        Ok(PosTransactionItem {
            id: row.id,
            transaction_id: row.transaction_id,
            sku: row.sku,
            order_quantity: row.order_quantity,
            stock_quantity_at_sale: row.stock_quantity_at_sale,
            unit_price_cents: row.unit_price_cents,
            discount_cents: row.discount_cents,
            subtotal_cents: row.subtotal_cents,
            promotion_id: row.promotion_id,
            sale_channel: row.sale_channel,
            item_ref,
        })
    }
}

/// A sale line ready to insert. The row id is assigned by SQLite.
#[derive(Debug, Clone)]
pub(crate) struct NewTransactionItem {
    pub sku: String,
    pub order_quantity: i64,
    pub stock_quantity_at_sale: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub subtotal_cents: i64,
    pub promotion_id: Option<String>,
    pub sale_channel: Channel,
    pub item_ref: ItemRef,
}

// =============================================================================
// Connection-level operations
// =============================================================================

const TRANSACTION_COLUMNS: &str = r#"
    id, invoice_no, transaction_date, payment_method, staff_id,
    subtotal_cents, discount_cents, tax_cents, total_amount_cents,
    received_amount_cents, change_cents, payment_ref_no, promotion_version
"#;

const ITEM_COLUMNS: &str = r#"
    id, transaction_id, sku, order_quantity, stock_quantity_at_sale,
    unit_price_cents, discount_cents, subtotal_cents, promotion_id,
    sale_channel, online_item_id, in_store_item_id
"#;

pub(crate) async fn insert_header(
    conn: &mut SqliteConnection,
    transaction: &PosTransaction,
) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO pos_transactions ({TRANSACTION_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ))
    .bind(&transaction.id)
    .bind(&transaction.invoice_no)
    .bind(transaction.transaction_date)
    .bind(transaction.payment_method)
    .bind(transaction.staff_id)
    .bind(transaction.subtotal_cents)
    .bind(transaction.discount_cents)
    .bind(transaction.tax_cents)
    .bind(transaction.total_amount_cents)
    .bind(transaction.received_amount_cents)
    .bind(transaction.change_cents)
    .bind(&transaction.payment_ref_no)
    .bind(transaction.promotion_version)
    .execute(&mut *conn)
    .await?;

    debug!(id = %transaction.id, invoice_no = %transaction.invoice_no, "Inserted sale header");
    Ok(())
}

/// Inserts every line of a sale in one multi-row statement.
pub(crate) async fn insert_items(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    items: &[NewTransactionItem],
) -> DbResult<u64> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        INSERT INTO pos_transaction_items (
            transaction_id, sku, order_quantity, stock_quantity_at_sale,
            unit_price_cents, discount_cents, subtotal_cents, promotion_id,
            sale_channel, online_item_id, in_store_item_id
        )
        "#,
    );
    builder.push_values(items, |mut row, item| {
        let (online_item_id, in_store_item_id) = item.item_ref.split();
        row.push_bind(transaction_id)
            .push_bind(&item.sku)
            .push_bind(item.order_quantity)
            .push_bind(item.stock_quantity_at_sale)
            .push_bind(item.unit_price_cents)
            .push_bind(item.discount_cents)
            .push_bind(item.subtotal_cents)
            .push_bind(&item.promotion_id)
            .push_bind(item.sale_channel)
            .push_bind(online_item_id)
            .push_bind(in_store_item_id);
    });

    let result = builder.build().execute(&mut *conn).await?;
    debug!(transaction_id = %transaction_id, lines = result.rows_affected(), "Inserted sale lines");
    Ok(result.rows_affected())
}

pub(crate) async fn find_by_invoice(
    conn: &mut SqliteConnection,
    invoice_no: &str,
) -> DbResult<Option<PosTransaction>> {
    let row: Option<TransactionRow> = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM pos_transactions WHERE invoice_no = ?1"
    ))
    .bind(invoice_no)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(PosTransaction::from))
}

pub(crate) async fn items_of(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<Vec<PosTransactionItem>> {
    let rows: Vec<TransactionItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM pos_transaction_items WHERE transaction_id = ?1 ORDER BY id"
    ))
    .bind(transaction_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(PosTransactionItem::try_from).collect()
}

/// Sale date and number of returns recorded against an invoice.
pub(crate) async fn invoice_status(
    conn: &mut SqliteConnection,
    invoice_no: &str,
) -> DbResult<Option<InvoiceStatus>> {
    let row: Option<(DateTime<Utc>, i64)> = sqlx::query_as(
        r#"
        SELECT t.transaction_date,
               (SELECT COUNT(*) FROM pos_returns r WHERE r.invoice_no = t.invoice_no)
        FROM pos_transactions t
        WHERE t.invoice_no = ?1
        "#,
    )
    .bind(invoice_no)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(transaction_date, prior_returns)| InvoiceStatus {
        transaction_date,
        prior_returns,
    }))
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to committed sales.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Finds a sale by its invoice number.
    pub async fn find_by_invoice(&self, invoice_no: &str) -> DbResult<Option<PosTransaction>> {
        let mut conn = self.pool.acquire().await?;
        find_by_invoice(&mut conn, invoice_no).await
    }

    /// Lines of a sale, in insertion order.
    pub async fn items(&self, transaction_id: &str) -> DbResult<Vec<PosTransactionItem>> {
        let mut conn = self.pool.acquire().await?;
        items_of(&mut conn, transaction_id).await
    }

    pub async fn invoice_status(&self, invoice_no: &str) -> DbResult<Option<InvoiceStatus>> {
        let mut conn = self.pool.acquire().await?;
        invoice_status(&mut conn, invoice_no).await
    }

    /// Most recent sales first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<PosTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM pos_transactions \
             ORDER BY transaction_date DESC, invoice_no DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PosTransaction::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
