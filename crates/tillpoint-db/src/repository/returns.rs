//! # Return Repository
//!
//! Return headers (`pos_returns`) and lines (`pos_return_items`).
//!
//! `pos_returns.invoice_no` carries a UNIQUE index: whichever of two
//! concurrent returns for one invoice commits second fails on the header
//! insert.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tillpoint_core::returns::ReturnLine;
use tillpoint_core::{PaymentMethod, PosReturn, PosReturnItem};

#[derive(Debug, FromRow)]
struct ReturnRow {
    id: String,
    return_no: String,
    invoice_no: String,
    cashier_id: i64,
    supervisor_id: i64,
    refund_total_cents: i64,
    refund_method: PaymentMethod,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ReturnRow> for PosReturn {
    fn from(row: ReturnRow) -> Self {
        PosReturn {
            return_id: row.id,
            return_no: row.return_no,
            invoice_no: row.invoice_no,
            cashier_id: row.cashier_id,
            supervisor_id: row.supervisor_id,
            refund_total_cents: row.refund_total_cents,
            refund_method: row.refund_method,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReturnItemRow {
    id: i64,
    return_id: String,
    invoice_item_id: i64,
    online_item_id: Option<i64>,
    in_store_item_id: Option<i64>,
    qty_returned: i64,
    refund_amount_cents: i64,
}

impl From<ReturnItemRow> for PosReturnItem {
    fn from(row: ReturnItemRow) -> Self {
        PosReturnItem {
            id: row.id,
            return_id: row.return_id,
            invoice_item_id: row.invoice_item_id,
            online_item_id: row.online_item_id,
            in_store_item_id: row.in_store_item_id,
            qty_returned: row.qty_returned,
            refund_amount_cents: row.refund_amount_cents,
        }
    }
}

pub(crate) async fn insert_header(conn: &mut SqliteConnection, ret: &PosReturn) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pos_returns (
            id, return_no, invoice_no, cashier_id, supervisor_id,
            refund_total_cents, refund_method, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&ret.return_id)
    .bind(&ret.return_no)
    .bind(&ret.invoice_no)
    .bind(ret.cashier_id)
    .bind(ret.supervisor_id)
    .bind(ret.refund_total_cents)
    .bind(ret.refund_method)
    .bind(&ret.notes)
    .bind(ret.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(return_no = %ret.return_no, invoice_no = %ret.invoice_no, "Inserted return header");
    Ok(())
}

pub(crate) async fn insert_lines(
    conn: &mut SqliteConnection,
    return_id: &str,
    lines: &[ReturnLine],
) -> DbResult<u64> {
    if lines.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        INSERT INTO pos_return_items (
            return_id, invoice_item_id, online_item_id, in_store_item_id,
            qty_returned, refund_amount_cents
        )
        "#,
    );
    builder.push_values(lines, |mut row, line| {
        row.push_bind(return_id)
            .push_bind(line.invoice_item_id)
            .push_bind(line.online_item_id)
            .push_bind(line.in_store_item_id)
            .push_bind(line.qty_returned)
            .push_bind(line.refund_amount_cents);
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Read access to committed returns.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// The return recorded against an invoice, if any.
    pub async fn find_by_invoice(&self, invoice_no: &str) -> DbResult<Option<PosReturn>> {
        let row: Option<ReturnRow> = sqlx::query_as(
            r#"
            SELECT id, return_no, invoice_no, cashier_id, supervisor_id,
                   refund_total_cents, refund_method, notes, created_at
            FROM pos_returns
            WHERE invoice_no = ?1
            "#,
        )
        .bind(invoice_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PosReturn::from))
    }

    pub async fn items(&self, return_id: &str) -> DbResult<Vec<PosReturnItem>> {
        let rows: Vec<ReturnItemRow> = sqlx::query_as(
            r#"
            SELECT id, return_id, invoice_item_id, online_item_id, in_store_item_id,
                   qty_returned, refund_amount_cents
            FROM pos_return_items
            WHERE return_id = ?1
            ORDER BY id
            "#,
        )
        .bind(return_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PosReturnItem::from).collect())
    }
}
