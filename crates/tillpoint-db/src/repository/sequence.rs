//! # Sequence Issuer
//!
//! Hands out invoice and return numbers from the `sequences` table.
//!
//! ```sql
//! UPDATE sequences SET last_value = last_value + 1
//! WHERE name = ?
//! RETURNING last_value
//! ```
//!
//! The increment and the read are one statement, so two callers can never
//! see the same value. Issued inside a coordinator's transaction, the
//! increment rolls back with the sale or return; the next attempt gets the
//! same number again.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tillpoint_core::sequence::SequenceKind;

/// Issues the next formatted number of `kind` on an open connection.
pub(crate) async fn issue(conn: &mut SqliteConnection, kind: SequenceKind) -> DbResult<String> {
    let value: i64 = sqlx::query_scalar(
        r#"
        UPDATE sequences
        SET last_value = last_value + 1
        WHERE name = ?1
        RETURNING last_value
        "#,
    )
    .bind(kind.name())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("sequence", kind.name()))?;

    let formatted = kind.format(value);
    debug!(sequence = kind.name(), value, number = %formatted, "Issued number");
    Ok(formatted)
}

/// Standalone access to the business-number counters.
#[derive(Debug, Clone)]
pub struct SequenceIssuer {
    pool: SqlitePool,
}

impl SequenceIssuer {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceIssuer { pool }
    }

    /// Next invoice number, e.g. `"0000042"`.
    pub async fn next_invoice_number(&self) -> DbResult<String> {
        self.next(SequenceKind::Invoice).await
    }

    /// Next return number, e.g. `"RTN-000007"`.
    pub async fn next_return_number(&self) -> DbResult<String> {
        self.next(SequenceKind::Return).await
    }

    /// Consumes and returns the next number of `kind`.
    pub async fn next(&self, kind: SequenceKind) -> DbResult<String> {
        let mut conn = self.pool.acquire().await?;
        issue(&mut conn, kind).await
    }

    /// The number `next` would return, without consuming it.
    ///
    /// Only a preview: another caller may take it first.
    pub async fn peek_next(&self, kind: SequenceKind) -> DbResult<String> {
        let last: i64 = sqlx::query_scalar("SELECT last_value FROM sequences WHERE name = ?1")
            .bind(kind.name())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("sequence", kind.name()))?;

        Ok(kind.format(last + 1))
    }
}
