//! # Inventory Repository
//!
//! SKU resolution, stock reads and batched quantity adjustments across the
//! two physical inventory tables.
//!
//! ## Backing Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_sku("TEE-RED-M")                                               │
//! │       │                                                                 │
//! │       ├──► in_store_items  (channel = in_store)        checked first    │
//! │       └──► online_items    (channel = online | both)                    │
//! │                                                                         │
//! │  found in neither ──► UnknownSku (fails closed)                        │
//! │  found in both    ──► UnknownSku + error! log (data error)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Batched Adjustment
//! One statement per table, never one round trip per SKU:
//! ```sql
//! UPDATE in_store_items
//! SET quantity = quantity + CASE sku WHEN ? THEN ? WHEN ? THEN ? END,
//!     updated_at = ?
//! WHERE sku IN (?, ?)
//! ```
//! `CHECK (quantity >= 0)` on both tables turns an over-decrement into a
//! constraint error that rolls the statement back.

use chrono::{DateTime, Utc};
use sqlx::{Encode, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Type};
use tracing::{debug, error};

use crate::error::{DbError, DbResult};
use tillpoint_core::{Channel, CoreError, InventoryItem, ItemRef, StockTable};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct InventoryRow {
    id: i64,
    sku: String,
    name: String,
    category_id: Option<String>,
    unit_price_cents: i64,
    quantity: i64,
    channel: Channel,
}

impl From<InventoryRow> for InventoryItem {
    fn from(row: InventoryRow) -> Self {
        InventoryItem {
            id: row.id,
            sku: row.sku,
            name: row.name,
            category_id: row.category_id,
            unit_price_cents: row.unit_price_cents,
            quantity: row.quantity,
            channel: row.channel,
        }
    }
}

/// A new catalog row.
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub sku: String,
    pub name: String,
    pub category_id: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub channel: Channel,
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Looks up a SKU in both tables. `Ok(None)` when it exists in neither.
pub(crate) async fn find_by_sku(
    conn: &mut SqliteConnection,
    sku: &str,
) -> DbResult<Option<InventoryItem>> {
    let rows: Vec<InventoryRow> = sqlx::query_as(
        r#"
        SELECT id, sku, name, category_id, unit_price_cents, quantity, channel
        FROM (
            SELECT 0 AS source, id, sku, name, category_id, unit_price_cents, quantity,
                   'in_store' AS channel
            FROM in_store_items
            WHERE sku = ?1
            UNION ALL
            SELECT 1 AS source, id, sku, name, category_id, unit_price_cents, quantity,
                   channel
            FROM online_items
            WHERE sku = ?1
        )
        ORDER BY source
        "#,
    )
    .bind(sku)
    .fetch_all(&mut *conn)
    .await?;

    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (None, _) => Ok(None),
        (Some(row), None) => Ok(Some(row.into())),
        (Some(_), Some(_)) => {
            error!(sku = %sku, "SKU exists in both in-store and online inventory");
            Err(CoreError::UnknownSku(sku.to_string()).into())
        }
    }
}

/// Resolves a SKU or fails closed with `UnknownSku`.
pub(crate) async fn resolve_sku(conn: &mut SqliteConnection, sku: &str) -> DbResult<InventoryItem> {
    find_by_sku(conn, sku)
        .await?
        .ok_or_else(|| CoreError::UnknownSku(sku.to_string()).into())
}

/// Current physical stock of one row.
pub(crate) async fn stock_of(conn: &mut SqliteConnection, item: ItemRef) -> DbResult<i64> {
    let sql = format!(
        "SELECT quantity FROM {} WHERE id = ?1",
        item.table().table_name()
    );

    sqlx::query_scalar::<_, i64>(&sql)
        .bind(item.id())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found(item.table().table_name(), item.id().to_string()))
}

/// Applies signed quantity deltas keyed by SKU in one statement.
pub(crate) async fn adjust_by_sku(
    conn: &mut SqliteConnection,
    table: StockTable,
    deltas: &[(String, i64)],
    now: DateTime<Utc>,
) -> DbResult<u64> {
    apply_deltas(conn, table, "sku", deltas, now).await
}

/// Applies signed quantity deltas keyed by row id in one statement.
pub(crate) async fn adjust_by_id(
    conn: &mut SqliteConnection,
    table: StockTable,
    deltas: &[(i64, i64)],
    now: DateTime<Utc>,
) -> DbResult<u64> {
    apply_deltas(conn, table, "id", deltas, now).await
}

async fn apply_deltas<K>(
    conn: &mut SqliteConnection,
    table: StockTable,
    key_column: &'static str,
    deltas: &[(K, i64)],
    now: DateTime<Utc>,
) -> DbResult<u64>
where
    K: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    if deltas.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "UPDATE {} SET quantity = quantity + CASE {} ",
        table.table_name(),
        key_column
    ));
    for (key, delta) in deltas {
        builder.push("WHEN ");
        builder.push_bind(key.clone());
        builder.push(" THEN ");
        builder.push_bind(*delta);
        builder.push(" ");
    }
    builder.push("ELSE 0 END, updated_at = ");
    builder.push_bind(now);
    builder.push(format!(" WHERE {} IN (", key_column));
    let mut keys = builder.separated(", ");
    for (key, _) in deltas {
        keys.push_bind(key.clone());
    }
    keys.push_unseparated(")");

    let result = builder.build().execute(&mut *conn).await?;
    let affected = result.rows_affected();

    if affected != deltas.len() as u64 {
        error!(
            table = table.table_name(),
            expected = deltas.len(),
            affected,
            "Quantity adjustment touched an unexpected number of rows"
        );
        return Err(DbError::QueryFailed(format!(
            "expected to adjust {} rows in {}, adjusted {}",
            deltas.len(),
            table.table_name(),
            affected
        )));
    }

    debug!(table = table.table_name(), rows = affected, ?deltas, "Adjusted stock");
    Ok(affected)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the inventory / catalog boundary.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Resolves a SKU to its backing row. Fails closed with `UnknownSku`.
    pub async fn resolve_sku(&self, sku: &str) -> DbResult<InventoryItem> {
        let mut conn = self.pool.acquire().await?;
        resolve_sku(&mut conn, sku).await
    }

    /// Looks up a SKU, returning `None` when it does not exist.
    pub async fn find_by_sku(&self, sku: &str) -> DbResult<Option<InventoryItem>> {
        let mut conn = self.pool.acquire().await?;
        find_by_sku(&mut conn, sku).await
    }

    /// Reads current physical stock for an item.
    pub async fn stock_of(&self, item: ItemRef) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        stock_of(&mut conn, item).await
    }

    /// Applies signed deltas to a set of SKUs in one table, atomically.
    ///
    /// Fails without changing anything if any SKU is missing from the table
    /// or any quantity would go negative.
    pub async fn adjust_quantities(
        &self,
        table: StockTable,
        deltas: &[(String, i64)],
    ) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let affected = adjust_by_sku(&mut tx, table, deltas, Utc::now()).await?;
        tx.commit().await?;
        Ok(affected)
    }

    /// Inserts a catalog row into the table its channel maps to.
    pub async fn create(&self, item: NewInventoryItem) -> DbResult<InventoryItem> {
        let now = Utc::now();
        debug!(sku = %item.sku, channel = item.channel.as_str(), "Creating inventory item");

        let id: i64 = match item.channel.backing_table() {
            StockTable::InStore => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO in_store_items (
                        sku, name, category_id, unit_price_cents, quantity, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    RETURNING id
                    "#,
                )
                .bind(&item.sku)
                .bind(&item.name)
                .bind(&item.category_id)
                .bind(item.unit_price_cents)
                .bind(item.quantity)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
            }
            StockTable::Online => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO online_items (
                        sku, name, category_id, unit_price_cents, quantity, channel, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    RETURNING id
                    "#,
                )
                .bind(&item.sku)
                .bind(&item.name)
                .bind(&item.category_id)
                .bind(item.unit_price_cents)
                .bind(item.quantity)
                .bind(item.channel)
                .bind(now)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(InventoryItem {
            id,
            sku: item.sku,
            name: item.name,
            category_id: item.category_id,
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
            channel: item.channel,
        })
    }

    /// Lists every item in both tables, ordered by SKU.
    pub async fn list_all(&self) -> DbResult<Vec<InventoryItem>> {
        let rows: Vec<InventoryRow> = sqlx::query_as(
            r#"
            SELECT id, sku, name, category_id, unit_price_cents, quantity, 'in_store' AS channel
            FROM in_store_items
            UNION ALL
            SELECT id, sku, name, category_id, unit_price_cents, quantity, channel
            FROM online_items
            ORDER BY sku
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::testing::new_item;

    #[tokio::test]
    async fn test_resolve_sku_per_channel() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let counter = repo.create(new_item("MUG-01", Channel::InStore, 5)).await.unwrap();
        let web = repo.create(new_item("TEE-RED-M", Channel::Both, 8)).await.unwrap();

        let resolved = repo.resolve_sku("MUG-01").await.unwrap();
        assert_eq!(resolved.item_ref(), ItemRef::InStore(counter.id));

        let resolved = repo.resolve_sku("TEE-RED-M").await.unwrap();
        assert_eq!(resolved.item_ref(), ItemRef::Online(web.id));
        assert_eq!(resolved.channel, Channel::Both);
    }

    #[tokio::test]
    async fn test_unknown_and_ambiguous_sku_fail_closed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let err = repo.resolve_sku("NOPE").await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(CoreError::UnknownSku(_))));

        repo.create(new_item("DUP-1", Channel::InStore, 1)).await.unwrap();
        repo.create(new_item("DUP-1", Channel::Online, 1)).await.unwrap();
        let err = repo.resolve_sku("DUP-1").await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(CoreError::UnknownSku(_))));
    }

    #[tokio::test]
    async fn test_adjust_quantities_batched() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let a = repo.create(new_item("A", Channel::InStore, 10)).await.unwrap();
        let b = repo.create(new_item("B", Channel::InStore, 4)).await.unwrap();

        let affected = repo
            .adjust_quantities(
                StockTable::InStore,
                &[("A".to_string(), -2), ("B".to_string(), 3)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(repo.stock_of(a.item_ref()).await.unwrap(), 8);
        assert_eq!(repo.stock_of(b.item_ref()).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_adjust_quantities_never_goes_negative() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let a = repo.create(new_item("A", Channel::InStore, 1)).await.unwrap();
        repo.create(new_item("B", Channel::InStore, 5)).await.unwrap();

        let err = repo
            .adjust_quantities(
                StockTable::InStore,
                &[("A".to_string(), -2), ("B".to_string(), -1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));

        // Nothing applied
        assert_eq!(repo.stock_of(a.item_ref()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_adjust_missing_sku_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let a = repo.create(new_item("A", Channel::Online, 3)).await.unwrap();
        let err = repo
            .adjust_quantities(
                StockTable::Online,
                &[("A".to_string(), -1), ("GHOST".to_string(), -1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));
        assert_eq!(repo.stock_of(a.item_ref()).await.unwrap(), 3);
    }
}
