//! # Stock Reservation Store
//!
//! Per-cart, per-SKU temporary holds on stock with expiry.
//!
//! ## Reservation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  cart qty change ──► upsert(cart, sku, qty)                            │
//! │                         │                                               │
//! │                         ├── qty = 0      ──► row deleted               │
//! │                         ├── fits         ──► row inserted / updated,   │
//! │                         │                    expires_at = now + TTL    │
//! │                         └── doesn't fit  ──► InsufficientStock         │
//! │                                                                         │
//! │  row ends by one of:                                                    │
//! │    • checkout commit (same DB transaction as the sale)                 │
//! │    • remove / clear_for_transaction                                    │
//! │    • sweep_expired (expires_at <= now)                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No Oversell
//! The capacity check and the write are one statement:
//! ```sql
//! INSERT INTO stock_reservations (...)
//! SELECT ... WHERE stock - held_by_other_carts >= requested
//! ON CONFLICT (transaction_id, item_table, item_id) DO UPDATE ...
//! ```
//! SQLite runs it under the database write lock, so two carts racing for the
//! last units cannot both get a row. Zero affected rows means rejected.
//!
//! Expired rows stop counting the instant `expires_at <= now`, whether or not
//! the sweeper has removed them yet.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::inventory;
use tillpoint_core::validation::{validate_quantity, validate_sku, validate_transaction_key};
use tillpoint_core::{
    Availability, Channel, CoreError, InventoryItem, ItemRef, StockReservation, StockTable,
    ValidationError,
};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: String,
    transaction_id: String,
    item_table: StockTable,
    item_id: i64,
    sku: String,
    quantity: i64,
    channel: Channel,
    reserved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<ReservationRow> for StockReservation {
    fn from(row: ReservationRow) -> Self {
        StockReservation {
            reservation_id: row.id,
            transaction_id: row.transaction_id,
            item_ref: ItemRef::new(row.item_table, row.item_id),
            sku: row.sku,
            quantity: row.quantity,
            channel: row.channel,
            reserved_at: row.reserved_at,
            expires_at: row.expires_at,
        }
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Sum of unexpired holds on `item`, ignoring the holds of `excluding`.
pub(crate) async fn reserved_by_others(
    conn: &mut SqliteConnection,
    item: ItemRef,
    excluding: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let reserved: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM stock_reservations
        WHERE item_table = ?1
          AND item_id = ?2
          AND expires_at > ?3
          AND (?4 IS NULL OR transaction_id <> ?4)
        "#,
    )
    .bind(item.table())
    .bind(item.id())
    .bind(now)
    .bind(excluding)
    .fetch_one(&mut *conn)
    .await?;

    Ok(reserved)
}

/// Availability of `item` for `requested` units, as seen by `excluding`.
pub(crate) async fn availability_for(
    conn: &mut SqliteConnection,
    item: &InventoryItem,
    requested: i64,
    excluding: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<Availability> {
    let total_stock = inventory::stock_of(conn, item.item_ref()).await?;
    let reserved = reserved_by_others(conn, item.item_ref(), excluding, now).await?;
    Ok(Availability::compute(&item.sku, requested, total_stock, reserved))
}

/// Deletes every hold of one cart.
pub(crate) async fn clear_for_transaction(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM stock_reservations WHERE transaction_id = ?1")
        .bind(transaction_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Store
// =============================================================================

/// The only writer of `stock_reservations` rows.
#[derive(Debug, Clone)]
pub struct ReservationStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl ReservationStore {
    /// Creates a store whose holds live `ttl` from their last update.
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        ReservationStore { pool, ttl }
    }

    /// Hold lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // =========================================================================
    // Availability
    // =========================================================================

    /// Checks whether `requested` units of `sku` are free for a cart.
    ///
    /// `excluding` is the caller's own cart key, so its own holds don't count
    /// against it. Fails closed with `UnknownSku`.
    pub async fn check_available(
        &self,
        sku: &str,
        requested: i64,
        excluding: Option<&str>,
    ) -> DbResult<Availability> {
        self.check_available_at(sku, requested, excluding, Utc::now())
            .await
    }

    /// [`check_available`](Self::check_available) as of `now`.
    pub async fn check_available_at(
        &self,
        sku: &str,
        requested: i64,
        excluding: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Availability> {
        validate_sku(sku)?;
        if requested < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "quantity".to_string(),
            }
            .into());
        }

        let mut conn = self.pool.acquire().await?;
        let item = inventory::resolve_sku(&mut conn, sku).await?;
        availability_for(&mut conn, &item, requested, excluding, now).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Sets the cart's hold on `sku` to exactly `quantity` units.
    ///
    /// Creates the hold or overwrites it and pushes its expiry out to
    /// `now + ttl`. A quantity of 0 removes the hold. Returns availability
    /// as seen by the cart itself, i.e. before its own hold.
    pub async fn upsert(
        &self,
        transaction_id: &str,
        sku: &str,
        quantity: i64,
    ) -> DbResult<Availability> {
        self.upsert_at(transaction_id, sku, quantity, Utc::now())
            .await
    }

    /// [`upsert`](Self::upsert) as of `now`.
    pub async fn upsert_at(
        &self,
        transaction_id: &str,
        sku: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Availability> {
        validate_transaction_key(transaction_id)?;
        validate_sku(sku)?;

        let mut conn = self.pool.acquire().await?;
        let item = inventory::resolve_sku(&mut conn, sku).await?;

        if quantity == 0 {
            self.delete_hold(&mut conn, transaction_id, item.item_ref())
                .await?;
            return availability_for(&mut conn, &item, 0, Some(transaction_id), now).await;
        }
        validate_quantity(quantity)?;

        let item_ref = item.item_ref();
        let expires_at = now + self.ttl;
        let sql = format!(
            r#"
            INSERT INTO stock_reservations (
                id, transaction_id, item_table, item_id, sku,
                quantity, channel, reserved_at, expires_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
            WHERE (SELECT quantity FROM {table} WHERE id = ?4)
                - (SELECT COALESCE(SUM(quantity), 0)
                   FROM stock_reservations
                   WHERE item_table = ?3
                     AND item_id = ?4
                     AND transaction_id <> ?2
                     AND expires_at > ?8) >= ?6
            ON CONFLICT (transaction_id, item_table, item_id) DO UPDATE SET
                quantity = excluded.quantity,
                sku = excluded.sku,
                expires_at = excluded.expires_at
            "#,
            table = item_ref.table().table_name()
        );

        let result = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(transaction_id)
            .bind(item_ref.table())
            .bind(item_ref.id())
            .bind(&item.sku)
            .bind(quantity)
            .bind(item.channel)
            .bind(now)
            .bind(expires_at)
            .execute(&mut *conn)
            .await?;

        let availability =
            availability_for(&mut conn, &item, quantity, Some(transaction_id), now).await?;

        if result.rows_affected() == 0 {
            debug!(
                transaction_id = %transaction_id,
                sku = %sku,
                requested = quantity,
                available = availability.available,
                "Reservation rejected"
            );
            return Err(CoreError::InsufficientStock {
                sku: item.sku,
                requested: quantity,
                available: availability.available.max(0),
                total_stock: availability.total_stock,
                reserved: availability.reserved,
            }
            .into());
        }

        debug!(
            transaction_id = %transaction_id,
            sku = %sku,
            quantity,
            expires_at = %expires_at,
            "Reservation held"
        );
        Ok(availability)
    }

    /// Removes the cart's hold on one SKU. Returns rows removed (0 or 1).
    pub async fn remove(&self, transaction_id: &str, sku: &str) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let item = inventory::resolve_sku(&mut conn, sku).await?;
        self.delete_hold(&mut conn, transaction_id, item.item_ref())
            .await
    }

    /// Removes every hold of one cart. Idempotent.
    pub async fn clear_for_transaction(&self, transaction_id: &str) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let removed = clear_for_transaction(&mut conn, transaction_id).await?;
        debug!(transaction_id = %transaction_id, removed, "Cleared cart reservations");
        Ok(removed)
    }

    /// Removes every hold of several carts in one statement.
    pub async fn clear_for_transactions(&self, transaction_ids: &[String]) -> DbResult<u64> {
        if transaction_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM stock_reservations WHERE transaction_id IN (");
        let mut ids = builder.separated(", ");
        for id in transaction_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        debug!(carts = transaction_ids.len(), removed = result.rows_affected(), "Cleared reservations");
        Ok(result.rows_affected())
    }

    /// Deletes every hold whose expiry has passed.
    pub async fn sweep_expired(&self) -> DbResult<u64> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// [`sweep_expired`](Self::sweep_expired) as of `now`.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "Swept expired reservations");
        }
        Ok(removed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists a cart's holds, expired or not.
    pub async fn reservations_for(&self, transaction_id: &str) -> DbResult<Vec<StockReservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, item_table, item_id, sku,
                   quantity, channel, reserved_at, expires_at
            FROM stock_reservations
            WHERE transaction_id = ?1
            ORDER BY reserved_at, sku
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockReservation::from).collect())
    }

    /// Unexpired units held on `sku` by every cart except `excluding`.
    pub async fn reserved_quantity_at(
        &self,
        sku: &str,
        excluding: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        let item = inventory::resolve_sku(&mut conn, sku).await?;
        reserved_by_others(&mut conn, item.item_ref(), excluding, now).await
    }

    async fn delete_hold(
        &self,
        conn: &mut SqliteConnection,
        transaction_id: &str,
        item: ItemRef,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM stock_reservations
            WHERE transaction_id = ?1 AND item_table = ?2 AND item_id = ?3
            "#,
        )
        .bind(transaction_id)
        .bind(item.table())
        .bind(item.id())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{file_db, memory_db, stock_item};

    fn store(db: &crate::Database) -> ReservationStore {
        db.reservations(Duration::minutes(15))
    }

    #[tokio::test]
    async fn test_own_hold_does_not_count_against_itself() {
        let db = memory_db().await;
        stock_item(&db, "TEE-RED-M", Channel::Both, 2500, 10).await;
        let store = store(&db);

        let before = store.check_available("TEE-RED-M", 4, Some("cart-1")).await.unwrap();
        store.upsert("cart-1", "TEE-RED-M", 4).await.unwrap();
        let after = store.check_available("TEE-RED-M", 4, Some("cart-1")).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.available, 10);

        // Another cart sees the hold
        let other = store.check_available("TEE-RED-M", 7, Some("cart-2")).await.unwrap();
        assert_eq!(other.reserved, 4);
        assert_eq!(other.available, 6);
        assert!(!other.sufficient);
    }

    #[tokio::test]
    async fn test_upsert_sets_absolute_quantity() {
        let db = memory_db().await;
        stock_item(&db, "MUG-01", Channel::InStore, 900, 5).await;
        let store = store(&db);

        store.upsert("cart-1", "MUG-01", 2).await.unwrap();
        store.upsert("cart-1", "MUG-01", 3).await.unwrap();

        let holds = store.reservations_for("cart-1").await.unwrap();
        assert_eq!(holds.len(), 1);
        assert_eq!(holds[0].quantity, 3);
        assert_eq!(holds[0].channel, Channel::InStore);
    }

    #[tokio::test]
    async fn test_upsert_extends_expiry() {
        let db = memory_db().await;
        stock_item(&db, "MUG-01", Channel::InStore, 900, 5).await;
        let store = store(&db);
        let t0 = Utc::now();

        store.upsert_at("cart-1", "MUG-01", 1, t0).await.unwrap();
        store
            .upsert_at("cart-1", "MUG-01", 2, t0 + Duration::minutes(10))
            .await
            .unwrap();

        let holds = store.reservations_for("cart-1").await.unwrap();
        assert_eq!(holds[0].expires_at, t0 + Duration::minutes(25));
    }

    #[tokio::test]
    async fn test_no_oversell_across_carts() {
        let db = memory_db().await;
        stock_item(&db, "LAST-ONES", Channel::InStore, 100, 5).await;
        let store = store(&db);

        store.upsert("cart-1", "LAST-ONES", 3).await.unwrap();
        let err = store.upsert("cart-2", "LAST-ONES", 3).await.unwrap_err();

        match err.as_rejection() {
            Some(CoreError::InsufficientStock {
                available,
                total_stock,
                reserved,
                ..
            }) => {
                assert_eq!(*available, 2);
                assert_eq!(*total_stock, 5);
                assert_eq!(*reserved, 3);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Exactly the remainder still fits
        store.upsert("cart-2", "LAST-ONES", 2).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_carts_never_oversell() {
        let db = file_db(8).await;
        stock_item(&db, "HOT", Channel::InStore, 100, 5).await;
        let store = store(&db);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.upsert(&format!("cart-{i}"), "HOT", 1).await })
            })
            .collect();

        let mut held = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => held += 1,
                Err(e) => assert!(
                    matches!(e.as_rejection(), Some(CoreError::InsufficientStock { .. })),
                    "{e}"
                ),
            }
        }

        assert_eq!(held, 5);
        assert_eq!(store.reserved_quantity_at("HOT", None, Utc::now()).await.unwrap(), 5);
        db.close().await;
    }

    #[tokio::test]
    async fn test_zero_quantity_removes_hold() {
        let db = memory_db().await;
        stock_item(&db, "MUG-01", Channel::InStore, 900, 5).await;
        let store = store(&db);

        store.upsert("cart-1", "MUG-01", 2).await.unwrap();
        store.upsert("cart-1", "MUG-01", 0).await.unwrap();
        assert!(store.reservations_for("cart-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_hold_excluded_then_swept() {
        let db = memory_db().await;
        stock_item(&db, "TEE-RED-M", Channel::Online, 2500, 10).await;
        let store = store(&db);
        let t = Utc::now();

        store.upsert_at("cart-1", "TEE-RED-M", 6, t).await.unwrap();

        let held = store.reserved_quantity_at("TEE-RED-M", None, t + Duration::minutes(14)).await.unwrap();
        assert_eq!(held, 6);

        let later = t + Duration::minutes(16);
        let held = store.reserved_quantity_at("TEE-RED-M", None, later).await.unwrap();
        assert_eq!(held, 0);

        // Another cart can take the full stock even before the sweep
        store.upsert_at("cart-2", "TEE-RED-M", 10, later).await.unwrap();

        let swept = store.sweep_expired_at(later).await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.reservations_for("cart-1").await.unwrap().is_empty());
        assert_eq!(store.reservations_for("cart-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let db = memory_db().await;
        stock_item(&db, "A", Channel::InStore, 100, 10).await;
        stock_item(&db, "B", Channel::Online, 100, 10).await;
        let store = store(&db);

        store.upsert("cart-1", "A", 1).await.unwrap();
        store.upsert("cart-1", "B", 1).await.unwrap();
        store.upsert("cart-2", "A", 1).await.unwrap();
        store.upsert("cart-3", "B", 1).await.unwrap();

        assert_eq!(store.remove("cart-1", "A").await.unwrap(), 1);
        assert_eq!(store.remove("cart-1", "A").await.unwrap(), 0);
        assert_eq!(store.clear_for_transaction("cart-1").await.unwrap(), 1);
        assert_eq!(store.clear_for_transaction("cart-1").await.unwrap(), 0);

        let removed = store
            .clear_for_transactions(&["cart-2".to_string(), "cart-3".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.clear_for_transactions(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sku_fails_closed() {
        let db = memory_db().await;
        let store = store(&db);

        let err = store.check_available("GHOST", 1, None).await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(CoreError::UnknownSku(_))));

        let err = store.upsert("cart-1", "GHOST", 1).await.unwrap_err();
        assert!(matches!(err.as_rejection(), Some(CoreError::UnknownSku(_))));
    }

    #[tokio::test]
    async fn test_invalid_quantities_rejected() {
        let db = memory_db().await;
        stock_item(&db, "A", Channel::InStore, 100, 2000).await;
        let store = store(&db);

        assert!(store.upsert("cart-1", "A", -1).await.is_err());
        assert!(store.upsert("cart-1", "A", 1000).await.is_err());
        assert!(store.upsert("", "A", 1).await.is_err());
    }
}
