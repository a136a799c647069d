//! # Promotion Repository & Cache
//!
//! Loads promotion rows and keeps a versioned, immutable snapshot of them for
//! the pricing pass.
//!
//! ## Refresh
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PromotionRefresher tick (every 2 min)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PromotionCache::refresh()                                              │
//! │       │                                                                 │
//! │       ├── load ok    ──► swap in PromotionSnapshot { version: n + 1 }  │
//! │       └── load fails ──► warn!, keep snapshot n                        │
//! │                                                                         │
//! │  Pricing callers take snapshot() once per pass; a swap mid-pass never   │
//! │  changes the promotions they already hold.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use tillpoint_core::promotion::{AppliesTo, Promotion, PromotionSnapshot, PromotionType};
use tillpoint_core::Channel;

#[derive(Debug, FromRow)]
struct PromotionRow {
    id: String,
    title: String,
    promotion_type: PromotionType,
    value: i64,
    min_purchase_cents: i64,
    sale_channel: Channel,
    activation_date: DateTime<Utc>,
    expiration_date: Option<DateTime<Utc>>,
    applies_to: AppliesTo,
    applies_to_id: Option<String>,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        Promotion {
            id: row.id,
            title: row.title,
            promotion_type: row.promotion_type,
            value: row.value,
            min_purchase_cents: row.min_purchase_cents,
            sale_channel: row.sale_channel,
            activation_date: row.activation_date,
            expiration_date: row.expiration_date,
            applies_to: row.applies_to,
            applies_to_id: row.applies_to_id,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the `promotions` table.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Loads every enabled promotion in resolver order.
    ///
    /// Date windows are not filtered here; the snapshot filters them at
    /// pricing time so a cached snapshot stays correct across midnight.
    pub async fn list_enabled(&self) -> DbResult<Vec<Promotion>> {
        let rows: Vec<PromotionRow> = sqlx::query_as(
            r#"
            SELECT id, title, promotion_type, value, min_purchase_cents, sale_channel,
                   activation_date, expiration_date, applies_to, applies_to_id
            FROM promotions
            WHERE is_active = 1
            ORDER BY sort_order, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Promotion::from).collect())
    }

    /// Inserts or replaces a promotion. `sort_order` decides tie-breaks.
    pub async fn upsert(&self, promotion: &Promotion, sort_order: i64) -> DbResult<()> {
        debug!(id = %promotion.id, title = %promotion.title, "Saving promotion");

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, title, promotion_type, value, min_purchase_cents, sale_channel,
                activation_date, expiration_date, applies_to, applies_to_id,
                is_active, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                promotion_type = excluded.promotion_type,
                value = excluded.value,
                min_purchase_cents = excluded.min_purchase_cents,
                sale_channel = excluded.sale_channel,
                activation_date = excluded.activation_date,
                expiration_date = excluded.expiration_date,
                applies_to = excluded.applies_to,
                applies_to_id = excluded.applies_to_id,
                is_active = 1,
                sort_order = excluded.sort_order
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.title)
        .bind(promotion.promotion_type)
        .bind(promotion.value)
        .bind(promotion.min_purchase_cents)
        .bind(promotion.sale_channel)
        .bind(promotion.activation_date)
        .bind(promotion.expiration_date)
        .bind(promotion.applies_to)
        .bind(&promotion.applies_to_id)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Disables a promotion without deleting it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE promotions SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id));
        }
        info!(id = %id, "Promotion deactivated");
        Ok(())
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Shared holder of the current promotion snapshot.
///
/// Cloning shares the same snapshot slot.
#[derive(Debug, Clone)]
pub struct PromotionCache {
    repo: PromotionRepository,
    current: Arc<RwLock<Arc<PromotionSnapshot>>>,
}

impl PromotionCache {
    /// Creates a cache holding the empty version-0 snapshot.
    pub fn new(repo: PromotionRepository) -> Self {
        PromotionCache {
            repo,
            current: Arc::new(RwLock::new(Arc::new(PromotionSnapshot::empty(Utc::now())))),
        }
    }

    /// The snapshot to price against.
    pub async fn snapshot(&self) -> Arc<PromotionSnapshot> {
        self.current.read().await.clone()
    }

    /// Reloads promotions and publishes them as the next version.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned for the caller to log.
    pub async fn refresh(&self) -> DbResult<Arc<PromotionSnapshot>> {
        self.refresh_at(Utc::now()).await
    }

    /// [`refresh`](Self::refresh) stamping the snapshot with `now`.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> DbResult<Arc<PromotionSnapshot>> {
        let promotions = match self.repo.list_enabled().await {
            Ok(promotions) => promotions,
            Err(e) => {
                warn!(?e, "Promotion refresh failed; keeping previous snapshot");
                return Err(e);
            }
        };

        let mut current = self.current.write().await;
        let snapshot = Arc::new(PromotionSnapshot {
            version: current.version + 1,
            fetched_at: now,
            promotions,
        });
        *current = snapshot.clone();

        debug!(
            version = snapshot.version,
            promotions = snapshot.promotions.len(),
            "Promotion snapshot refreshed"
        );
        Ok(snapshot)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
