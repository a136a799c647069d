//! # PosCore
//!
//! The one entry point the cart and returns screens call.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart UI                              Returns UI                        │
//! │    │ price_cart_line / reserve /        │ initiate_return /             │
//! │    │ release / checkout                 │ commit_return                 │
//! │    ▼                                    ▼                               │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │                          PosCore                              │     │
//! │  │  PromotionCache ─ ReservationStore ─ Checkout ─ Returns       │     │
//! │  └───────────────────────────────┬───────────────────────────────┘     │
//! │                                  ▼                                      │
//! │                           SQLite (WAL)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{info, warn};

use crate::config::PosConfig;
use crate::coordinator::{CheckoutCoordinator, ReturnsCoordinator};
use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::{PromotionCache, ReservationStore};
use crate::worker::{PromotionRefresher, ReservationSweeper, WorkerHandle};
use tillpoint_core::checkout::{CheckoutReceipt, CheckoutRequest};
use tillpoint_core::promotion::{LinePricing, PricingLine};
use tillpoint_core::returns::{ReturnEligibility, ReturnReceipt, ReturnRequest};
use tillpoint_core::validation::{validate_price_cents, validate_quantity, validate_sku};
use tillpoint_core::{Availability, Money};

/// Facade over the transaction core.
#[derive(Debug, Clone)]
pub struct PosCore {
    db: Database,
    config: PosConfig,
    reservations: ReservationStore,
    promotions: PromotionCache,
    checkout: CheckoutCoordinator,
    returns: ReturnsCoordinator,
}

impl PosCore {
    /// Wires the core over an open database.
    ///
    /// The promotion cache starts empty; call [`refresh_promotions`] or
    /// [`spawn_workers`] to load it.
    ///
    /// [`refresh_promotions`]: Self::refresh_promotions
    /// [`spawn_workers`]: Self::spawn_workers
    pub fn new(db: Database, config: PosConfig) -> Self {
        let pool = db.pool().clone();
        PosCore {
            reservations: db.reservations(config.reservations.ttl()),
            promotions: PromotionCache::new(db.promotions()),
            checkout: CheckoutCoordinator::new(
                pool.clone(),
                config.tax_rate(),
                config.promotions.channel,
            ),
            returns: ReturnsCoordinator::new(pool, config.return_policy()),
            db,
            config,
        }
    }

    /// Opens the configured database and loads promotions once.
    ///
    /// A failed promotion load is logged; pricing then runs without
    /// promotions until the next refresh.
    pub async fn open(config: PosConfig) -> DbResult<Self> {
        let db = Database::new(config.database.to_db_config()).await?;
        let core = PosCore::new(db, config);

        if let Err(e) = core.refresh_promotions().await {
            warn!(?e, "Initial promotion load failed");
        }

        info!("Transaction core ready");
        Ok(core)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &PosConfig {
        &self.config
    }

    pub fn promotions(&self) -> &PromotionCache {
        &self.promotions
    }

    pub fn reservations(&self) -> &ReservationStore {
        &self.reservations
    }

    /// Reloads promotions now. Returns the new snapshot version.
    pub async fn refresh_promotions(&self) -> DbResult<i64> {
        Ok(self.promotions.refresh().await?.version)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Best promotion for one cart line against the current snapshot.
    ///
    /// The line is held to the same rules as a checkout line.
    pub async fn price_cart_line(
        &self,
        sku: &str,
        category_id: Option<&str>,
        unit_price: Money,
        quantity: i64,
    ) -> DbResult<LinePricing> {
        validate_sku(sku)?;
        validate_quantity(quantity)?;
        validate_price_cents(unit_price.cents())?;

        let snapshot = self.promotions.snapshot().await;
        let line = PricingLine {
            sku,
            category_id,
            unit_price,
            quantity,
        };
        Ok(snapshot.price_line(&line, Utc::now(), self.config.promotions.channel))
    }

    /// Sets the cart's hold on a SKU. Quantity 0 releases it.
    pub async fn reserve(&self, cart_key: &str, sku: &str, quantity: i64) -> DbResult<Availability> {
        self.reservations.upsert(cart_key, sku, quantity).await
    }

    /// Releases one SKU's hold, or every hold of the cart when `sku` is `None`.
    pub async fn release(&self, cart_key: &str, sku: Option<&str>) -> DbResult<u64> {
        match sku {
            Some(sku) => self.reservations.remove(cart_key, sku).await,
            None => self.reservations.clear_for_transaction(cart_key).await,
        }
    }

    /// Commits the sale against the current promotion snapshot.
    pub async fn checkout(&self, request: &CheckoutRequest) -> DbResult<CheckoutReceipt> {
        let snapshot = self.promotions.snapshot().await;
        self.checkout.commit_sale(request, &snapshot).await
    }

    // =========================================================================
    // Returns
    // =========================================================================

    /// Checks an invoice for return and loads its lines.
    pub async fn initiate_return(&self, invoice_no: &str) -> DbResult<ReturnEligibility> {
        self.returns.validate_invoice_for_return(invoice_no).await
    }

    pub async fn commit_return(&self, request: &ReturnRequest) -> DbResult<ReturnReceipt> {
        self.returns.commit_return(request).await
    }

    // =========================================================================
    // Workers
    // =========================================================================

    /// Spawns the reservation sweeper and the promotion refresher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_workers(&self) -> Vec<WorkerHandle> {
        let (sweeper, sweeper_handle) =
            ReservationSweeper::new(self.reservations.clone(), self.config.sweep_interval());
        let (refresher, refresher_handle) =
            PromotionRefresher::new(self.promotions.clone(), self.config.refresh_interval());

        tokio::spawn(sweeper.run());
        tokio::spawn(refresher.run());

        vec![sweeper_handle, refresher_handle]
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
    use tillpoint_core::{CartLine, Channel, CoreError, PaymentInfo, PaymentMethod};

    async fn core() -> PosCore {
        PosCore::new(memory_db().await, PosConfig::default())
    }

    #[tokio::test]
    async fn test_price_cart_line_uses_refreshed_snapshot() {
        let core = core().await;
        let line_price = Money::from_cents(2000);

        let before = core.price_cart_line("MUG-01", None, line_price, 1).await.unwrap();
        assert_eq!(before, LinePricing::none(0));

        core.database()
            .promotions()
            .upsert(
                &Promotion {
                    id: "mug-deal".to_string(),
                    title: "3 off mugs".to_string(),
                    promotion_type: PromotionType::Fixed,
                    value: 300,
                    min_purchase_cents: 0,
                    sale_channel: Channel::InStore,
                    activation_date: Utc::now() - Duration::hours(1),
                    expiration_date: None,
                    applies_to: AppliesTo::Product,
                    applies_to_id: Some("MUG-01".to_string()),
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(core.refresh_promotions().await.unwrap(), 1);

        let after = core.price_cart_line("MUG-01", None, line_price, 1).await.unwrap();
        assert_eq!(after.promotion_id.as_deref(), Some("mug-deal"));
        assert_eq!(after.discount.cents(), 300);
        assert_eq!(after.snapshot_version, 1);
    }

    #[tokio::test]
    async fn test_price_cart_line_rejects_bad_lines() {
        let core = core().await;
        let price = Money::from_cents(2000);

        for (sku, unit_price, quantity) in [
            ("MUG-01", price, 0),
            ("MUG-01", price, -2),
            ("MUG-01", Money::from_cents(-500), 1),
            ("MUG-01", Money::from_cents(i64::MAX / 2), 3),
            ("", price, 1),
        ] {
            let err = core
                .price_cart_line(sku, None, unit_price, quantity)
                .await
                .unwrap_err();
            assert!(
                matches!(err.as_rejection(), Some(CoreError::Validation(_))),
                "{sku:?} {unit_price} x {quantity}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_reserve_release_checkout_flow() {
        let core = core().await;
        stock_item(core.database(), "A", Channel::InStore, 10000, 2).await;

        core.reserve("cart-1", "A", 2).await.unwrap();
        let err = core.reserve("cart-2", "A", 1).await.unwrap_err();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(core.release("cart-1", Some("A")).await.unwrap(), 1);
        core.reserve("cart-2", "A", 1).await.unwrap();

        let receipt = core
            .checkout(&CheckoutRequest {
                lines: vec![CartLine::new("A", Money::from_cents(10000), 1)],
                payment: PaymentInfo {
                    method: PaymentMethod::Card,
                    amount_received_cents: 10000,
                    reference_no: Some("AUTH-1".to_string()),
                },
                staff_id: 2,
                reservation_key: Some("cart-2".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(receipt.released_reservations, 1);
        assert_eq!(core.release("cart-2", None).await.unwrap(), 0);

        let eligibility = core.initiate_return(&receipt.invoice_no).await.unwrap();
        assert!(eligibility.is_eligible());
    }

    #[tokio::test]
    async fn test_spawned_workers_shut_down() {
        let core = core().await;
        let handles = core.spawn_workers();
        assert_eq!(handles.len(), 2);

        for handle in &handles {
            handle.shutdown().await.unwrap();
        }
    }
}
