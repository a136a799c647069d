//! # Promotion Resolver
//!
//! Picks the single best promotion for a cart line from a loaded snapshot.
//!
//! ## Pricing Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  promotions table ──(every 2 min)──► PromotionSnapshot { version: 17 }  │
//! │                                              │                          │
//! │                                  active_at(now, channel)                │
//! │                                              │                          │
//! │  CartLine ─────────────────────► best_promotion(line, active)          │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                   LinePricing { promotion_id, discount, version: 17 }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: the same snapshot and the same line always give
//! the same result, so a sale can be re-priced from its recorded version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CartLine, Channel};

// =============================================================================
// Promotion
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PromotionType {
    /// `value` is basis points of the line total (1000 = 10%).
    Percentage,
    /// `value` is cents off the line, capped at the line total.
    Fixed,
    /// Handled at fulfilment; no line discount.
    FreeShipping,
}

/// What a promotion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    All,
    Category,
    Product,
}

/// A promotion row as loaded for one pricing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    pub title: String,
    pub promotion_type: PromotionType,
    pub value: i64,
    pub min_purchase_cents: i64,
    pub sale_channel: Channel,
    #[ts(as = "String")]
    pub activation_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub applies_to: AppliesTo,
    /// Category id or SKU, depending on `applies_to`.
    pub applies_to_id: Option<String>,
}

impl Promotion {
    /// Whether the promotion window contains `now`. Both ends are inclusive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.activation_date <= now && self.expiration_date.map_or(true, |end| now <= end)
    }

    /// Whether the promotion targets this line.
    pub fn applies_to_line(&self, line: &PricingLine<'_>) -> bool {
        match self.applies_to {
            AppliesTo::All => true,
            AppliesTo::Category => match (self.applies_to_id.as_deref(), line.category_id) {
                (Some(target), Some(category)) => target == category,
                _ => false,
            },
            AppliesTo::Product => self.applies_to_id.as_deref() == Some(line.sku),
        }
    }

    /// Discount this promotion would give on `line_total`.
    ///
    /// ```rust
    /// # use chrono::Utc;
    /// # use tillpoint_core::money::Money;
    /// # use tillpoint_core::promotion::{AppliesTo, Promotion, PromotionType};
    /// # use tillpoint_core::types::Channel;
    /// let promo = Promotion {
    ///     id: "p1".into(),
    ///     title: "5 off".into(),
    ///     promotion_type: PromotionType::Fixed,
    ///     value: 500,
    ///     min_purchase_cents: 0,
    ///     sale_channel: Channel::Both,
    ///     activation_date: Utc::now(),
    ///     expiration_date: None,
    ///     applies_to: AppliesTo::All,
    ///     applies_to_id: None,
    /// };
    /// // Fixed discounts never exceed the line
    /// assert_eq!(promo.discount_for(Money::from_cents(300)).cents(), 300);
    /// ```
    pub fn discount_for(&self, line_total: Money) -> Money {
        match self.promotion_type {
            PromotionType::Percentage => {
                let bps = self.value.clamp(0, 10_000) as u32;
                line_total.percentage(bps)
            }
            PromotionType::Fixed => Money::from_cents(self.value.max(0)).min(line_total),
            PromotionType::FreeShipping => Money::zero(),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// The inputs the resolver needs from a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingLine<'a> {
    pub sku: &'a str,
    pub category_id: Option<&'a str>,
    pub unit_price: Money,
    pub quantity: i64,
}

impl<'a> PricingLine<'a> {
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

impl<'a> From<&'a CartLine> for PricingLine<'a> {
    fn from(line: &'a CartLine) -> Self {
        PricingLine {
            sku: &line.sku,
            category_id: line.category_id.as_deref(),
            unit_price: line.unit_price(),
            quantity: line.quantity,
        }
    }
}

/// A promotion chosen for a line, with the discount it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPromotion<'p> {
    pub promotion: &'p Promotion,
    pub discount: Money,
}

/// Returns the promotion giving the largest discount on `line`.
///
/// A promotion is a candidate when it targets the line and the line total
/// reaches its minimum purchase. Only a strictly larger discount displaces the
/// current best, so on ties the earlier promotion in `promotions` wins.
pub fn best_promotion<'p>(
    line: &PricingLine<'_>,
    promotions: &'p [Promotion],
) -> Option<AppliedPromotion<'p>> {
    let line_total = line.line_total();
    let mut best: Option<AppliedPromotion<'p>> = None;

    for promotion in promotions {
        if !promotion.applies_to_line(line) {
            continue;
        }
        if line_total.cents() < promotion.min_purchase_cents {
            continue;
        }

        let discount = promotion.discount_for(line_total);
        match best {
            Some(current) if discount <= current.discount => {}
            _ => best = Some(AppliedPromotion { promotion, discount }),
        }
    }

    best
}

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable, versioned copy of the promotions table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PromotionSnapshot {
    pub version: i64,
    #[ts(as = "String")]
    pub fetched_at: DateTime<Utc>,
    pub promotions: Vec<Promotion>,
}

impl PromotionSnapshot {
    /// Version 0: nothing loaded yet.
    pub fn empty(now: DateTime<Utc>) -> Self {
        PromotionSnapshot {
            version: 0,
            fetched_at: now,
            promotions: Vec::new(),
        }
    }

    /// Promotions live at `now` and visible on `channel`, in load order.
    pub fn active_at(&self, now: DateTime<Utc>, channel: Channel) -> Vec<Promotion> {
        self.promotions
            .iter()
            .filter(|p| p.is_active_at(now) && p.sale_channel.covers(channel))
            .cloned()
            .collect()
    }

    /// Prices one line against this snapshot.
    pub fn price_line(
        &self,
        line: &PricingLine<'_>,
        now: DateTime<Utc>,
        channel: Channel,
    ) -> LinePricing {
        let active = self.active_at(now, channel);
        match best_promotion(line, &active) {
            Some(applied) => LinePricing {
                promotion_id: Some(applied.promotion.id.clone()),
                discount: applied.discount,
                snapshot_version: self.version,
            },
            None => LinePricing::none(self.version),
        }
    }
}

/// Outcome of pricing one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinePricing {
    pub promotion_id: Option<String>,
    pub discount: Money,
    pub snapshot_version: i64,
}

impl LinePricing {
    pub fn none(snapshot_version: i64) -> Self {
        LinePricing {
            promotion_id: None,
            discount: Money::zero(),
            snapshot_version,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
