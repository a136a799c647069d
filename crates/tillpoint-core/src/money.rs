//! # Money Module
//!
//! Provides the `Money` type used for every price, discount, tax and refund.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  A refund computed in floats can differ by a cent from the sale it      │
//! │  reverses. Integer cents make the sale and its return add up exactly:  │
//! │                                                                         │
//! │    sale 25000 cents ── refund 25000 cents ── net 0                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tillpoint_core::money::Money;
//!
//! let price = Money::from_cents(10000); // 100.00
//! let line = price.multiply_quantity(2); // 200.00
//! assert_eq!(line.percentage(1000).cents(), 2000); // 10% of 200.00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money flows
/// ```text
/// InventoryItem.unit_price ──► CartLine line total ──► Promotion discount
///                                      │
///                                      ▼
///        subtotal − discount ──► tax ──► PosTransaction.total_amount
///                                      │
///                                      ▼
///                           PosReturn.refund_total (never above the sale)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use tillpoint_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole units and cents.
    ///
    /// ```rust
    /// use tillpoint_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(250, 0).cents(), 25000);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the smaller of two amounts.
    ///
    /// Used to cap a fixed discount at the line total.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Calculates tax at the given rate.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`, i.e. half-up rounding
    /// to the cent.
    ///
    /// ```rust
    /// use tillpoint_core::money::Money;
    /// use tillpoint_core::types::TaxRate;
    ///
    /// let taxable = Money::from_cents(1000);
    /// assert_eq!(taxable.calculate_tax(TaxRate::from_bps(825)).cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percentage(rate.bps())
    }

    /// Returns `bps` basis points of this amount, half-up rounded.
    ///
    /// ```rust
    /// use tillpoint_core::money::Money;
    ///
    /// // 15% of 33.33 = 4.9995 → 5.00
    /// assert_eq!(Money::from_cents(3333).percentage(1500).cents(), 500);
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        // i128 keeps large totals from overflowing before the division
        let cents = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }

    /// Scales this amount by `numerator / denominator`, half-up rounded.
    ///
    /// Returns zero when the denominator is not positive.
    pub fn prorate(&self, numerator: i64, denominator: i64) -> Money {
        if denominator <= 0 {
            return Money::zero();
        }
        let scaled = self.0 as i128 * numerator as i128;
        let half = denominator as i128 / 2;
        Money::from_cents(((scaled + half) / denominator as i128) as i64)
    }

    /// Multiplies money by a quantity, saturating at the `i64` bounds.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display (`250.00`, `-5.50`); the UI owns localized formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(25000).to_string(), "250.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 10% of 0.05 = 0.005 → 0.01
        assert_eq!(Money::from_cents(5).percentage(1000).cents(), 1);
        // 10% of 0.04 = 0.004 → 0.00
        assert_eq!(Money::from_cents(4).percentage(1000).cents(), 0);
        assert_eq!(Money::from_cents(20000).percentage(2500).cents(), 5000);
    }

    #[test]
    fn test_multiply_quantity_saturates() {
        assert_eq!(Money::from_cents(250).multiply_quantity(4).cents(), 1000);
        assert_eq!(
            Money::from_cents(i64::MAX / 2).multiply_quantity(3).cents(),
            i64::MAX
        );
    }

    #[test]
    fn test_tax_on_zero_rate_is_zero() {
        let taxable = Money::from_cents(25000);
        assert!(taxable.calculate_tax(TaxRate::zero()).is_zero());
    }

    #[test]
    fn test_prorate() {
        // 1/3 of 10.00 = 3.333 → 3.33
        assert_eq!(Money::from_cents(1000).prorate(1, 3).cents(), 333);
        // 2/3 of 10.00 = 6.666 → 6.67
        assert_eq!(Money::from_cents(1000).prorate(2, 3).cents(), 667);
        assert!(Money::from_cents(1000).prorate(1, 0).is_zero());
    }

    #[test]
    fn test_min() {
        let fixed = Money::from_cents(5000);
        let line = Money::from_cents(3000);
        assert_eq!(fixed.min(line), line);
        assert_eq!(line.min(fixed), line);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 650].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 1000);
    }
}
