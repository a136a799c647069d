//! # Validation Module
//!
//! Input validation for everything that crosses into the transaction core.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Cart UI                                                      │
//! │  └── Immediate user feedback (out of scope here)                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: PosCore facade / coordinators                                │
//! │  └── THIS MODULE: rejected before any write                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (invoice_no), UNIQUE (transaction_id, item)                │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tillpoint_core::validation::{validate_quantity, validate_sku};
//!
//! assert!(validate_sku("TEE-RED-M").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(1000).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::PaymentMethod;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted cart session key.
const MAX_TRANSACTION_KEY_LEN: usize = 128;

/// Longest accepted payment reference number.
const MAX_REFERENCE_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a cart session key (the reservation `transaction_id`).
pub fn validate_transaction_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::required("transaction_id"));
    }

    if key.len() > MAX_TRANSACTION_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "transaction_id".to_string(),
            max: MAX_TRANSACTION_KEY_LEN,
        });
    }

    Ok(())
}

/// Validates an invoice number as typed at the returns counter.
pub fn validate_invoice_no(invoice_no: &str) -> ValidationResult<()> {
    let invoice_no = invoice_no.trim();

    if invoice_no.is_empty() {
        return Err(ValidationError::required("invoice_no"));
    }

    if !invoice_no.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "invoice_no".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    Ok(())
}

/// Validates the payment reference against the tender type.
///
/// ## Rules
/// - Required (non-blank) for every method except cash
/// - At most 64 characters when present
pub fn validate_payment_reference(
    method: PaymentMethod,
    reference_no: Option<&str>,
) -> ValidationResult<()> {
    let reference = reference_no.map(str::trim).filter(|r| !r.is_empty());

    match reference {
        None if method.requires_reference() => Err(ValidationError::required("payment reference")),
        Some(r) if r.len() > MAX_REFERENCE_LEN => Err(ValidationError::TooLong {
            field: "payment reference".to_string(),
            max: MAX_REFERENCE_LEN,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity for cart operations.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a staff identifier (cashier, supervisor).
pub fn validate_staff_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a cart at checkout.
///
/// ## Rules
/// - At least one line
/// - At most MAX_CART_ITEMS (100) lines
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Empty {
            field: "cart".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TEE-RED-M").is_ok());
        assert!(validate_sku("mug_01").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_payment_reference() {
        assert!(validate_payment_reference(PaymentMethod::Cash, None).is_ok());
        assert!(validate_payment_reference(PaymentMethod::Card, Some("AUTH-991")).is_ok());

        assert!(validate_payment_reference(PaymentMethod::Card, None).is_err());
        assert!(validate_payment_reference(PaymentMethod::EWallet, Some("  ")).is_err());
        assert!(
            validate_payment_reference(PaymentMethod::BankTransfer, Some(&"9".repeat(65))).is_err()
        );
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_ok());

        assert!(matches!(
            validate_cart_size(0),
            Err(ValidationError::Empty { .. })
        ));
        assert!(validate_cart_size(MAX_CART_ITEMS + 1).is_err());
    }

    #[test]
    fn test_validate_invoice_no() {
        assert!(validate_invoice_no("0000042").is_ok());
        assert!(validate_invoice_no("").is_err());
        assert!(validate_invoice_no("RTN-000001").is_err());
    }

    #[test]
    fn test_validate_staff_and_tax() {
        assert!(validate_staff_id("cashier_id", 7).is_ok());
        assert!(validate_staff_id("cashier_id", 0).is_err());
        assert!(validate_tax_rate_bps(825).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
    }

    #[test]
    fn test_validate_price_ceiling() {
        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents(MAX_PRICE_CENTS + 1),
            Err(ValidationError::OutOfRange { max: MAX_PRICE_CENTS, .. })
        ));
        assert!(validate_price_cents(i64::MAX / 2).is_err());
    }
}
