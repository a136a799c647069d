//! # Error Types
//!
//! Domain-specific error types for tillpoint-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tillpoint-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  │   ├── Validation        (bad input, before any write)               │
//! │  │   ├── InsufficientStock (availability conflict, re-prompt user)     │
//! │  │   ├── UnknownSku        (fails closed)                              │
//! │  │   └── ReturnRejected    (terminal eligibility rejection)            │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ReturnRejection  - Why an invoice cannot be returned              │
//! │                                                                         │
//! │  tillpoint-db errors (separate crate)                                  │
//! │  └── DbError          - Storage / transactional failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rejection carries an actionable reason string through `Display`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The SKU does not resolve to any inventory row.
    #[error("Unknown SKU: {0}")]
    UnknownSku(String),

    /// Not enough unreserved stock for the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart qty 5 ──► reserve() ──► stock 8, held by other carts 5
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "TEE-RED-M", requested: 5, available: 3, .. }
    ///      │
    ///      ▼
    /// UI re-prompts: "Only 3 TEE-RED-M available"
    /// ```
    #[error("Insufficient stock for {sku}: requested {requested}, available {available} (stock {total_stock}, reserved {reserved})")]
    InsufficientStock {
        sku: String,
        requested: i64,
        available: i64,
        total_stock: i64,
        reserved: i64,
    },

    /// The invoice cannot be returned.
    #[error("Return rejected: {0}")]
    ReturnRejected(#[from] ReturnRejection),

    /// Return data failed one of the build rules.
    #[error("Invalid return: {reason}")]
    InvalidReturn { reason: String },

    /// Payment amount does not cover the total due.
    #[error("Insufficient payment: due {due_cents}, received {received_cents}")]
    InsufficientPayment { due_cents: i64, received_cents: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidReturn error.
    pub fn invalid_return(reason: impl Into<String>) -> Self {
        CoreError::InvalidReturn {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// They are raised before any write and are never retried automatically.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection must contain at least one element.
    #[error("{field} must not be empty")]
    Empty { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Return Rejection
// =============================================================================

/// Why an invoice is not eligible for a return.
///
/// The checks run in this order and the first failure wins:
/// ```text
/// invoice exists? ──no──► NotFound
///      │ yes
/// age <= window?  ──no──► TooOld
///      │ yes
/// prior returns?  ──yes─► AlreadyReturned
///      │ none
///   accepted
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnRejection {
    #[error("invoice {invoice_no} not found")]
    NotFound { invoice_no: String },

    #[error("invoice {invoice_no} is too old to return ({age_days} days, limit {window_days} days)")]
    TooOld {
        invoice_no: String,
        age_days: i64,
        window_days: i64,
    },

    #[error("invoice {invoice_no} has already been returned")]
    AlreadyReturned { invoice_no: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_carries_available_quantity() {
        let err = CoreError::InsufficientStock {
            sku: "TEE-RED-M".to_string(),
            requested: 5,
            available: 3,
            total_stock: 8,
            reserved: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for TEE-RED-M: requested 5, available 3 (stock 8, reserved 5)"
        );
    }

    #[test]
    fn test_return_rejection_messages() {
        let err = ReturnRejection::TooOld {
            invoice_no: "0000042".to_string(),
            age_days: 8,
            window_days: 7,
        };
        assert_eq!(
            err.to_string(),
            "invoice 0000042 is too old to return (8 days, limit 7 days)"
        );

        let core: CoreError = ReturnRejection::AlreadyReturned {
            invoice_no: "0000042".to_string(),
        }
        .into();
        assert_eq!(
            core.to_string(),
            "Return rejected: invoice 0000042 has already been returned"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("sku").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: sku is required");
    }
}
