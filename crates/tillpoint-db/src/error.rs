//! # Database Error Types
//!
//! Error types for storage and coordinator operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  CoreError (tillpoint-core)           SQLite Error (sqlx::Error)       │
//! │  validation / stock / eligibility          │                            │
//! │       │                                    ▼                            │
//! │       │                        DbError (classified constraint,          │
//! │       │                        connection, query failure)               │
//! │       │                                    │                            │
//! │       ▼                                    ▼ inside a coordinator       │
//! │  DbError::Rejected          DbError::TransactionFailed { operation }   │
//! │       │                                    │                            │
//! │       └────────────────┬───────────────────┘                            │
//! │                        ▼                                                │
//! │                 PosCore caller                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rejections are terminal answers for the user. Transaction failures mean the
//! whole unit was rolled back; retrying is the caller's call.

use thiserror::Error;
use tillpoint_core::{CoreError, ReturnRejection};

/// Database and coordinator errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule rejected the request before or during the unit of work.
    ///
    /// ## When This Occurs
    /// - Invalid cart / return data
    /// - Not enough unreserved stock
    /// - Invoice not found, too old, or already returned
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second return for the same invoice committed concurrently
    /// - Duplicate SKU when seeding inventory
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation.
    ///
    /// ## When This Occurs
    /// - A stock decrement would take `quantity` below zero
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A multi-step unit of work failed and was rolled back.
    ///
    /// `source` keeps the underlying cause for logging.
    #[error("{operation} failed and was rolled back: {source}")]
    TransactionFailed {
        operation: &'static str,
        #[source]
        source: Box<DbError>,
    },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Wraps a failure inside a unit of work.
    ///
    /// Business rejections pass through unchanged so callers can still match
    /// on them; everything else becomes `TransactionFailed`.
    pub fn in_transaction(operation: &'static str, err: DbError) -> Self {
        match err {
            DbError::Rejected(_) | DbError::TransactionFailed { .. } => err,
            other => DbError::TransactionFailed {
                operation,
                source: Box::new(other),
            },
        }
    }

    /// Returns the business rejection, if this is one.
    pub fn as_rejection(&self) -> Option<&CoreError> {
        match self {
            DbError::Rejected(core) => Some(core),
            _ => None,
        }
    }

    /// Whether this is a UNIQUE violation on the given `table.column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

impl From<ReturnRejection> for DbError {
    fn from(rejection: ReturnRejection) -> Self {
        DbError::Rejected(CoreError::ReturnRejected(rejection))
    }
}

impl From<tillpoint_core::ValidationError> for DbError {
    fn from(err: tillpoint_core::ValidationError) -> Self {
        DbError::Rejected(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if let Some(field) = msg.split("UNIQUE constraint failed: ").nth(1) {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
