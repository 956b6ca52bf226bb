//! # Error Types
//!
//! Domain-specific error types for rxstock-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  rxstock-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Coarse classification for the HTTP layer       │
//! │                                                                         │
//! │  rxstock-db errors (separate crate)                                    │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── InventoryError   - CoreError | DbError, what services return      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → InventoryError → HTTP status      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure aborts the surrounding unit of work, so no partial stock
//! movement is ever visible.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse error classification.
///
/// The HTTP layer maps errors through this instead of matching on variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ErrorKind {
    /// Bad input. Client can fix the request.
    Validation,
    /// Referenced entity does not exist in this pharmacy.
    NotFound,
    /// Request is well formed but conflicts with current stock state.
    Conflict,
    /// Anything else. Details are logged, never shown.
    Unexpected,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unexpected => 500,
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No product with this barcode is linked to the pharmacy.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Batch does not exist or belongs to another pharmacy.
    #[error("Batch not found: {0}")]
    BatchNotFound(i64),

    /// Sale does not exist or belongs to another pharmacy.
    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    /// Pharmacy does not exist.
    #[error("Pharmacy not found: {0}")]
    PharmacyNotFound(i64),

    /// Saleable batches cannot cover the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Confirm sale (PARA-500 x 12)
    ///      │
    ///      ▼
    /// Saleable batches hold 9 (expired and voided lots excluded)
    ///      │
    ///      ▼
    /// InsufficientStock { barcode: "PARA-500", available: 9, requested: 12 }
    ///      │
    ///      ▼
    /// Whole sale rolls back, nothing is consumed
    /// ```
    #[error("Insufficient stock for {barcode}: available {available}, requested {requested}")]
    InsufficientStock {
        barcode: String,
        available: i64,
        requested: i64,
    },

    /// The usage ledger could not give back as much as was asked for.
    ///
    /// ## When This Occurs
    /// - A sale edit lowers a quantity below what the ledger recorded
    /// - Ledger rows were tampered with outside the core
    #[error("Reversal mismatch for {barcode}: requested {requested}, returned {returned}")]
    ReversalMismatch {
        barcode: String,
        requested: i64,
        returned: i64,
    },

    /// Usage rows are still attached to a sale after every item was reversed.
    #[error("Sale {sale_id} still has {remaining} usage rows after reversal")]
    UsageLedgerNotEmpty { sale_id: i64, remaining: i64 },

    /// Cash tendered does not cover the sale total.
    #[error("Insufficient payment: total {total}, amount given {amount_given}")]
    InsufficientPayment { total: i64, amount_given: i64 },

    /// Batch status change is not permitted.
    #[error("Batch cannot move from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Quantity edit on a disposed, returned or void batch.
    #[error("Batch {batch_id} is {status} and its quantity cannot change")]
    BatchClosed { batch_id: i64, status: String },

    /// Hard delete refused because the batch still holds stock.
    #[error("Batch {batch_id} still holds {quantity} units; void it instead")]
    BatchNotEmpty { batch_id: i64, quantity: i64 },

    /// Hard delete refused because sales reference the batch.
    #[error("Batch {batch_id} is referenced by {rows} sale usage rows; void it instead")]
    BatchHasUsage { batch_id: i64, rows: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error for the outer API.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProductNotFound(_)
            | CoreError::BatchNotFound(_)
            | CoreError::SaleNotFound(_)
            | CoreError::PharmacyNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. }
            | CoreError::ReversalMismatch { .. }
            | CoreError::UsageLedgerNotEmpty { .. }
            | CoreError::InvalidStatusTransition { .. }
            | CoreError::BatchClosed { .. }
            | CoreError::BatchNotEmpty { .. }
            | CoreError::BatchHasUsage { .. } => ErrorKind::Conflict,
            CoreError::InsufficientPayment { .. } | CoreError::Validation(_) => {
                ErrorKind::Validation
            }
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
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

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g. a date that is not YYYY-MM-DD).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// An update request that changes nothing.
    #[error("no changes supplied")]
    NoChanges,
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
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            barcode: "PARA-500".to_string(),
            available: 9,
            requested: 12,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for PARA-500: available 9, requested 12"
        );

        let err = CoreError::ReversalMismatch {
            barcode: "AMOX-250".to_string(),
            requested: 5,
            returned: 3,
        };
        assert_eq!(
            err.to_string(),
            "Reversal mismatch for AMOX-250: requested 5, returned 3"
        );
    }

    #[test]
    fn test_kinds_map_to_http_status() {
        assert_eq!(CoreError::SaleNotFound(7).kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::SaleNotFound(7).kind().http_status(), 404);

        let conflict = CoreError::BatchHasUsage { batch_id: 1, rows: 2 };
        assert_eq!(conflict.kind().http_status(), 409);

        let payment = CoreError::InsufficientPayment {
            total: 500,
            amount_given: 100,
        };
        assert_eq!(payment.kind(), ErrorKind::Validation);
        assert_eq!(ErrorKind::Unexpected.http_status(), 500);
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "barcode".to_string(),
        };
        let core_err: CoreError = validation_err.into();

        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }
}
