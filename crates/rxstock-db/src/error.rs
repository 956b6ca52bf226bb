//! # Database Error Types
//!
//! Error types for database operations and inventory services.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Business rule (CoreError)         │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← adds categorization            │                             │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │              InventoryError (what services return)                      │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │              kind() → ErrorKind → HTTP status                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Returning an error from inside a unit of work drops its transaction, which
//! rolls every write back.

use rxstock_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Hard-deleting a batch still referenced by sale usage rows
    /// - Deleting a sale whose usage rows were not reversed
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored rows disagree with what a locked read just returned.
    ///
    /// ## When This Occurs
    /// - A conditional UPDATE on a locked batch matched no row
    #[error("Inconsistent stock state: {0}")]
    Inconsistent(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
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

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
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

// =============================================================================
// Inventory Error
// =============================================================================

/// Error returned by every inventory service operation.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A stock rule was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The database failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ValidationError> for InventoryError {
    fn from(err: ValidationError) -> Self {
        InventoryError::Core(err.into())
    }
}

impl From<sqlx::Error> for InventoryError {
    fn from(err: sqlx::Error) -> Self {
        InventoryError::Db(err.into())
    }
}

impl InventoryError {
    /// Classifies the error for the outer API.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::Core(err) => err.kind(),
            InventoryError::Db(DbError::NotFound { .. }) => ErrorKind::NotFound,
            InventoryError::Db(DbError::UniqueViolation { .. }) => ErrorKind::Conflict,
            InventoryError::Db(_) => ErrorKind::Unexpected,
        }
    }

    /// Message safe to show to a cashier.
    ///
    /// Unexpected errors are logged and replaced with a generic message;
    /// SQL text never leaves the crate.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unexpected => {
                tracing::error!(error = %self, "Unexpected inventory error");
                "An unexpected error occurred. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns the core error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            InventoryError::Core(err) => Some(err),
            InventoryError::Db(_) => None,
        }
    }
}

/// Result type for inventory services.
pub type InventoryResult<T> = Result<T, InventoryError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: InventoryError = CoreError::ProductNotFound("X".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: InventoryError = DbError::PoolExhausted.into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.kind().http_status(), 500);

        let err: InventoryError = DbError::not_found("Sale", 9).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err: InventoryError = DbError::QueryFailed("no such column: qty".to_string()).into();
        assert!(!err.public_message().contains("column"));

        let err: InventoryError = CoreError::InsufficientStock {
            barcode: "PARA".to_string(),
            available: 1,
            requested: 2,
        }
        .into();
        assert_eq!(err.public_message(), "Insufficient stock for PARA: available 1, requested 2");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted));
    }
}
