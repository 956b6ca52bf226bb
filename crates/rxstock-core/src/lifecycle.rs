//! # Batch Lifecycle Rules
//!
//! Applies edits and deletion policy to a single batch. The database layer
//! loads the locked row, runs it through here, and writes the result back.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{BatchStatus, BatchUpdate, ExpiryChange, ProductBatch, QuantityChange};

/// Returns `batch` with `update` applied.
///
/// ## Rules
/// - Status changes follow [`BatchStatus::can_transition_to`]
/// - Quantity edits on terminal batches are refused
/// - The resulting quantity may not be negative
/// - Entering a terminal status forces quantity to 0
pub fn apply_batch_update(batch: &ProductBatch, update: &BatchUpdate) -> CoreResult<ProductBatch> {
    if update.is_empty() {
        return Err(ValidationError::NoChanges.into());
    }

    let mut next = batch.clone();

    if let Some(status) = update.status {
        if !batch.status.can_transition_to(status) {
            return Err(CoreError::InvalidStatusTransition {
                from: batch.status.to_string(),
                to: status.to_string(),
            });
        }
        next.status = status;
    }

    if let Some(change) = update.quantity {
        if batch.status.is_terminal() {
            return Err(CoreError::BatchClosed {
                batch_id: batch.id,
                status: batch.status.to_string(),
            });
        }

        let quantity = match change {
            QuantityChange::Delta(delta) => batch.quantity.checked_add(delta).ok_or_else(|| {
                ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 0,
                    max: i64::MAX,
                }
            })?,
            QuantityChange::Set(value) => value,
        };

        if quantity < 0 {
            return Err(ValidationError::Negative {
                field: "quantity".to_string(),
            }
            .into());
        }
        next.quantity = quantity;
    }

    match update.expiry {
        Some(ExpiryChange::Set(date)) => next.expiry_date = Some(date),
        Some(ExpiryChange::Clear) => next.expiry_date = None,
        None => {}
    }

    if next.status.is_terminal() {
        next.quantity = 0;
    }

    Ok(next)
}

/// Applies the soft-void transition.
pub fn void_batch(batch: &ProductBatch) -> ProductBatch {
    let mut next = batch.clone();
    next.status = BatchStatus::Void;
    next.quantity = 0;
    next
}

/// Checks whether a batch may be physically removed.
///
/// Batches referenced by sale usage rows are never removed: the ledger must
/// stay able to credit them back. Batches still holding stock are removed
/// only when `allow_with_stock` is set.
pub fn check_hard_delete(batch: &ProductBatch, usage_rows: i64, allow_with_stock: bool) -> CoreResult<()> {
    if usage_rows > 0 {
        return Err(CoreError::BatchHasUsage {
            batch_id: batch.id,
            rows: usage_rows,
        });
    }

    if batch.quantity > 0 && !allow_with_stock {
        return Err(CoreError::BatchNotEmpty {
            batch_id: batch.id,
            quantity: batch.quantity,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
