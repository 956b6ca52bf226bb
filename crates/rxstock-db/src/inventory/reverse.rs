//! # LIFO Reversal Engine
//!
//! Gives units back to the exact batches a sale took them from, newest usage
//! row first. A batch that has since expired or been disposed still receives
//! its units; they simply stay out of the saleable total.

use rxstock_core::reversal::plan_reversal;
use rxstock_core::{CoreError, ReversalOutcome};
use tracing::debug;

use crate::error::InventoryResult;
use crate::inventory::{ledger, snapshot};
use crate::unit_of_work::UnitOfWork;

/// What to give back.
#[derive(Debug, Clone, Copy)]
pub struct ReverseRequest<'a> {
    pub pharmacy_id: i64,
    pub product_id: i64,
    /// Only ledger rows written under this barcode are credited.
    pub barcode: &'a str,
    pub qty: i64,
    pub sale_id: i64,
    /// Narrows the ledger to one item. `None` considers every row of the
    /// sale for this product, which is what edits and deletes use.
    pub sale_item_id: Option<i64>,
}

/// Reverses up to `qty` units.
///
/// `returned` may be less than `qty` when the ledger holds fewer units;
/// callers treat that as a mismatch.
pub async fn reverse(uow: &mut UnitOfWork, req: ReverseRequest<'_>) -> InventoryResult<ReversalOutcome> {
    if !uow.lock_product(req.pharmacy_id, req.product_id).await? {
        return Err(CoreError::ProductNotFound(req.barcode.to_string()).into());
    }

    let now = uow.now();
    let rows = ledger::usages_for_reversal(
        uow.conn(),
        req.pharmacy_id,
        req.sale_id,
        req.product_id,
        req.barcode,
        req.sale_item_id,
    )
    .await?;
    let plan = plan_reversal(&rows, req.qty);

    for step in &plan.steps {
        ledger::credit_batch(uow.conn(), req.pharmacy_id, step.batch_id, step.qty, now).await?;
        ledger::shrink_usage(uow.conn(), step).await?;
    }

    let snapshot = snapshot::recalc(uow, req.pharmacy_id, req.product_id).await?;

    debug!(
        sale_id = req.sale_id,
        product_id = req.product_id,
        requested = req.qty,
        returned = plan.returned,
        "Stock reversed"
    );
    Ok(ReversalOutcome {
        returned: plan.returned,
        snapshot,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
