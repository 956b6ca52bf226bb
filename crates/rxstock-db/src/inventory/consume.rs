//! # FEFO Consumption Engine
//!
//! Takes units from the earliest-expiring saleable batches and records one
//! usage row per batch touched.
//!
//! ```text
//! lock product ─► load saleable batches ─► plan (all or nothing)
//!      ─► debit each batch + write usage row ─► recalc snapshot
//! ```

use rxstock_core::allocation::plan_consumption;
use rxstock_core::{ConsumptionOutcome, CoreError};
use tracing::debug;

use crate::error::InventoryResult;
use crate::inventory::{ledger, snapshot};
use crate::unit_of_work::UnitOfWork;

/// What to consume, and which sale it is for.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeRequest<'a> {
    pub pharmacy_id: i64,
    pub product_id: i64,
    pub barcode: &'a str,
    pub qty: i64,
    pub sale_id: i64,
    pub sale_item_id: Option<i64>,
}

/// Consumes `qty` units in FEFO order.
///
/// ## Returns
/// * `Ok(outcome)` - allocations in consumption order and the new snapshot
/// * `Err(InsufficientStock)` - nothing was written
pub async fn consume(uow: &mut UnitOfWork, req: ConsumeRequest<'_>) -> InventoryResult<ConsumptionOutcome> {
    if !uow.lock_product(req.pharmacy_id, req.product_id).await? {
        return Err(CoreError::ProductNotFound(req.barcode.to_string()).into());
    }

    let today = uow.today();
    let now = uow.now();

    let batches = ledger::saleable_batches(uow.conn(), req.pharmacy_id, req.product_id, today).await?;
    let allocations = plan_consumption(&batches, req.qty, today, req.barcode)?;

    for allocation in &allocations {
        ledger::debit_batch(uow.conn(), req.pharmacy_id, allocation.batch_id, allocation.qty, now).await?;
        ledger::record_usage(
            uow.conn(),
            ledger::UsageRecord {
                sale_id: req.sale_id,
                sale_item_id: req.sale_item_id,
                pharmacy_id: req.pharmacy_id,
                product_id: req.product_id,
                batch_id: allocation.batch_id,
                barcode: req.barcode,
                qty: allocation.qty,
            },
            now,
        )
        .await?;
    }

    let snapshot = snapshot::recalc(uow, req.pharmacy_id, req.product_id).await?;

    debug!(
        sale_id = req.sale_id,
        product_id = req.product_id,
        qty = req.qty,
        batches = allocations.len(),
        "Stock consumed"
    );
    Ok(ConsumptionOutcome { allocations, snapshot })
}

// =============================================================================
// Unit Tests
// =============================================================================
