//! # Snapshot Recalculator
//!
//! The single writer of `pharmacy_products.quantity` and `expiry_date`.
//!
//! Every operation that touches a batch calls [`recalc`] before its unit of
//! work commits, so the snapshot always equals the saleable batches as of the
//! unit's business date.

use rxstock_core::allocation::snapshot_of;
use rxstock_core::StockSnapshot;
use tracing::debug;

use crate::error::DbResult;
use crate::inventory::ledger;
use crate::repository::product;
use crate::unit_of_work::UnitOfWork;

/// Recomputes and stores the snapshot of one product.
pub async fn recalc(uow: &mut UnitOfWork, pharmacy_id: i64, product_id: i64) -> DbResult<StockSnapshot> {
    debug_assert!(uow.is_product_locked(product_id));

    let today = uow.today();
    let now = uow.now();

    let batches = ledger::batches_for_product(uow.conn(), pharmacy_id, product_id).await?;
    let snapshot = snapshot_of(&batches, today);
    product::write_snapshot(uow.conn(), pharmacy_id, product_id, snapshot, now).await?;

    debug!(
        pharmacy_id,
        product_id,
        quantity = snapshot.quantity,
        next_expiry = ?snapshot.next_expiry,
        "Snapshot recalculated"
    );
    Ok(snapshot)
}
