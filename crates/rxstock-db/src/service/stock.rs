//! # Stock Service
//!
//! Staff-driven batch operations: receiving stock, editing a batch, and
//! removing one. Each runs in its own unit of work and ends with a snapshot
//! recalculation and a stock-level check.
//!
//! ## Batch Status Transitions
//! ```text
//!             ┌──────────── staff edit ─────────────┐
//!             ▼                                     │
//!         ┌────────┐   sweep / staff   ┌─────────┐  │
//!  intake │ active │ ────────────────► │ expired │──┘
//!   ────► └────────┘                   └─────────┘
//!             │                             │
//!             │ staff: disposed / returned  │
//!             │ delete: void                │
//!             ▼                             ▼
//!      ┌───────────────────────────────────────────┐
//!      │ disposed │ returned │ void   (terminal, qty 0) │
//!      └───────────────────────────────────────────┘
//! ```
//!
//! Disposal and return write stock off; the reversal engine never brings it
//! back. Sale reversals can still credit a terminal batch, but its units stay
//! out of the saleable total.

use rxstock_core::lifecycle::{apply_batch_update, check_hard_delete, void_batch};
use rxstock_core::validation::{validate_barcode, validate_batch_update, validate_quantity};
use rxstock_core::{
    BatchStatus, BatchUpdate, CoreError, DeleteMode, PharmacyContext, ProductBatch, StockIntake, StockSnapshot,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::InventoryResult;
use crate::inventory::notifier::resolve_batch_alerts;
use crate::inventory::{check_stock_level, ledger, recalc};
use crate::repository::product;
use crate::service::ServiceContext;
use crate::unit_of_work::UnitOfWork;

/// A batch after a change, with its product's new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchChange {
    pub batch: ProductBatch,
    pub snapshot: StockSnapshot,
}

#[derive(Debug, Clone)]
pub struct StockService {
    ctx: ServiceContext,
}

impl StockService {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        StockService { ctx }
    }

    /// Receives stock as a new active batch.
    pub async fn add_stock_by_barcode(&self, ctx: &PharmacyContext, intake: StockIntake) -> InventoryResult<BatchChange> {
        validate_barcode(&intake.barcode)?;
        validate_quantity(intake.quantity)?;
        let barcode = intake.barcode.trim();

        let product = product::fetch_by_barcode(&self.ctx.pool, ctx.pharmacy_id, barcode)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(barcode.to_string()))?;

        let mut uow = self.ctx.begin().await?;
        if !uow.lock_product(ctx.pharmacy_id, product.id).await? {
            return Err(CoreError::ProductNotFound(barcode.to_string()).into());
        }

        let now = uow.now();
        let batch = ledger::insert_batch(
            uow.conn(),
            ctx.pharmacy_id,
            product.id,
            intake.quantity,
            intake.expiry_date,
            BatchStatus::Active,
            now,
        )
        .await?;
        let snapshot = recalc(&mut uow, ctx.pharmacy_id, product.id).await?;
        check_stock_level(&mut uow, ctx.pharmacy_id, product.id).await?;
        self.ctx.finish(uow).await?;

        info!(
            pharmacy_id = ctx.pharmacy_id,
            product_id = product.id,
            batch_id = batch.id,
            qty = intake.quantity,
            expiry = ?intake.expiry_date,
            "Stock received"
        );
        Ok(BatchChange { batch, snapshot })
    }

    /// Edits quantity, expiry or status of a batch.
    ///
    /// ## Returns
    /// * `Err(InvalidStatusTransition)` - leaving a terminal status
    /// * `Err(BatchClosed)` - quantity edit on a terminal batch
    /// * `Err(Validation)` - empty edit or negative result
    pub async fn update_batch(
        &self,
        ctx: &PharmacyContext,
        batch_id: i64,
        update: BatchUpdate,
    ) -> InventoryResult<BatchChange> {
        validate_batch_update(&update)?;

        let mut uow = self.lock(ctx.pharmacy_id, batch_id).await?;
        let current = reload(&mut uow, ctx.pharmacy_id, batch_id).await?;
        let next = apply_batch_update(&current, &update)?;

        let now = uow.now();
        ledger::write_batch(uow.conn(), &next, now).await?;

        if next.status != current.status {
            let keep = (next.status == BatchStatus::Expired).then_some(rxstock_core::NotificationType::Expired);
            if next.status != BatchStatus::Active {
                resolve_batch_alerts(&mut uow, ctx.pharmacy_id, batch_id, keep).await?;
            }
        }

        let snapshot = recalc(&mut uow, ctx.pharmacy_id, next.pharmacy_product_id).await?;
        check_stock_level(&mut uow, ctx.pharmacy_id, next.pharmacy_product_id).await?;
        let batch = reload(&mut uow, ctx.pharmacy_id, batch_id).await?;
        self.ctx.finish(uow).await?;

        info!(
            pharmacy_id = ctx.pharmacy_id,
            batch_id,
            from_status = %current.status,
            to_status = %batch.status,
            from_qty = current.quantity,
            to_qty = batch.quantity,
            "Batch updated"
        );
        Ok(BatchChange { batch, snapshot })
    }

    /// Removes a batch from stock.
    ///
    /// `Void` keeps the row (status `void`, quantity 0). `Hard` deletes it,
    /// which is refused while usage rows reference it and, unless the policy
    /// allows it, while it still holds units.
    pub async fn delete_batch(
        &self,
        ctx: &PharmacyContext,
        batch_id: i64,
        mode: DeleteMode,
    ) -> InventoryResult<StockSnapshot> {
        let mut uow = self.lock(ctx.pharmacy_id, batch_id).await?;
        let batch = reload(&mut uow, ctx.pharmacy_id, batch_id).await?;
        let now = uow.now();

        match mode {
            DeleteMode::Void => {
                let voided = void_batch(&batch);
                ledger::write_batch(uow.conn(), &voided, now).await?;
            }
            DeleteMode::Hard => {
                let rows = ledger::usage_count_for_batch(uow.conn(), batch_id).await?;
                check_hard_delete(&batch, rows, self.ctx.policy.allow_hard_delete_with_stock)?;
                ledger::delete_batch_row(uow.conn(), ctx.pharmacy_id, batch_id).await?;
            }
        }

        resolve_batch_alerts(&mut uow, ctx.pharmacy_id, batch_id, None).await?;
        let snapshot = recalc(&mut uow, ctx.pharmacy_id, batch.pharmacy_product_id).await?;
        check_stock_level(&mut uow, ctx.pharmacy_id, batch.pharmacy_product_id).await?;
        self.ctx.finish(uow).await?;

        info!(
            pharmacy_id = ctx.pharmacy_id,
            batch_id,
            mode = ?mode,
            written_off = batch.quantity,
            "Batch deleted"
        );
        Ok(snapshot)
    }

    /// Batches of a product, any status.
    pub async fn batches(&self, ctx: &PharmacyContext, product_id: i64) -> InventoryResult<Vec<ProductBatch>> {
        if product::fetch_by_id(&self.ctx.pool, ctx.pharmacy_id, product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }
        Ok(ledger::batches_for_product(&self.ctx.pool, ctx.pharmacy_id, product_id).await?)
    }

    /// Opens a unit holding the batch's product and the batch itself.
    async fn lock(&self, pharmacy_id: i64, batch_id: i64) -> InventoryResult<UnitOfWork> {
        let batch = ledger::batch_by_id(&self.ctx.pool, pharmacy_id, batch_id)
            .await?
            .ok_or(CoreError::BatchNotFound(batch_id))?;

        let mut uow = self.ctx.begin().await?;
        if !uow.lock_product(pharmacy_id, batch.pharmacy_product_id).await?
            || !uow.lock_batch(pharmacy_id, batch_id).await?
        {
            return Err(CoreError::BatchNotFound(batch_id).into());
        }

        debug!(pharmacy_id, batch_id, product_id = batch.pharmacy_product_id, "Batch locked");
        Ok(uow)
    }
}

async fn reload(uow: &mut UnitOfWork, pharmacy_id: i64, batch_id: i64) -> InventoryResult<ProductBatch> {
    let batch = ledger::batch_by_id(uow.conn(), pharmacy_id, batch_id)
        .await?
        .ok_or(CoreError::BatchNotFound(batch_id))?;
    Ok(batch)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::testing::TestDb;
    use crate::InventoryPolicy;
    use rxstock_core::{ErrorKind, ExpiryChange, NewSale, NotificationType, QuantityChange, SaleLine};

    fn intake(barcode: &str, quantity: i64, expiry_date: Option<chrono::NaiveDate>) -> StockIntake {
        StockIntake {
            barcode: barcode.to_string(),
            quantity,
            expiry_date,
        }
    }

    #[tokio::test]
    async fn test_intake_creates_batch_and_resolves_alerts() {
        let t = TestDb::new().await;
        let p = t.product("IN", 100).await.id;
        let first = t
            .db
            .stock()
            .add_stock_by_barcode(&t.ctx(), intake("IN", 3, Some(t.date(90))))
            .await
            .unwrap();
        assert_eq!(first.batch.status, BatchStatus::Active);
        assert_eq!(first.snapshot.quantity, 3);
        let open = t.db.notifications().open(t.pharmacy_id).await.unwrap();
        assert_eq!(open[0].notification_type, NotificationType::LowStock);

        let second = t
            .db
            .stock()
            .add_stock_by_barcode(&t.ctx(), intake(" IN ", 20, Some(t.date(30))))
            .await
            .unwrap();
        assert_eq!(second.snapshot.quantity, 23);
        assert_eq!(second.snapshot.next_expiry, Some(t.date(30)));
        assert!(t.db.notifications().open(t.pharmacy_id).await.unwrap().is_empty());
        t.assert_snapshot_consistent(p).await;
    }

    #[tokio::test]
    async fn test_intake_unknown_barcode() {
        let t = TestDb::new().await;
        let err = t
            .db
            .stock()
            .add_stock_by_barcode(&t.ctx(), intake("NOPE", 1, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_quantity_edits_delta_and_set() {
        let t = TestDb::new().await;
        let p = t.product("Q", 100).await.id;
        let b = t.batch(p, 10, None, BatchStatus::Active).await;
        let stock = t.db.stock();

        let change = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    quantity: Some(QuantityChange::Delta(-4)),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(change.batch.quantity, 6);
        assert_eq!(change.snapshot.quantity, 6);

        let change = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    quantity: Some(QuantityChange::Set(40)),
                    expiry: Some(ExpiryChange::Set(t.date(15))),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(change.snapshot.quantity, 40);
        assert_eq!(change.snapshot.next_expiry, Some(t.date(15)));

        let err = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    quantity: Some(QuantityChange::Delta(-41)),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = stock.update_batch(&t.ctx(), b.id, BatchUpdate::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        t.assert_snapshot_consistent(p).await;
    }

    #[tokio::test]
    async fn test_dispose_writes_off_and_is_terminal() {
        let t = TestDb::new().await;
        let p = t.product("D", 100).await.id;
        let keep = t.batch(p, 30, None, BatchStatus::Active).await;
        let b = t.batch(p, 8, Some(t.date(3)), BatchStatus::Active).await;
        let stock = t.db.stock();

        let change = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    status: Some(BatchStatus::Disposed),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(change.batch.quantity, 0);
        assert_eq!(change.snapshot.quantity, 30);
        assert_eq!(change.snapshot.next_expiry, None);

        let err = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    status: Some(BatchStatus::Active),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::InvalidStatusTransition { .. })));

        let err = stock
            .update_batch(
                &t.ctx(),
                b.id,
                BatchUpdate {
                    quantity: Some(QuantityChange::Set(5)),
                    ..BatchUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::BatchClosed { .. })));
        assert_eq!(t.batch_qty(keep.id).await, 30);
    }

    #[tokio::test]
    async fn test_void_is_default_and_keeps_row() {
        let t = TestDb::new().await;
        let p = t.product("V", 100).await.id;
        let b = t.batch(p, 12, None, BatchStatus::Active).await;

        let snapshot = t.db.stock().delete_batch(&t.ctx(), b.id, DeleteMode::default()).await.unwrap();
        assert_eq!(snapshot.quantity, 0);

        let batch = t.db.batches().get(t.pharmacy_id, b.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Void);
        assert_eq!(batch.quantity, 0);
    }

    #[tokio::test]
    async fn test_hard_delete_policy() {
        let t = TestDb::new().await;
        let p = t.product("H", 100).await.id;
        let stocked = t.batch(p, 5, None, BatchStatus::Active).await;
        let empty = t.batch(p, 0, None, BatchStatus::Active).await;

        let err = t.db.stock().delete_batch(&t.ctx(), stocked.id, DeleteMode::Hard).await.unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::BatchNotEmpty { quantity: 5, .. })));

        t.db.stock().delete_batch(&t.ctx(), empty.id, DeleteMode::Hard).await.unwrap();
        assert!(t.db.batches().get(t.pharmacy_id, empty.id).await.unwrap().is_none());

        let permissive = t.db.clone().with_policy(InventoryPolicy {
            allow_hard_delete_with_stock: true,
        });
        let snapshot = permissive.stock().delete_batch(&t.ctx(), stocked.id, DeleteMode::Hard).await.unwrap();
        assert_eq!(snapshot.quantity, 0);
    }

    #[tokio::test]
    async fn test_hard_delete_refused_while_ledger_references_batch() {
        let t = TestDb::new().await;
        let p = t.product("L", 100).await.id;
        let b = t.batch(p, 5, None, BatchStatus::Active).await;
        t.db.sale_service()
            .confirm_sale(
                &t.ctx(),
                NewSale {
                    items: vec![SaleLine::new("L", 5)],
                    amount_given_cents: 500,
                    description: None,
                },
            )
            .await
            .unwrap();

        let err = t.db.stock().delete_batch(&t.ctx(), b.id, DeleteMode::Hard).await.unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::BatchHasUsage { rows: 1, .. })));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_batch_of_other_pharmacy_not_found() {
        let t = TestDb::new().await;
        let p = t.product("S", 100).await.id;
        let b = t.batch(p, 5, None, BatchStatus::Active).await;
        let other = PharmacyContext::new(t.other_pharmacy().await, t.user_id);

        let err = t.db.stock().delete_batch(&other, b.id, DeleteMode::Void).await.unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::BatchNotFound(_))));
        assert_eq!(t.batch_qty(b.id).await, 5);
    }
}
