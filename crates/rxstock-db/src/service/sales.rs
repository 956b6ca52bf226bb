//! # Sale Service
//!
//! Confirms, edits and deletes sales, moving stock through the FEFO and LIFO
//! engines in the same unit of work as the sale rows.
//!
//! ## confirm_sale
//! ```text
//! resolve barcodes (pool, before the unit)
//!   │
//!   ▼
//! BEGIN ─► lock products (ascending id) ─► price lines from current prices
//!   │                                      └─► settle tender (InsufficientPayment)
//!   ▼
//! insert header ─► per line: insert item ─► consume FEFO ─► stock alerts
//!   │
//!   ▼
//! COMMIT ─► deliver emails
//! ```
//!
//! ## update_sale
//! ```text
//! BEGIN ─► lock sale ─► lock old + new products (ascending id)
//!   │
//!   ▼
//! price new lines ─► delta per barcode = new qty - old qty
//!   │
//!   ├── items rewritten (old usage rows keep their quantities)
//!   ├── delta > 0 ─► consume FEFO for delta
//!   └── delta < 0 ─► reverse LIFO for |delta|, returned must equal |delta|
//!   │
//!   ▼
//! header recomputed ─► COMMIT
//! ```
//!
//! Any error drops the unit and every write rolls back.

use std::collections::{BTreeSet, HashMap};

use rxstock_core::pricing::{item_deltas, price_line, settle, PricedLine};
use rxstock_core::validation::{normalize_description, validate_amount_given, validate_sale_lines};
use rxstock_core::{
    CoreError, NewSale, PharmacyContext, SaleBatchUsage, SaleLine, SaleReceipt, SaleUpdate,
};
use tracing::{debug, info};

use crate::error::{DbError, InventoryResult};
use crate::inventory::{check_stock_level, consume, reverse, ConsumeRequest, ReverseRequest};
use crate::inventory::ledger;
use crate::repository::{product, sale, ProductRepository};
use crate::service::ServiceContext;
use crate::unit_of_work::UnitOfWork;

/// Sale orchestration.
///
/// ## Usage
/// ```rust,ignore
/// let receipt = db
///     .sale_service()
///     .confirm_sale(&ctx, NewSale {
///         items: vec![SaleLine::new("8901234567890", 2)],
///         amount_given_cents: 1000,
///         description: None,
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleService {
    ctx: ServiceContext,
}

impl SaleService {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        SaleService { ctx }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Records a sale and consumes its stock.
    ///
    /// ## Returns
    /// * `Ok(receipt)` - sale, items, and the change owed
    /// * `Err(ProductNotFound)` - a barcode is not stocked by this pharmacy
    /// * `Err(InsufficientPayment)` - tender below the server-side total
    /// * `Err(InsufficientStock)` - a line exceeds the saleable stock
    pub async fn confirm_sale(&self, ctx: &PharmacyContext, new_sale: NewSale) -> InventoryResult<SaleReceipt> {
        let lines = normalize_lines(&new_sale.items);
        validate_sale_lines(&lines)?;
        validate_amount_given(new_sale.amount_given_cents)?;
        let description = normalize_description(new_sale.description.as_deref())?;

        debug!(pharmacy_id = ctx.pharmacy_id, lines = lines.len(), "Confirming sale");

        let ids = self.resolve(ctx.pharmacy_id, &lines).await?;

        let mut uow = self.ctx.begin().await?;
        lock_all(&mut uow, ctx.pharmacy_id, &lines, &ids).await?;

        let priced = price_all(&mut uow, ctx.pharmacy_id, &lines, &ids).await?;
        let totals = settle(&priced, Some(new_sale.amount_given_cents))?;

        let now = uow.now();
        let sale_id = sale::insert_header(
            uow.conn(),
            ctx.pharmacy_id,
            ctx.user_id,
            totals,
            description.as_deref(),
            now,
        )
        .await?;

        for line in &priced {
            let item_id = sale::insert_item(uow.conn(), sale_id, line).await?;
            consume(
                &mut uow,
                ConsumeRequest {
                    pharmacy_id: ctx.pharmacy_id,
                    product_id: line.pharmacy_product_id,
                    barcode: &line.barcode,
                    qty: line.quantity,
                    sale_id,
                    sale_item_id: Some(item_id),
                },
            )
            .await?;
            check_stock_level(&mut uow, ctx.pharmacy_id, line.pharmacy_product_id).await?;
        }

        let receipt = load_receipt(&mut uow, ctx.pharmacy_id, sale_id).await?;
        self.ctx.finish(uow).await?;

        info!(
            pharmacy_id = ctx.pharmacy_id,
            user_id = ctx.user_id,
            sale_id,
            total = totals.total_cents,
            items = priced.len(),
            "Sale confirmed"
        );
        Ok(receipt)
    }

    /// Replaces a sale's items, tender and description, moving only the
    /// per-barcode difference in stock.
    ///
    /// `amount_given_cents: None` clears tender and change.
    pub async fn update_sale(
        &self,
        ctx: &PharmacyContext,
        sale_id: i64,
        update: SaleUpdate,
    ) -> InventoryResult<SaleReceipt> {
        let lines = normalize_lines(&update.items);
        validate_sale_lines(&lines)?;
        if let Some(given) = update.amount_given_cents {
            validate_amount_given(given)?;
        }
        let description = normalize_description(update.description.as_deref())?;

        debug!(pharmacy_id = ctx.pharmacy_id, sale_id, lines = lines.len(), "Updating sale");

        let ids = self.resolve(ctx.pharmacy_id, &lines).await?;

        let mut uow = self.ctx.begin().await?;
        if !uow.lock_sale(ctx.pharmacy_id, sale_id).await? {
            return Err(CoreError::SaleNotFound(sale_id).into());
        }

        let old_items = sale::fetch_items(uow.conn(), sale_id).await?;
        uow.lock_products(
            ctx.pharmacy_id,
            ids.iter().copied().chain(old_items.iter().map(|i| i.pharmacy_product_id)),
        )
        .await?;

        let priced = price_all(&mut uow, ctx.pharmacy_id, &lines, &ids).await?;
        let totals = settle(&priced, update.amount_given_cents)?;
        let deltas = item_deltas(&old_items, &lines);

        // barcode -> product, and barcode -> first new item (for usage rows)
        let mut product_for: HashMap<String, i64> = old_items
            .iter()
            .map(|i| (i.barcode.clone(), i.pharmacy_product_id))
            .collect();

        sale::delete_items(uow.conn(), sale_id).await?;
        for line in &priced {
            sale::insert_item(uow.conn(), sale_id, line).await?;
            product_for.insert(line.barcode.clone(), line.pharmacy_product_id);
        }

        for delta in &deltas {
            let product_id = product_for.get(&delta.barcode).copied().ok_or_else(|| {
                DbError::Inconsistent(format!("no product for barcode {} in sale {}", delta.barcode, sale_id))
            })?;

            if delta.delta > 0 {
                consume(
                    &mut uow,
                    ConsumeRequest {
                        pharmacy_id: ctx.pharmacy_id,
                        product_id,
                        barcode: &delta.barcode,
                        qty: delta.delta,
                        sale_id,
                        // Delta rows belong to the sale, not to a line item
                        sale_item_id: None,
                    },
                )
                .await?;
            } else {
                give_back(&mut uow, ctx.pharmacy_id, sale_id, product_id, &delta.barcode, -delta.delta).await?;
            }
            check_stock_level(&mut uow, ctx.pharmacy_id, product_id).await?;
        }

        let now = uow.now();
        sale::update_header(uow.conn(), ctx.pharmacy_id, sale_id, totals, description.as_deref(), now).await?;

        let receipt = load_receipt(&mut uow, ctx.pharmacy_id, sale_id).await?;
        self.ctx.finish(uow).await?;

        info!(
            pharmacy_id = ctx.pharmacy_id,
            sale_id,
            total = totals.total_cents,
            changed_barcodes = deltas.len(),
            "Sale updated"
        );
        Ok(receipt)
    }

    /// Returns every unit of a sale to its source batches and removes the
    /// sale.
    ///
    /// ## Returns
    /// * `Err(SaleNotFound)` - no such sale in this pharmacy
    /// * `Err(ReversalMismatch)` / `Err(UsageLedgerNotEmpty)` - the ledger
    ///   disagrees with the items; nothing changes
    pub async fn delete_sale(&self, ctx: &PharmacyContext, sale_id: i64) -> InventoryResult<()> {
        debug!(pharmacy_id = ctx.pharmacy_id, sale_id, "Deleting sale");

        let mut uow = self.ctx.begin().await?;
        if !uow.lock_sale(ctx.pharmacy_id, sale_id).await? {
            return Err(CoreError::SaleNotFound(sale_id).into());
        }

        let items = sale::fetch_items(uow.conn(), sale_id).await?;
        let products: BTreeSet<i64> = items.iter().map(|i| i.pharmacy_product_id).collect();
        uow.lock_products(ctx.pharmacy_id, products.iter().copied()).await?;

        for item in &items {
            give_back(
                &mut uow,
                ctx.pharmacy_id,
                sale_id,
                item.pharmacy_product_id,
                &item.barcode,
                item.quantity,
            )
            .await?;
        }

        let remaining = ledger::usage_count_for_sale(uow.conn(), sale_id).await?;
        if remaining > 0 {
            return Err(CoreError::UsageLedgerNotEmpty { sale_id, remaining }.into());
        }

        sale::delete_items(uow.conn(), sale_id).await?;
        sale::delete_header(uow.conn(), ctx.pharmacy_id, sale_id).await?;

        for &product_id in &products {
            check_stock_level(&mut uow, ctx.pharmacy_id, product_id).await?;
        }

        self.ctx.finish(uow).await?;

        info!(pharmacy_id = ctx.pharmacy_id, sale_id, items = items.len(), "Sale deleted");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, ctx: &PharmacyContext, sale_id: i64) -> InventoryResult<SaleReceipt> {
        let receipt = crate::repository::SaleRepository::new(self.ctx.pool.clone())
            .get(ctx.pharmacy_id, sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;
        Ok(receipt)
    }

    /// Batch allocations of a sale.
    pub async fn usages(&self, ctx: &PharmacyContext, sale_id: i64) -> InventoryResult<Vec<SaleBatchUsage>> {
        if sale::fetch_sale(&self.ctx.pool, ctx.pharmacy_id, sale_id).await?.is_none() {
            return Err(CoreError::SaleNotFound(sale_id).into());
        }
        Ok(ledger::usages_for_sale(&self.ctx.pool, ctx.pharmacy_id, sale_id).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Product id per line, in line order.
    async fn resolve(&self, pharmacy_id: i64, lines: &[SaleLine]) -> InventoryResult<Vec<i64>> {
        let barcodes: Vec<&str> = lines.iter().map(|l| l.barcode.as_str()).collect();
        let resolved = ProductRepository::new(self.ctx.pool.clone())
            .resolve_barcodes(pharmacy_id, &barcodes)
            .await?;

        lines
            .iter()
            .map(|line| {
                resolved
                    .get(&line.barcode)
                    .copied()
                    .ok_or_else(|| CoreError::ProductNotFound(line.barcode.clone()).into())
            })
            .collect()
    }
}

fn normalize_lines(lines: &[SaleLine]) -> Vec<SaleLine> {
    lines
        .iter()
        .map(|l| SaleLine::new(l.barcode.trim(), l.quantity))
        .collect()
}

/// Locks every line's product in ascending id order.
async fn lock_all(uow: &mut UnitOfWork, pharmacy_id: i64, lines: &[SaleLine], ids: &[i64]) -> InventoryResult<()> {
    let ordered: BTreeSet<(i64, &str)> = ids
        .iter()
        .copied()
        .zip(lines.iter().map(|l| l.barcode.as_str()))
        .collect();

    for (product_id, barcode) in ordered {
        if !uow.lock_product(pharmacy_id, product_id).await? {
            return Err(CoreError::ProductNotFound(barcode.to_string()).into());
        }
    }
    Ok(())
}

/// Prices lines from the products as read inside the unit.
async fn price_all(
    uow: &mut UnitOfWork,
    pharmacy_id: i64,
    lines: &[SaleLine],
    ids: &[i64],
) -> InventoryResult<Vec<PricedLine>> {
    let mut priced = Vec::with_capacity(lines.len());
    for (line, &product_id) in lines.iter().zip(ids) {
        let product = product::fetch_by_id(uow.conn(), pharmacy_id, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(line.barcode.clone()))?;
        priced.push(price_line(&product, line.quantity)?);
    }
    Ok(priced)
}

/// Reverses `qty` units of one product; anything short is a mismatch.
async fn give_back(
    uow: &mut UnitOfWork,
    pharmacy_id: i64,
    sale_id: i64,
    product_id: i64,
    barcode: &str,
    qty: i64,
) -> InventoryResult<()> {
    let outcome = reverse(
        uow,
        ReverseRequest {
            pharmacy_id,
            product_id,
            barcode,
            qty,
            sale_id,
            sale_item_id: None,
        },
    )
    .await?;

    if outcome.returned != qty {
        return Err(CoreError::ReversalMismatch {
            barcode: barcode.to_string(),
            requested: qty,
            returned: outcome.returned,
        }
        .into());
    }
    Ok(())
}

async fn load_receipt(uow: &mut UnitOfWork, pharmacy_id: i64, sale_id: i64) -> InventoryResult<SaleReceipt> {
    let sale = sale::fetch_sale(uow.conn(), pharmacy_id, sale_id)
        .await?
        .ok_or(CoreError::SaleNotFound(sale_id))?;
    let items = sale::fetch_items(uow.conn(), sale_id).await?;
    Ok(SaleReceipt { sale, items })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::testing::TestDb;
    use rxstock_core::{BatchStatus, ErrorKind, NotificationType};

    fn new_sale(items: Vec<SaleLine>, amount_given_cents: i64) -> NewSale {
        NewSale {
            items,
            amount_given_cents,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_confirm_then_delete_restores_batches() {
        let t = TestDb::new().await;
        let x = t.product("X", 250).await.id;
        let b1 = t.batch(x, 10, Some(t.date(80)), BatchStatus::Active).await;
        let b2 = t.batch(x, 5, Some(t.date(110)), BatchStatus::Active).await;
        let service = t.db.sale_service();

        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("X", 12)], 5000))
            .await
            .unwrap();

        assert_eq!(receipt.sale.total_cents, 3000);
        assert_eq!(receipt.sale.change_cents, Some(2000));
        let usages = service.usages(&t.ctx(), receipt.sale.id).await.unwrap();
        let allocations: Vec<(i64, i64)> = usages.iter().map(|u| (u.batch_id, u.qty)).collect();
        assert_eq!(allocations, vec![(b1.id, 10), (b2.id, 2)]);

        let product = t.db.products().get(t.pharmacy_id, x).await.unwrap().unwrap();
        assert_eq!(product.quantity, 3);
        assert_eq!(product.expiry_date, Some(t.date(110)));

        service.delete_sale(&t.ctx(), receipt.sale.id).await.unwrap();

        let product = t.db.products().get(t.pharmacy_id, x).await.unwrap().unwrap();
        assert_eq!(product.quantity, 15);
        assert_eq!(product.expiry_date, Some(t.date(80)));
        assert_eq!(t.batch_qty(b1.id).await, 10);
        assert_eq!(t.batch_qty(b2.id).await, 5);
        assert!(t.db.sales().get(t.pharmacy_id, receipt.sale.id).await.unwrap().is_none());
        t.assert_snapshot_consistent(x).await;
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_whole_sale() {
        let t = TestDb::new().await;
        let a = t.product("A", 100).await.id;
        let b = t.product("B", 100).await.id;
        let batch_a = t.batch(a, 5, None, BatchStatus::Active).await;
        t.batch(b, 1, None, BatchStatus::Active).await;

        let err = t
            .db
            .sale_service()
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("A", 3), SaleLine::new("B", 2)], 10_000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(
            err,
            InventoryError::Core(CoreError::InsufficientStock { available: 1, requested: 2, .. })
        ));
        assert_eq!(t.batch_qty(batch_a.id).await, 5);
        assert!(t.db.sales().list(t.pharmacy_id, &crate::SaleFilter::page(10, 0)).await.unwrap().is_empty());
        t.assert_snapshot_consistent(a).await;
    }

    #[tokio::test]
    async fn test_exact_boundary_sells_out() {
        let t = TestDb::new().await;
        let x = t.product("X", 100).await.id;
        let b1 = t.batch(x, 10, Some(t.date(80)), BatchStatus::Active).await;
        let b2 = t.batch(x, 5, Some(t.date(110)), BatchStatus::Active).await;
        let service = t.db.sale_service();

        let err = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("X", 16)], 10_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Core(CoreError::InsufficientStock { available: 15, requested: 16, .. })
        ));
        assert_eq!(t.batch_qty(b1.id).await, 10);
        assert_eq!(t.batch_qty(b2.id).await, 5);

        service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("X", 15)], 10_000))
            .await
            .unwrap();
        assert_eq!(t.batch_qty(b1.id).await, 0);
        assert_eq!(t.batch_qty(b2.id).await, 0);
        t.assert_snapshot_consistent(x).await;
    }

    #[tokio::test]
    async fn test_price_is_server_side_and_payment_checked() {
        let t = TestDb::new().await;
        let p = t.product("PARA", 199).await.id;
        let batch = t.batch(p, 10, None, BatchStatus::Active).await;

        let err = t
            .db
            .sale_service()
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("PARA", 2)], 397))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Core(CoreError::InsufficientPayment { total: 398, amount_given: 397 })
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(t.batch_qty(batch.id).await, 10);

        let receipt = t
            .db
            .sale_service()
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new(" PARA ", 2)], 398))
            .await
            .unwrap();
        assert_eq!(receipt.items[0].price_cents, 199);
        assert_eq!(receipt.items[0].subtotal_cents, 398);
        assert_eq!(receipt.sale.change_cents, Some(0));
    }

    #[tokio::test]
    async fn test_unknown_barcode_is_not_found() {
        let t = TestDb::new().await;
        let other = t.other_pharmacy().await;
        let theirs = t.product_in(other, "THEIRS", 100).await;
        t.batch_in(other, theirs.id, 10).await;

        let err = t
            .db
            .sale_service()
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("THEIRS", 1)], 100))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::ProductNotFound(ref b)) if b == "THEIRS"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_moves_only_the_difference() {
        let t = TestDb::new().await;
        let a = t.product("A", 100).await.id;
        let b = t.product("B", 50).await.id;
        let a1 = t.batch(a, 4, Some(t.date(20)), BatchStatus::Active).await;
        let a2 = t.batch(a, 10, Some(t.date(40)), BatchStatus::Active).await;
        t.batch(b, 10, None, BatchStatus::Active).await;
        let service = t.db.sale_service();

        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("A", 6), SaleLine::new("B", 3)], 1000))
            .await
            .unwrap();
        let sale_id = receipt.sale.id;

        // A: 6 -> 3 gives back the newest slice (2 from a2, then 1 from a1).
        // B: 3 -> 5 consumes 2 more. Repeated lines aggregate by barcode.
        let updated = service
            .update_sale(
                &t.ctx(),
                sale_id,
                SaleUpdate {
                    items: vec![SaleLine::new("A", 3), SaleLine::new("B", 4), SaleLine::new("B", 1)],
                    amount_given_cents: None,
                    description: Some("  corrected  ".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.sale.total_cents, 3 * 100 + 5 * 50);
        assert_eq!(updated.sale.amount_given_cents, None);
        assert_eq!(updated.sale.change_cents, None);
        assert_eq!(updated.sale.description.as_deref(), Some("corrected"));
        assert_eq!(updated.items.len(), 3);

        assert_eq!(t.batch_qty(a1.id).await, 1);
        assert_eq!(t.batch_qty(a2.id).await, 10);
        let b_product = t.db.products().get(t.pharmacy_id, b).await.unwrap().unwrap();
        assert_eq!(b_product.quantity, 5);

        let usages = service.usages(&t.ctx(), sale_id).await.unwrap();
        let a_total: i64 = usages.iter().filter(|u| u.pharmacy_product_id == a).map(|u| u.qty).sum();
        let b_total: i64 = usages.iter().filter(|u| u.pharmacy_product_id == b).map(|u| u.qty).sum();
        assert_eq!((a_total, b_total), (3, 5));

        // Removing a barcode entirely returns all of it.
        service
            .update_sale(
                &t.ctx(),
                sale_id,
                SaleUpdate {
                    items: vec![SaleLine::new("B", 5)],
                    amount_given_cents: Some(300),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(t.batch_qty(a1.id).await, 4);
        t.assert_snapshot_consistent(a).await;
        t.assert_snapshot_consistent(b).await;

        service.delete_sale(&t.ctx(), sale_id).await.unwrap();
        let b_product = t.db.products().get(t.pharmacy_id, b).await.unwrap().unwrap();
        assert_eq!(b_product.quantity, 10);
    }

    #[tokio::test]
    async fn test_update_delta_rows_are_not_tied_to_an_item() {
        let t = TestDb::new().await;
        let d = t.product("D", 100).await.id;
        t.batch(d, 10, None, BatchStatus::Active).await;
        let service = t.db.sale_service();

        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("D", 2)], 1000))
            .await
            .unwrap();
        let sale_id = receipt.sale.id;

        let usages = service.usages(&t.ctx(), sale_id).await.unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].sale_item_id, Some(receipt.items[0].id));

        service
            .update_sale(
                &t.ctx(),
                sale_id,
                SaleUpdate {
                    items: vec![SaleLine::new("D", 5)],
                    amount_given_cents: None,
                    description: None,
                },
            )
            .await
            .unwrap();

        // Replaced items release the confirm-time row; the delta row never had one.
        let usages = service.usages(&t.ctx(), sale_id).await.unwrap();
        let rows: Vec<(i64, Option<i64>)> = usages.iter().map(|u| (u.qty, u.sale_item_id)).collect();
        assert_eq!(rows, vec![(2, None), (3, None)]);
        t.assert_snapshot_consistent(d).await;
    }

    #[tokio::test]
    async fn test_update_with_short_ledger_aborts() {
        let t = TestDb::new().await;
        let p = t.product("P", 100).await.id;
        let batch = t.batch(p, 10, None, BatchStatus::Active).await;
        let service = t.db.sale_service();
        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("P", 5)], 500))
            .await
            .unwrap();

        // Corrupt the ledger: it now records 2 units instead of 5.
        sqlx::query("UPDATE sale_batch_usages SET qty = 2 WHERE sale_id = ?1")
            .bind(receipt.sale.id)
            .execute(t.db.pool())
            .await
            .unwrap();

        let err = service
            .update_sale(
                &t.ctx(),
                receipt.sale.id,
                SaleUpdate {
                    items: vec![SaleLine::new("P", 1)],
                    amount_given_cents: Some(100),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Core(CoreError::ReversalMismatch { requested: 4, returned: 2, .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(t.batch_qty(batch.id).await, 5);

        let err = service.delete_sale(&t.ctx(), receipt.sale.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let kept = t.db.sales().get(t.pharmacy_id, receipt.sale.id).await.unwrap().unwrap();
        assert_eq!(kept.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_leftover_usage_blocks_delete() {
        let t = TestDb::new().await;
        let p = t.product("P", 100).await.id;
        t.batch(p, 10, None, BatchStatus::Active).await;
        let service = t.db.sale_service();
        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("P", 2)], 200))
            .await
            .unwrap();

        sqlx::query("UPDATE sale_batch_usages SET qty = 3 WHERE sale_id = ?1")
            .bind(receipt.sale.id)
            .execute(t.db.pool())
            .await
            .unwrap();

        let err = service.delete_sale(&t.ctx(), receipt.sale.id).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Core(CoreError::UsageLedgerNotEmpty { remaining: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_sales_are_scoped_to_pharmacy() {
        let t = TestDb::new().await;
        let p = t.product("P", 100).await.id;
        t.batch(p, 10, None, BatchStatus::Active).await;
        let receipt = t
            .db
            .sale_service()
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("P", 1)], 100))
            .await
            .unwrap();

        let other = t.other_pharmacy().await;
        let intruder = PharmacyContext::new(other, t.user_id);
        let err = t.db.sale_service().delete_sale(&intruder, receipt.sale.id).await.unwrap_err();
        assert!(matches!(err, InventoryError::Core(CoreError::SaleNotFound(_))));
        assert!(t.db.sale_service().get(&intruder, receipt.sale.id).await.is_err());
        assert_eq!(t.db.sale_service().get(&t.ctx(), receipt.sale.id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_low_stock_sales_keep_one_alert() {
        let t = TestDb::new().await;
        t.enable_email().await;
        let p = t.product("LOW", 100).await.id;
        t.batch(p, 12, None, BatchStatus::Active).await;
        let service = t.db.sale_service();

        for _ in 0..3 {
            service
                .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("LOW", 1)], 100))
                .await
                .unwrap();
        }

        let open = t.db.notifications().open(t.pharmacy_id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].notification_type, NotificationType::LowStock);
        assert!(open[0].email_sent);
        assert_eq!(t.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_selling_out_opens_out_of_stock() {
        let t = TestDb::new().await;
        let p = t.product("GONE", 100).await.id;
        t.batch(p, 3, None, BatchStatus::Active).await;
        let service = t.db.sale_service();

        let receipt = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("GONE", 3)], 300))
            .await
            .unwrap();
        let open = t.db.notifications().open(t.pharmacy_id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].notification_type, NotificationType::OutOfStock);

        // Deleting the sale brings 3 back: out-of-stock resolves, low-stock opens.
        service.delete_sale(&t.ctx(), receipt.sale.id).await.unwrap();
        let open = t.db.notifications().open(t.pharmacy_id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].notification_type, NotificationType::LowStock);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_write() {
        let t = TestDb::new().await;
        let service = t.db.sale_service();

        let err = service.confirm_sale(&t.ctx(), new_sale(vec![], 0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("X", 0)], 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .confirm_sale(&t.ctx(), new_sale(vec![SaleLine::new("X", 1)], -5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let t = TestDb::file(4).await;
        let p = t.product("RACE", 100).await.id;
        t.batch(p, 6, Some(t.date(20)), BatchStatus::Active).await;
        t.batch(p, 4, Some(t.date(40)), BatchStatus::Active).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = t.db.clone();
            let ctx = t.ctx();
            handles.push(tokio::spawn(async move {
                db.sale_service()
                    .confirm_sale(&ctx, new_sale(vec![SaleLine::new("RACE", 2)], 200))
                    .await
            }));
        }

        let mut confirmed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => confirmed += 1,
                Err(err) => assert!(
                    matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })),
                    "unexpected error: {err}"
                ),
            }
        }

        // 10 units, 2 per sale
        assert_eq!(confirmed, 5);
        let product = t.db.products().get(t.pharmacy_id, p).await.unwrap().unwrap();
        assert_eq!(product.quantity, 0);
        t.assert_snapshot_consistent(p).await;

        let used: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(qty), 0) FROM sale_batch_usages WHERE pharmacy_product_id = ?1")
            .bind(p)
            .fetch_one(t.db.pool())
            .await
            .unwrap();
        assert_eq!(used, 10);
    }
}
