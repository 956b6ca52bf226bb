//! # Sweeps
//!
//! Idempotent housekeeping an external scheduler calls: flipping past-dated
//! batches to `expired`, raising near-expiry reminders, and re-evaluating
//! stock levels against current thresholds.
//!
//! ```text
//! scheduler (cron, systemd timer, rxstock-sweep)
//!     │
//!     ├── sweep_expired()                 all pharmacies
//!     └── per pharmacy
//!           ├── sweep_near_expiry(id)
//!           └── evaluate_low_stock(id)
//! ```
//!
//! Work is split into one unit of work per product. A product that fails is
//! logged and counted; the sweep carries on with the next one. Running a
//! sweep twice on the same day changes nothing the second time.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rxstock_core::alerts::expiry_alert_for;
use rxstock_core::{CoreError, NotificationType, ProductBatch};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{DbError, InventoryResult};
use crate::inventory::notifier::{record_expiry_alert, resolve_batch_alerts};
use crate::inventory::{check_stock_level, ledger, recalc};
use crate::repository::{pharmacy, product, PharmacyRepository, ProductRepository};
use crate::service::ServiceContext;

/// Outcome of [`SweepService::sweep_expired`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweepReport {
    pub batches_expired: u64,
    pub alerts_opened: u64,
    pub products_recalculated: u64,
    pub failures: u64,
}

/// Outcome of [`SweepService::sweep_near_expiry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NearExpiryReport {
    pub pharmacy_id: i64,
    pub batches_checked: u64,
    pub alerts_opened: u64,
    pub failures: u64,
}

/// Outcome of [`SweepService::evaluate_low_stock`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LowStockReport {
    pub pharmacy_id: i64,
    pub products_checked: u64,
    pub alerts_opened: u64,
    pub alerts_resolved: u64,
    pub failures: u64,
}

/// A batch picked up by a sweep query.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct Candidate {
    id: i64,
    pharmacy_id: i64,
    pharmacy_product_id: i64,
}

type ProductKey = (i64, i64);

#[derive(Debug, Clone)]
pub struct SweepService {
    ctx: ServiceContext,
}

impl SweepService {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        SweepService { ctx }
    }

    // =========================================================================
    // Expired
    // =========================================================================

    /// Flips every active batch whose expiry date has passed to `expired`,
    /// across all pharmacies.
    ///
    /// Batches that still held units get a one-shot `expired` alert; their
    /// near-expiry reminders are resolved.
    pub async fn sweep_expired(&self) -> InventoryResult<ExpirySweepReport> {
        let today = self.ctx.clock.today();
        let candidates = expired_candidates(&self.ctx.pool, today).await?;
        let mut report = ExpirySweepReport::default();

        for ((pharmacy_id, product_id), batch_ids) in group(candidates) {
            match self.expire_product(pharmacy_id, product_id, &batch_ids).await {
                Ok((expired, alerts)) => {
                    report.batches_expired += expired;
                    report.alerts_opened += alerts;
                    report.products_recalculated += 1;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(pharmacy_id, product_id, error = %e, "Expiry sweep failed for product");
                }
            }
        }

        info!(
            %today,
            batches_expired = report.batches_expired,
            alerts_opened = report.alerts_opened,
            failures = report.failures,
            "Expiry sweep finished"
        );
        Ok(report)
    }

    async fn expire_product(&self, pharmacy_id: i64, product_id: i64, batch_ids: &[i64]) -> InventoryResult<(u64, u64)> {
        let mut uow = self.ctx.begin().await?;
        if !uow.lock_product(pharmacy_id, product_id).await? {
            return Err(DbError::not_found("Product", product_id).into());
        }

        let settings = pharmacy::fetch_settings(uow.conn(), pharmacy_id).await?;
        let product = product::fetch_by_id(uow.conn(), pharmacy_id, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        let today = uow.today();
        let now = uow.now();

        let mut expired = 0;
        let mut alerts = 0;
        for &batch_id in batch_ids {
            let Some(batch) = ledger::batch_by_id(uow.conn(), pharmacy_id, batch_id).await? else {
                continue;
            };
            if !ledger::expire_if_due(uow.conn(), pharmacy_id, batch_id, today, now).await? {
                continue;
            }
            expired += 1;

            resolve_batch_alerts(&mut uow, pharmacy_id, batch_id, Some(NotificationType::Expired)).await?;
            if batch.quantity > 0
                && record_expiry_alert(&mut uow, &settings, &product, &batch, NotificationType::Expired).await?
            {
                alerts += 1;
            }
        }

        recalc(&mut uow, pharmacy_id, product_id).await?;
        check_stock_level(&mut uow, pharmacy_id, product_id).await?;
        self.ctx.finish(uow).await?;
        Ok((expired, alerts))
    }

    // =========================================================================
    // Near Expiry
    // =========================================================================

    /// Raises one-shot `near_expiry_initial` / `near_expiry_7d` alerts for
    /// stocked active batches inside the pharmacy's alert window.
    pub async fn sweep_near_expiry(&self, pharmacy_id: i64) -> InventoryResult<NearExpiryReport> {
        self.require_pharmacy(pharmacy_id).await?;

        let today = self.ctx.clock.today();
        let settings = pharmacy::fetch_settings(&self.ctx.pool, pharmacy_id).await?;
        let until = today + Duration::days(settings.expiry_alert_days);
        let candidates = expiring_candidates(&self.ctx.pool, pharmacy_id, today, until).await?;

        let mut report = NearExpiryReport {
            pharmacy_id,
            ..NearExpiryReport::default()
        };

        for ((_, product_id), batch_ids) in group(candidates) {
            report.batches_checked += batch_ids.len() as u64;
            match self.remind_product(pharmacy_id, product_id, &batch_ids).await {
                Ok(opened) => report.alerts_opened += opened,
                Err(e) => {
                    report.failures += 1;
                    warn!(pharmacy_id, product_id, error = %e, "Near-expiry sweep failed for product");
                }
            }
        }

        info!(
            pharmacy_id,
            batches_checked = report.batches_checked,
            alerts_opened = report.alerts_opened,
            failures = report.failures,
            "Near-expiry sweep finished"
        );
        Ok(report)
    }

    async fn remind_product(&self, pharmacy_id: i64, product_id: i64, batch_ids: &[i64]) -> InventoryResult<u64> {
        let mut uow = self.ctx.begin().await?;
        if !uow.lock_product(pharmacy_id, product_id).await? {
            return Err(DbError::not_found("Product", product_id).into());
        }

        let settings = pharmacy::fetch_settings(uow.conn(), pharmacy_id).await?;
        let product = product::fetch_by_id(uow.conn(), pharmacy_id, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        let today = uow.today();

        let mut opened = 0;
        for &batch_id in batch_ids {
            let Some(batch) = ledger::batch_by_id(uow.conn(), pharmacy_id, batch_id).await? else {
                continue;
            };
            let Some(kind) = near_expiry_kind(&batch, today, settings.expiry_alert_days) else {
                continue;
            };
            if record_expiry_alert(&mut uow, &settings, &product, &batch, kind).await? {
                opened += 1;
            }
        }

        self.ctx.finish(uow).await?;
        Ok(opened)
    }

    // =========================================================================
    // Low Stock
    // =========================================================================

    /// Re-evaluates every product of a pharmacy against its current
    /// threshold, refreshing the snapshot first so batches that crossed their
    /// expiry date overnight stop counting.
    pub async fn evaluate_low_stock(&self, pharmacy_id: i64) -> InventoryResult<LowStockReport> {
        self.require_pharmacy(pharmacy_id).await?;

        let product_ids = ProductRepository::new(self.ctx.pool.clone())
            .ids_for_pharmacy(pharmacy_id)
            .await?;

        let mut report = LowStockReport {
            pharmacy_id,
            ..LowStockReport::default()
        };

        for product_id in product_ids {
            report.products_checked += 1;
            match self.evaluate_product(pharmacy_id, product_id).await {
                Ok((opened, resolved)) => {
                    report.alerts_opened += opened;
                    report.alerts_resolved += resolved;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(pharmacy_id, product_id, error = %e, "Low-stock evaluation failed for product");
                }
            }
        }

        info!(
            pharmacy_id,
            products_checked = report.products_checked,
            alerts_opened = report.alerts_opened,
            alerts_resolved = report.alerts_resolved,
            failures = report.failures,
            "Low-stock evaluation finished"
        );
        Ok(report)
    }

    async fn evaluate_product(&self, pharmacy_id: i64, product_id: i64) -> InventoryResult<(u64, u64)> {
        let mut uow = self.ctx.begin().await?;
        if !uow.lock_product(pharmacy_id, product_id).await? {
            return Err(DbError::not_found("Product", product_id).into());
        }

        recalc(&mut uow, pharmacy_id, product_id).await?;
        let check = check_stock_level(&mut uow, pharmacy_id, product_id).await?;
        self.ctx.finish(uow).await?;
        Ok((check.opened.len() as u64, check.resolved.len() as u64))
    }

    async fn require_pharmacy(&self, pharmacy_id: i64) -> InventoryResult<()> {
        if !PharmacyRepository::new(self.ctx.pool.clone()).exists(pharmacy_id).await? {
            return Err(CoreError::PharmacyNotFound(pharmacy_id).into());
        }
        Ok(())
    }
}

/// Near-expiry kind for a stocked active batch, if any.
fn near_expiry_kind(batch: &ProductBatch, today: NaiveDate, alert_days: i64) -> Option<NotificationType> {
    if !batch.is_saleable(today) {
        return None;
    }
    let expiry = batch.expiry_date?;
    expiry_alert_for(expiry, today, alert_days).filter(|kind| *kind != NotificationType::Expired)
}

/// Batch ids per (pharmacy, product), both ascending.
fn group(candidates: Vec<Candidate>) -> BTreeMap<ProductKey, Vec<i64>> {
    let mut grouped: BTreeMap<ProductKey, Vec<i64>> = BTreeMap::new();
    for c in candidates {
        grouped
            .entry((c.pharmacy_id, c.pharmacy_product_id))
            .or_default()
            .push(c.id);
    }
    grouped
}

async fn expired_candidates(pool: &SqlitePool, today: NaiveDate) -> Result<Vec<Candidate>, DbError> {
    let rows = sqlx::query_as::<_, Candidate>(
        r#"
        SELECT id, pharmacy_id, pharmacy_product_id
        FROM product_batches
        WHERE status = 'active' AND expiry_date IS NOT NULL AND expiry_date < ?1
        ORDER BY pharmacy_id, pharmacy_product_id, id
        "#,
    )
    .bind(today)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn expiring_candidates(
    pool: &SqlitePool,
    pharmacy_id: i64,
    today: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<Candidate>, DbError> {
    let rows = sqlx::query_as::<_, Candidate>(
        r#"
        SELECT id, pharmacy_id, pharmacy_product_id
        FROM product_batches
        WHERE pharmacy_id = ?1 AND status = 'active' AND quantity > 0
          AND expiry_date IS NOT NULL AND expiry_date >= ?2 AND expiry_date <= ?3
        ORDER BY pharmacy_product_id, id
        "#,
    )
    .bind(pharmacy_id)
    .bind(today)
    .bind(until)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// =============================================================================
// Unit Tests
// =============================================================================
