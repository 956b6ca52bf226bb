//! # Inventory Services
//!
//! The operations the outer API calls. Each one runs in exactly one
//! [`UnitOfWork`] and either commits everything or nothing.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleService     confirm_sale / update_sale / delete_sale              │
//! │  StockService    add_stock_by_barcode / update_batch / delete_batch    │
//! │  SweepService    sweep_expired / sweep_near_expiry / evaluate_low_stock │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ServiceContext::begin ──► UnitOfWork ──► ServiceContext::finish       │
//! │                                              │                          │
//! │                                              ├── COMMIT                 │
//! │                                              └── deliver queued emails  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod sales;
mod stock;
mod sweeps;

pub use sales::SaleService;
pub use stock::{BatchChange, StockService};
pub use sweeps::{ExpirySweepReport, LowStockReport, NearExpiryReport, SweepService};

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::error::DbResult;
use crate::mailer::{self, AlertMailer};
use crate::pool::InventoryPolicy;
use crate::unit_of_work::UnitOfWork;

/// What every service needs: the pool, the business clock, the mailer and
/// the inventory policy.
#[derive(Debug, Clone)]
pub(crate) struct ServiceContext {
    pub pool: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn AlertMailer>,
    pub policy: InventoryPolicy,
}

impl ServiceContext {
    pub async fn begin(&self) -> DbResult<UnitOfWork> {
        UnitOfWork::begin(&self.pool, self.clock.today()).await
    }

    /// Commits, then sends whatever the unit queued.
    pub async fn finish(&self, uow: UnitOfWork) -> DbResult<()> {
        let pending = uow.commit().await?;
        mailer::deliver(self.mailer.as_ref(), pending).await;
        Ok(())
    }
}
