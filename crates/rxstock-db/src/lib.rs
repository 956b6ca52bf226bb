//! # rxstock-db: Database Layer and Inventory Services
//!
//! Every stock mutation in RxStock runs here, inside one SQLite transaction.
//! The rules themselves (FEFO order, LIFO reversal, alert hysteresis) live in
//! `rxstock-core`; this crate loads rows, applies the plans and persists the
//! results.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RxStock Data Flow                                │
//! │                                                                         │
//! │  HTTP handler / sweep scheduler                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   rxstock-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │   │
//! │  │   │   Services   │   │  Inventory   │   │   Repositories   │  │   │
//! │  │   │              │   │   engine     │   │                  │  │   │
//! │  │   │ SaleService  │──►│ consume      │   │ products         │  │   │
//! │  │   │ StockService │   │ reverse      │   │ batches, sales   │  │   │
//! │  │   │ SweepService │   │ recalc       │   │ notifications    │  │   │
//! │  │   │              │   │ notifier     │   │ pharmacies       │  │   │
//! │  │   └──────┬───────┘   └──────────────┘   └──────────────────┘  │   │
//! │  │          │                                                     │   │
//! │  │          ▼                                                     │   │
//! │  │   UnitOfWork (transaction, locks, email outbox)                │   │
//! │  │          │                                                     │   │
//! │  │          ▼                                                     │   │
//! │  │   Database (pool.rs) ── SqlitePool ── migrations (embedded)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, [`Database`] handle, [`InventoryPolicy`]
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - [`DbError`] and the service-level [`InventoryError`]
//! - [`unit_of_work`] - Transaction with row locks and queued emails
//! - [`inventory`] - Batch ledger engine: consume, reverse, recalc, notifier
//! - [`service`] - Sale, stock and sweep operations
//! - [`repository`] - Reads and plain catalog CRUD
//! - [`clock`] / [`mailer`] - Injected business date and email transport
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rxstock_core::{NewSale, PharmacyContext, SaleLine};
//! use rxstock_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("rxstock.db")).await?;
//! let ctx = PharmacyContext::new(pharmacy_id, user_id);
//!
//! let sale = NewSale {
//!     items: vec![SaleLine::new("8901", 2)],
//!     amount_given_cents: 1000,
//!     description: None,
//! };
//! let receipt = db.sale_service().confirm_sale(&ctx, sale).await?;
//!
//! db.sweeps().sweep_expired().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod inventory;
pub mod mailer;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DbError, DbResult, InventoryError, InventoryResult};
pub use mailer::{AlertMailer, LogMailer, MailError, PendingEmail, RecordingMailer};
pub use pool::{Database, DbConfig, InventoryPolicy};
pub use unit_of_work::UnitOfWork;

// Repository re-exports for convenience
pub use repository::{
    BatchRepository, NewPharmacyProduct, NewUser, NotificationRepository, PharmacyRepository,
    ProductRepository, SaleFilter, SaleRepository,
};

pub use service::{
    BatchChange, ExpirySweepReport, LowStockReport, NearExpiryReport, SaleService, StockService,
    SweepService,
};
