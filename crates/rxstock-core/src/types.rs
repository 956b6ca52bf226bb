//! # Domain Types
//!
//! Core domain types for pharmacy stock, sales and alerts.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ PharmacyProduct  │1─*│  ProductBatch    │1─*│ SaleBatchUsage   │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  quantity  ◄─────┼───┤  quantity        │   │  sale_id         │    │
//! │  │  expiry_date     │   │  expiry_date     │   │  batch_id        │    │
//! │  │  (snapshot)      │   │  status          │   │  qty             │    │
//! │  └──────────────────┘   └──────────────────┘   └────────┬─────────┘    │
//! │                                                         │              │
//! │  ┌──────────────────┐   ┌──────────────────┐            │              │
//! │  │      Sale        │1─*│    SaleItem      │◄───────────┘ (nullable)   │
//! │  │  total_cents     │   │  barcode, qty    │                           │
//! │  │  amount_given    │   │  price_cents     │                           │
//! │  └──────────────────┘   └──────────────────┘                           │
//! │                                                                         │
//! │  Notification (low_stock, out_of_stock, expired, near_expiry_*)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tenancy
//! Every persisted row carries `pharmacy_id`. Every operation takes a
//! [`PharmacyContext`] and never touches rows of another pharmacy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tenant Context
// =============================================================================

/// Who is acting, and on behalf of which pharmacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PharmacyContext {
    pub pharmacy_id: i64,
    pub user_id: i64,
}

impl PharmacyContext {
    pub const fn new(pharmacy_id: i64, user_id: i64) -> Self {
        PharmacyContext {
            pharmacy_id,
            user_id,
        }
    }
}

// =============================================================================
// Pharmacy Product
// =============================================================================

/// A global product as stocked by one pharmacy.
///
/// `quantity` and `expiry_date` are a denormalized snapshot of the product's
/// saleable batches. Only the snapshot recalculator writes them.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PharmacyProduct {
    pub id: i64,
    pub pharmacy_id: i64,
    pub global_product_id: i64,
    pub barcode: String,
    pub name: String,
    pub price_cents: i64,

    /// Sum of saleable batch quantities.
    pub quantity: i64,

    /// Earliest expiry among saleable batches.
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PharmacyProduct {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Batch Status
// =============================================================================

/// Lifecycle state of a batch.
///
/// ```text
///            sweep / manual
///   active ─────────────────► expired
///     │  ▲                       │
///     │  └───── manual ──────────┘
///     │                          │
///     └──────┬───────────────────┘
///            ▼
///   disposed | returned | void      (terminal, quantity forced to 0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
pub enum BatchStatus {
    Active,
    Expired,
    Disposed,
    Returned,
    Void,
}

impl BatchStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Expired => "expired",
            BatchStatus::Disposed => "disposed",
            BatchStatus::Returned => "returned",
            BatchStatus::Void => "void",
        }
    }

    /// Terminal batches never come back into stock.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Disposed | BatchStatus::Returned | BatchStatus::Void
        )
    }

    /// Whether a batch may move from `self` to `next`.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BatchStatus::Active),
            "expired" => Ok(BatchStatus::Expired),
            "disposed" => Ok(BatchStatus::Disposed),
            "returned" => Ok(BatchStatus::Returned),
            "void" => Ok(BatchStatus::Void),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

// =============================================================================
// Product Batch
// =============================================================================

/// A received lot of one product with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductBatch {
    /// Monotonic id. Ties in expiry are broken by it.
    pub id: i64,
    pub pharmacy_id: i64,
    pub pharmacy_product_id: i64,
    pub quantity: i64,

    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    pub status: BatchStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ProductBatch {
    /// Whether the batch can be sold from on `today`.
    ///
    /// Active, holding stock, and not past its expiry date. A batch expiring
    /// today is still saleable today.
    pub fn is_saleable(&self, today: NaiveDate) -> bool {
        self.status == BatchStatus::Active
            && self.quantity > 0
            && self.expiry_date.map_or(true, |expiry| expiry >= today)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub pharmacy_id: i64,
    pub user_id: i64,
    pub total_cents: i64,

    /// Cash tendered. Cleared when an edit omits it.
    pub amount_given_cents: Option<i64>,
    pub change_cents: Option<i64>,
    pub description: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A priced line of a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub pharmacy_product_id: i64,
    pub barcode: String,
    pub name: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub subtotal_cents: i64,
}

/// One allocation of sold units to one batch.
///
/// The ledger is authoritative for reversals; `sale_item_id` is informational
/// and goes NULL when items are rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleBatchUsage {
    pub id: i64,
    pub sale_id: i64,
    pub sale_item_id: Option<i64>,
    pub pharmacy_id: i64,
    pub pharmacy_product_id: i64,
    pub batch_id: i64,
    pub barcode: String,
    pub qty: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Sale header plus its items, as returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Kind of stock or expiry alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
pub enum NotificationType {
    LowStock,
    OutOfStock,
    Expired,
    NearExpiryInitial,
    #[serde(rename = "near_expiry_7d")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "near_expiry_7d"))]
    NearExpiry7d,
}

impl NotificationType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationType::LowStock => "low_stock",
            NotificationType::OutOfStock => "out_of_stock",
            NotificationType::Expired => "expired",
            NotificationType::NearExpiryInitial => "near_expiry_initial",
            NotificationType::NearExpiry7d => "near_expiry_7d",
        }
    }

    /// Stock-level alerts are keyed by product; expiry alerts by batch.
    pub const fn is_batch_scoped(&self) -> bool {
        matches!(
            self,
            NotificationType::Expired
                | NotificationType::NearExpiryInitial
                | NotificationType::NearExpiry7d
        )
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dashboard alert row.
///
/// `batch_id` is 0 for product-level (stock) alerts.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Notification {
    pub id: i64,
    pub pharmacy_id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub is_read: bool,
    pub is_resolved: bool,
    pub email_sent: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Pharmacy Settings
// =============================================================================

/// Per-pharmacy alert configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PharmacySettings {
    pub pharmacy_id: i64,
    pub low_stock_threshold: i64,
    pub expiry_alert_days: i64,
    pub notify_by_email: bool,
    pub notify_by_dashboard: bool,
}

impl PharmacySettings {
    /// Settings used when a pharmacy has never saved its own.
    pub fn defaults_for(pharmacy_id: i64) -> Self {
        PharmacySettings {
            pharmacy_id,
            low_stock_threshold: crate::DEFAULT_LOW_STOCK_THRESHOLD,
            expiry_alert_days: crate::DEFAULT_EXPIRY_ALERT_DAYS,
            notify_by_email: false,
            notify_by_dashboard: true,
        }
    }
}

// =============================================================================
// Engine Results
// =============================================================================

/// Units taken from one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub batch_id: i64,
    pub qty: i64,
}

/// Denormalized stock of a product after recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockSnapshot {
    pub quantity: i64,
    #[ts(as = "Option<String>")]
    pub next_expiry: Option<NaiveDate>,
}

impl StockSnapshot {
    pub const fn empty() -> Self {
        StockSnapshot {
            quantity: 0,
            next_expiry: None,
        }
    }
}

/// What a consumption did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumptionOutcome {
    pub allocations: Vec<Allocation>,
    pub snapshot: StockSnapshot,
}

/// What a reversal did. `returned` may be less than requested; callers
/// decide whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalOutcome {
    pub returned: i64,
    pub snapshot: StockSnapshot,
}

// =============================================================================
// Requests
// =============================================================================

/// A line the cashier scanned. Client prices are never trusted; the line is
/// priced from the pharmacy product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub barcode: String,
    pub quantity: i64,
}

impl SaleLine {
    pub fn new(barcode: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            barcode: barcode.into(),
            quantity,
        }
    }
}

/// Input of `confirm_sale`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub items: Vec<SaleLine>,
    pub amount_given_cents: i64,
    pub description: Option<String>,
}

/// Input of `update_sale`. Replaces items, tender and description.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleUpdate {
    pub items: Vec<SaleLine>,
    pub amount_given_cents: Option<i64>,
    pub description: Option<String>,
}

/// How a batch quantity edit is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
#[ts(export)]
pub enum QuantityChange {
    /// Add (or subtract, when negative) units.
    Delta(i64),
    /// Overwrite the quantity.
    Set(i64),
}

/// How a batch expiry edit is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum ExpiryChange {
    Set(NaiveDate),
    Clear,
}

/// Partial batch edit. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub quantity: Option<QuantityChange>,
    pub expiry: Option<ExpiryChange>,
    pub status: Option<BatchStatus>,
}

impl BatchUpdate {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.expiry.is_none() && self.status.is_none()
    }
}

/// How a batch is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DeleteMode {
    /// Status becomes `void`, quantity 0. Row and ledger references stay.
    #[default]
    Void,
    /// Row is removed.
    Hard,
}

/// Receiving stock against a barcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockIntake {
    pub barcode: String,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
}

// =============================================================================
// Unit Tests
// =============================================================================
