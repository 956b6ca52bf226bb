//! # rxstock-core: Pure Business Logic for RxStock
//!
//! Stock rules for multi-tenant pharmacies, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RxStock Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          HTTP API / dashboard (outside this workspace)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   rxstock-db: sale orchestrator, batch services, sweeps         │   │
//! │  │   (one SQLite transaction per operation)                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rxstock-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌────────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐        │   │
//! │  │  │ allocation │ │ reversal │ │ lifecycle │ │  alerts  │        │   │
//! │  │  │   FEFO     │ │   LIFO   │ │ batch     │ │ stock    │        │   │
//! │  │  │  snapshot  │ │  ledger  │ │ edits     │ │ expiry   │        │   │
//! │  │  └────────────┘ └──────────┘ └───────────┘ └──────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (products, batches, sales, usage rows, alerts)
//! - [`allocation`] - FEFO consumption planning and snapshot derivation
//! - [`reversal`] - LIFO reversal planning over the usage ledger
//! - [`lifecycle`] - Batch edit and deletion rules
//! - [`alerts`] - Stock and expiry alert rules, email requests
//! - [`pricing`] - Sale pricing, tender and edit deltas
//! - [`money`] - Integer money
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! "Today" is always passed in by the caller, so every rule here is
//! deterministic.
//!
//! ## Example Usage
//!
//! ```rust
//! use rxstock_core::alerts::{stock_level_actions, StockAlertAction};
//! use rxstock_core::NotificationType;
//!
//! let actions = stock_level_actions(0, 10);
//! assert!(actions.contains(&StockAlertAction::Open(NotificationType::OutOfStock)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod allocation;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pricing;
pub mod reversal;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Low-stock threshold used until a pharmacy saves its own settings.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Near-expiry window in days used until a pharmacy saves its own settings.
pub const DEFAULT_EXPIRY_ALERT_DAYS: i64 = 30;

/// Maximum quantity of one line or one intake.
///
/// ## Business Reason
/// Catches typos (an extra zero on a stock intake) before they distort
/// stock levels.
pub const MAX_ITEM_QUANTITY: i64 = 100_000;

/// Maximum barcode length.
pub const MAX_BARCODE_LENGTH: usize = 64;

/// Maximum sale description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;
