//! # Inventory Engine
//!
//! Stock movement inside a unit of work.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Inventory Engine                                │
//! │                                                                         │
//! │   consume (FEFO)          reverse (LIFO)          batch edits           │
//! │        │                        │                      │                │
//! │        ▼                        ▼                      ▼                │
//! │   ledger: product_batches  +  sale_batch_usages                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   snapshot::recalc ──► pharmacy_products.quantity / expiry_date         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   notifier ──► notifications rows, queued emails                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here expects the product to be locked by the caller's
//! [`UnitOfWork`](crate::UnitOfWork) or locks it itself.

pub mod consume;
pub(crate) mod ledger;
pub mod notifier;
pub mod reverse;
pub mod snapshot;

pub use consume::{consume, ConsumeRequest};
pub use notifier::{check_stock_level, EnsureOutcome, StockLevelCheck};
pub use reverse::{reverse, ReverseRequest};
pub use snapshot::recalc;
