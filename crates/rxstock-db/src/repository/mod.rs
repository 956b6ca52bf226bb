//! # Repository Module
//!
//! Pool-backed reads and the plain CRUD that sits outside the inventory
//! engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Caller (HTTP layer, sweep binary, tests)                               │
//! │       │                                                                 │
//! │       │  db.products().find_by_barcode(pharmacy_id, "8901")             │
//! │       ▼                                                                 │
//! │  ProductRepository / BatchRepository / SaleRepository / ...             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqlitePool                                                             │
//! │                                                                         │
//! │  Stock-changing writes never come through here: they run inside a      │
//! │  UnitOfWork in crate::service.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module also exposes `pub(crate)` query functions generic over the
//! executor, so services can run the same SQL on a unit-of-work connection.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - catalog linking, lookups, prices
//! - [`BatchRepository`] - batch reads
//! - [`SaleRepository`] - sales, items, usage rows
//! - [`NotificationRepository`] - dashboard alerts
//! - [`PharmacyRepository`] - tenants, settings, users

pub mod batch;
pub mod notification;
pub mod pharmacy;
pub mod product;
pub mod sale;

pub use batch::BatchRepository;
pub use notification::NotificationRepository;
pub use pharmacy::{NewUser, PharmacyRepository};
pub use product::{NewPharmacyProduct, ProductRepository};
pub use sale::{SaleFilter, SaleRepository};
