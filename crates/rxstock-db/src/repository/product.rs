//! # Product Repository
//!
//! Pharmacy products: catalog linking, lookups and the stock snapshot columns.
//!
//! ## Two Tables, One View
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products_global (shared catalog)     pharmacy_products (per pharmacy) │
//! │  ───────────────────────────────      ──────────────────────────────── │
//! │  id                          ◄─────── global_product_id                │
//! │  barcode (UNIQUE)                     pharmacy_id                       │
//! │  name                                 custom_name (overrides name)     │
//! │                                       price_cents                       │
//! │                                       quantity      ┐ snapshot,         │
//! │                                       expiry_date   ┘ recalculated only │
//! │                                                                         │
//! │  PharmacyProduct = join of both, name = COALESCE(custom_name, name)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `pub(crate)` query functions take any executor so services can run
//! them on a unit-of-work connection and repositories on the pool.

use chrono::{DateTime, Utc};
use rxstock_core::validation::{validate_barcode, validate_price_cents};
use rxstock_core::{PharmacyProduct, StockSnapshot};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult, InventoryResult};

pub(crate) const PRODUCT_SELECT: &str = r#"
    SELECT
        pp.id,
        pp.pharmacy_id,
        pp.global_product_id,
        pg.barcode,
        COALESCE(pp.custom_name, pg.name) AS name,
        pp.price_cents,
        pp.quantity,
        pp.expiry_date,
        pp.created_at,
        pp.updated_at
    FROM pharmacy_products pp
    INNER JOIN products_global pg ON pg.id = pp.global_product_id
"#;

// =============================================================================
// Shared Queries
// =============================================================================

pub(crate) async fn fetch_by_id<'e, E>(exec: E, pharmacy_id: i64, product_id: i64) -> DbResult<Option<PharmacyProduct>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{PRODUCT_SELECT} WHERE pp.id = ?1 AND pp.pharmacy_id = ?2");
    let product = sqlx::query_as::<_, PharmacyProduct>(&sql)
        .bind(product_id)
        .bind(pharmacy_id)
        .fetch_optional(exec)
        .await?;
    Ok(product)
}

pub(crate) async fn fetch_by_barcode<'e, E>(exec: E, pharmacy_id: i64, barcode: &str) -> DbResult<Option<PharmacyProduct>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{PRODUCT_SELECT} WHERE pp.pharmacy_id = ?1 AND pg.barcode = ?2");
    let product = sqlx::query_as::<_, PharmacyProduct>(&sql)
        .bind(pharmacy_id)
        .bind(barcode.trim())
        .fetch_optional(exec)
        .await?;
    Ok(product)
}

/// Writes the recalculated snapshot. Only the snapshot recalculator calls this.
pub(crate) async fn write_snapshot(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    product_id: i64,
    snapshot: StockSnapshot,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE pharmacy_products
        SET quantity = ?1, expiry_date = ?2, updated_at = ?3
        WHERE id = ?4 AND pharmacy_id = ?5
        "#,
    )
    .bind(snapshot.quantity)
    .bind(snapshot.next_expiry)
    .bind(now)
    .bind(product_id)
    .bind(pharmacy_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// A product to link into a pharmacy's catalog.
#[derive(Debug, Clone)]
pub struct NewPharmacyProduct {
    pub barcode: String,
    pub name: String,
    pub price_cents: i64,
}

/// Repository for pharmacy product operations.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().find_by_barcode(pharmacy_id, "8901234567890").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Links a catalog product into a pharmacy, creating the catalog entry
    /// on first sight of the barcode. Starts with zero stock.
    ///
    /// ## Returns
    /// * `Err(UniqueViolation)` - the pharmacy already stocks this barcode
    pub async fn link(&self, pharmacy_id: i64, new: NewPharmacyProduct) -> InventoryResult<PharmacyProduct> {
        validate_barcode(&new.barcode)?;
        validate_price_cents(new.price_cents)?;
        let barcode = new.barcode.trim();
        let now = Utc::now();

        debug!(pharmacy_id, barcode, "Linking product");

        sqlx::query("INSERT INTO products_global (barcode, name, created_at) VALUES (?1, ?2, ?3) ON CONFLICT(barcode) DO NOTHING")
            .bind(barcode)
            .bind(&new.name)
            .bind(now)
            .execute(&self.pool)
            .await?;

        let (global_id, global_name): (i64, String) =
            sqlx::query_as("SELECT id, name FROM products_global WHERE barcode = ?1")
                .bind(barcode)
                .fetch_one(&self.pool)
                .await?;

        let custom_name = (global_name != new.name).then_some(new.name.as_str());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pharmacy_products (
                pharmacy_id, global_product_id, custom_name, price_cents,
                quantity, expiry_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)
            RETURNING id
            "#,
        )
        .bind(pharmacy_id)
        .bind(global_id)
        .bind(custom_name)
        .bind(new.price_cents)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("barcode", barcode),
            other => other,
        })?;

        let product = fetch_by_id(&self.pool, pharmacy_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;
        Ok(product)
    }

    /// Changes the shelf price used for future sale lines.
    pub async fn set_price(&self, pharmacy_id: i64, product_id: i64, price_cents: i64) -> InventoryResult<()> {
        validate_price_cents(price_cents)?;

        let result = sqlx::query("UPDATE pharmacy_products SET price_cents = ?1, updated_at = ?2 WHERE id = ?3 AND pharmacy_id = ?4")
            .bind(price_cents)
            .bind(Utc::now())
            .bind(product_id)
            .bind(pharmacy_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id).into());
        }
        Ok(())
    }

    pub async fn get(&self, pharmacy_id: i64, product_id: i64) -> DbResult<Option<PharmacyProduct>> {
        fetch_by_id(&self.pool, pharmacy_id, product_id).await
    }

    pub async fn find_by_barcode(&self, pharmacy_id: i64, barcode: &str) -> DbResult<Option<PharmacyProduct>> {
        fetch_by_barcode(&self.pool, pharmacy_id, barcode).await
    }

    /// Lists a pharmacy's products by name.
    pub async fn list(&self, pharmacy_id: i64, limit: u32, offset: u32) -> DbResult<Vec<PharmacyProduct>> {
        let sql = format!("{PRODUCT_SELECT} WHERE pp.pharmacy_id = ?1 ORDER BY name, pp.id LIMIT ?2 OFFSET ?3");
        let products = sqlx::query_as::<_, PharmacyProduct>(&sql)
            .bind(pharmacy_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Every product id of a pharmacy, ascending.
    pub async fn ids_for_pharmacy(&self, pharmacy_id: i64) -> DbResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM pharmacy_products WHERE pharmacy_id = ?1 ORDER BY id")
            .bind(pharmacy_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Maps barcodes to product ids within a pharmacy. Unknown barcodes are
    /// simply absent from the result.
    pub async fn resolve_barcodes(&self, pharmacy_id: i64, barcodes: &[&str]) -> DbResult<HashMap<String, i64>> {
        let mut resolved = HashMap::with_capacity(barcodes.len());
        for &barcode in barcodes {
            let barcode = barcode.trim();
            if resolved.contains_key(barcode) {
                continue;
            }
            let id: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT pp.id
                FROM pharmacy_products pp
                INNER JOIN products_global pg ON pg.id = pp.global_product_id
                WHERE pp.pharmacy_id = ?1 AND pg.barcode = ?2
                "#,
            )
            .bind(pharmacy_id)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = id {
                resolved.insert(barcode.to_string(), id);
            }
        }
        Ok(resolved)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
