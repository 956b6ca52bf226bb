//! # Sale Repository
//!
//! Sale headers, line items and the read side of the usage ledger.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  (cart)  ── client side only                                            │
//! │     │                                                                   │
//! │     ▼  confirm_sale: header + items + FEFO usage rows                   │
//! │  CONFIRMED                                                              │
//! │     │                                                                   │
//! │     ▼  update_sale: per-barcode delta, consume or reverse, items        │
//! │  UPDATED (any number of times)     rewritten, header recomputed         │
//! │     │                                                                   │
//! │     ▼  delete_sale: reverse everything, usage ledger must be empty      │
//! │  DELETED (rows gone)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes happen only inside [`SaleService`](crate::service::SaleService)
//! units of work; this module provides the SQL they run and the reads.

use chrono::{DateTime, Utc};
use rxstock_core::pricing::{PricedLine, SaleTotals};
use rxstock_core::{Sale, SaleBatchUsage, SaleItem, SaleReceipt};
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{DbError, DbResult};
use crate::inventory::ledger;

const SALE_SELECT: &str = r#"
    SELECT id, pharmacy_id, user_id, total_cents, amount_given_cents, change_cents,
           description, created_at, updated_at
    FROM sales
"#;

const ITEM_SELECT: &str = r#"
    SELECT id, sale_id, pharmacy_product_id, barcode, name, quantity, price_cents, subtotal_cents
    FROM sale_items
"#;

// =============================================================================
// Shared Queries
// =============================================================================

pub(crate) async fn fetch_sale<'e, E>(exec: E, pharmacy_id: i64, sale_id: i64) -> DbResult<Option<Sale>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{SALE_SELECT} WHERE id = ?1 AND pharmacy_id = ?2");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(sale_id)
        .bind(pharmacy_id)
        .fetch_optional(exec)
        .await?;
    Ok(sale)
}

/// Items of a sale in entry order.
pub(crate) async fn fetch_items<'e, E>(exec: E, sale_id: i64) -> DbResult<Vec<SaleItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{ITEM_SELECT} WHERE sale_id = ?1 ORDER BY id");
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(exec)
        .await?;
    Ok(items)
}

pub(crate) async fn insert_header(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    user_id: i64,
    totals: SaleTotals,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO sales (
            pharmacy_id, user_id, total_cents, amount_given_cents, change_cents,
            description, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        RETURNING id
        "#,
    )
    .bind(pharmacy_id)
    .bind(user_id)
    .bind(totals.total_cents)
    .bind(totals.amount_given_cents)
    .bind(totals.change_cents)
    .bind(description)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn update_header(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    sale_id: i64,
    totals: SaleTotals,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sales
        SET total_cents = ?1, amount_given_cents = ?2, change_cents = ?3,
            description = ?4, updated_at = ?5
        WHERE id = ?6 AND pharmacy_id = ?7
        "#,
    )
    .bind(totals.total_cents)
    .bind(totals.amount_given_cents)
    .bind(totals.change_cents)
    .bind(description)
    .bind(now)
    .bind(sale_id)
    .bind(pharmacy_id)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::not_found("Sale", sale_id));
    }
    Ok(())
}

pub(crate) async fn insert_item(conn: &mut SqliteConnection, sale_id: i64, line: &PricedLine) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO sale_items (
            sale_id, pharmacy_product_id, barcode, name, quantity, price_cents, subtotal_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING id
        "#,
    )
    .bind(sale_id)
    .bind(line.pharmacy_product_id)
    .bind(&line.barcode)
    .bind(&line.name)
    .bind(line.quantity)
    .bind(line.price_cents)
    .bind(line.subtotal_cents)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Removes all items. Usage rows keep their quantities; their
/// `sale_item_id` goes NULL.
pub(crate) async fn delete_items(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
        .bind(sale_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn delete_header(conn: &mut SqliteConnection, pharmacy_id: i64, sale_id: i64) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM sales WHERE id = ?1 AND pharmacy_id = ?2")
        .bind(sale_id)
        .bind(pharmacy_id)
        .execute(conn)
        .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::not_found("Sale", sale_id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Optional filters for listing sales. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub user_id: Option<i64>,
    pub min_total_cents: Option<i64>,
    pub max_total_cents: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl SaleFilter {
    pub fn page(limit: u32, offset: u32) -> Self {
        SaleFilter {
            limit,
            offset,
            ..SaleFilter::default()
        }
    }
}

/// Read access to sales.
///
/// ## Usage
/// ```rust,ignore
/// let receipt = db.sales().get(pharmacy_id, sale_id).await?;
/// let recent = db.sales().list(pharmacy_id, &SaleFilter::page(20, 0)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Sale header with its items.
    pub async fn get(&self, pharmacy_id: i64, sale_id: i64) -> DbResult<Option<SaleReceipt>> {
        let Some(sale) = fetch_sale(&self.pool, pharmacy_id, sale_id).await? else {
            return Ok(None);
        };
        let items = fetch_items(&self.pool, sale_id).await?;
        Ok(Some(SaleReceipt { sale, items }))
    }

    /// Sales of a pharmacy, newest first.
    pub async fn list(&self, pharmacy_id: i64, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SALE_SELECT);
        qb.push(" WHERE pharmacy_id = ").push_bind(pharmacy_id);

        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(min) = filter.min_total_cents {
            qb.push(" AND total_cents >= ").push_bind(min);
        }
        if let Some(max) = filter.max_total_cents {
            qb.push(" AND total_cents <= ").push_bind(max);
        }
        if let Some(from) = filter.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(until) = filter.until {
            qb.push(" AND created_at < ").push_bind(until);
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.max(1))
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let sales = qb.build_query_as::<Sale>().fetch_all(&self.pool).await?;
        Ok(sales)
    }

    /// Which batches supplied the sale, in allocation order.
    pub async fn usages(&self, pharmacy_id: i64, sale_id: i64) -> DbResult<Vec<SaleBatchUsage>> {
        ledger::usages_for_sale(&self.pool, pharmacy_id, sale_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
