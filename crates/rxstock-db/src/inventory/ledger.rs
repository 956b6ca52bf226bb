//! Row-level SQL for batches and the sale usage ledger.
//!
//! Every statement is scoped by `pharmacy_id`. Quantity writes are
//! conditional so a mismatch with the locked read surfaces as
//! [`DbError::Inconsistent`] instead of silently corrupting stock.

use chrono::{DateTime, NaiveDate, Utc};
use rxstock_core::reversal::ReversalStep;
use rxstock_core::{BatchStatus, ProductBatch, SaleBatchUsage};
use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::error::{DbError, DbResult};

pub(crate) const BATCH_SELECT: &str = r#"
    SELECT id, pharmacy_id, pharmacy_product_id, quantity, expiry_date, status, created_at, updated_at
    FROM product_batches
"#;

const USAGE_SELECT: &str = r#"
    SELECT id, sale_id, sale_item_id, pharmacy_id, pharmacy_product_id, batch_id, barcode, qty, created_at
    FROM sale_batch_usages
"#;

// =============================================================================
// Batches
// =============================================================================

pub(crate) async fn batch_by_id<'e, E>(exec: E, pharmacy_id: i64, batch_id: i64) -> DbResult<Option<ProductBatch>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{BATCH_SELECT} WHERE id = ?1 AND pharmacy_id = ?2");
    let batch = sqlx::query_as::<_, ProductBatch>(&sql)
        .bind(batch_id)
        .bind(pharmacy_id)
        .fetch_optional(exec)
        .await?;
    Ok(batch)
}

/// All batches of a product, any status, in id order.
pub(crate) async fn batches_for_product<'e, E>(exec: E, pharmacy_id: i64, product_id: i64) -> DbResult<Vec<ProductBatch>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{BATCH_SELECT} WHERE pharmacy_product_id = ?1 AND pharmacy_id = ?2 ORDER BY id");
    let batches = sqlx::query_as::<_, ProductBatch>(&sql)
        .bind(product_id)
        .bind(pharmacy_id)
        .fetch_all(exec)
        .await?;
    Ok(batches)
}

/// Candidate batches for FEFO consumption.
///
/// The SQL filter narrows the scan; the core planner re-applies the full
/// saleability rule.
pub(crate) async fn saleable_batches(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    product_id: i64,
    today: NaiveDate,
) -> DbResult<Vec<ProductBatch>> {
    let sql = format!(
        r#"{BATCH_SELECT}
        WHERE pharmacy_product_id = ?1 AND pharmacy_id = ?2
          AND status = 'active' AND quantity > 0
          AND (expiry_date IS NULL OR expiry_date >= ?3)
        ORDER BY expiry_date IS NULL, expiry_date, id"#
    );
    let batches = sqlx::query_as::<_, ProductBatch>(&sql)
        .bind(product_id)
        .bind(pharmacy_id)
        .bind(today)
        .fetch_all(conn)
        .await?;
    Ok(batches)
}

/// Takes `qty` units from a batch.
pub(crate) async fn debit_batch(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    batch_id: i64,
    qty: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE product_batches
        SET quantity = quantity - ?1, updated_at = ?2
        WHERE id = ?3 AND pharmacy_id = ?4 AND status = 'active' AND quantity >= ?1
        "#,
    )
    .bind(qty)
    .bind(now)
    .bind(batch_id)
    .bind(pharmacy_id)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::Inconsistent(format!(
            "batch {} could not give {} units",
            batch_id, qty
        )));
    }
    Ok(())
}

/// Returns `qty` units to a batch, whatever its status.
pub(crate) async fn credit_batch(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    batch_id: i64,
    qty: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE product_batches SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3 AND pharmacy_id = ?4",
    )
    .bind(qty)
    .bind(now)
    .bind(batch_id)
    .bind(pharmacy_id)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::Inconsistent(format!(
            "batch {} referenced by the usage ledger is missing",
            batch_id
        )));
    }
    Ok(())
}

pub(crate) async fn insert_batch(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    product_id: i64,
    quantity: i64,
    expiry: Option<NaiveDate>,
    status: BatchStatus,
    now: DateTime<Utc>,
) -> DbResult<ProductBatch> {
    let batch = sqlx::query_as::<_, ProductBatch>(
        r#"
        INSERT INTO product_batches (
            pharmacy_id, pharmacy_product_id, quantity, expiry_date, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        RETURNING id, pharmacy_id, pharmacy_product_id, quantity, expiry_date, status, created_at, updated_at
        "#,
    )
    .bind(pharmacy_id)
    .bind(product_id)
    .bind(quantity)
    .bind(expiry)
    .bind(status)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(batch)
}

/// Persists quantity, expiry and status of an edited batch.
pub(crate) async fn write_batch(conn: &mut SqliteConnection, batch: &ProductBatch, now: DateTime<Utc>) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE product_batches
        SET quantity = ?1, expiry_date = ?2, status = ?3, updated_at = ?4
        WHERE id = ?5 AND pharmacy_id = ?6
        "#,
    )
    .bind(batch.quantity)
    .bind(batch.expiry_date)
    .bind(batch.status)
    .bind(now)
    .bind(batch.id)
    .bind(batch.pharmacy_id)
    .execute(conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(DbError::not_found("Batch", batch.id));
    }
    Ok(())
}

pub(crate) async fn delete_batch_row(conn: &mut SqliteConnection, pharmacy_id: i64, batch_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM product_batches WHERE id = ?1 AND pharmacy_id = ?2")
        .bind(batch_id)
        .bind(pharmacy_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Flips an active batch past its expiry to `expired`. `false` if it was
/// already handled or is not due.
pub(crate) async fn expire_if_due(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    batch_id: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE product_batches
        SET status = 'expired', updated_at = ?1
        WHERE id = ?2 AND pharmacy_id = ?3 AND status = 'active'
          AND expiry_date IS NOT NULL AND expiry_date < ?4
        "#,
    )
    .bind(now)
    .bind(batch_id)
    .bind(pharmacy_id)
    .bind(today)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Usage Ledger
// =============================================================================

/// A usage row about to be written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UsageRecord<'a> {
    pub sale_id: i64,
    pub sale_item_id: Option<i64>,
    pub pharmacy_id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    pub barcode: &'a str,
    pub qty: i64,
}

pub(crate) async fn record_usage(conn: &mut SqliteConnection, usage: UsageRecord<'_>, now: DateTime<Utc>) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO sale_batch_usages (
            sale_id, sale_item_id, pharmacy_id, pharmacy_product_id, batch_id, barcode, qty, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING id
        "#,
    )
    .bind(usage.sale_id)
    .bind(usage.sale_item_id)
    .bind(usage.pharmacy_id)
    .bind(usage.product_id)
    .bind(usage.batch_id)
    .bind(usage.barcode)
    .bind(usage.qty)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Usage rows of one sale, product and barcode, newest first.
pub(crate) async fn usages_for_reversal(
    conn: &mut SqliteConnection,
    pharmacy_id: i64,
    sale_id: i64,
    product_id: i64,
    barcode: &str,
    sale_item_id: Option<i64>,
) -> DbResult<Vec<SaleBatchUsage>> {
    let sql = format!(
        r#"{USAGE_SELECT}
        WHERE sale_id = ?1 AND pharmacy_id = ?2 AND pharmacy_product_id = ?3 AND barcode = ?4
          AND (?5 IS NULL OR sale_item_id = ?5)
        ORDER BY id DESC"#
    );
    let rows = sqlx::query_as::<_, SaleBatchUsage>(&sql)
        .bind(sale_id)
        .bind(pharmacy_id)
        .bind(product_id)
        .bind(barcode)
        .bind(sale_item_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub(crate) async fn usages_for_sale<'e, E>(exec: E, pharmacy_id: i64, sale_id: i64) -> DbResult<Vec<SaleBatchUsage>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{USAGE_SELECT} WHERE sale_id = ?1 AND pharmacy_id = ?2 ORDER BY id");
    let rows = sqlx::query_as::<_, SaleBatchUsage>(&sql)
        .bind(sale_id)
        .bind(pharmacy_id)
        .fetch_all(exec)
        .await?;
    Ok(rows)
}

pub(crate) async fn shrink_usage(conn: &mut SqliteConnection, step: &ReversalStep) -> DbResult<()> {
    let result = if step.clears_row() {
        sqlx::query("DELETE FROM sale_batch_usages WHERE id = ?1")
            .bind(step.usage_id)
            .execute(conn)
            .await?
    } else {
        sqlx::query("UPDATE sale_batch_usages SET qty = ?1 WHERE id = ?2")
            .bind(step.remaining)
            .bind(step.usage_id)
            .execute(conn)
            .await?
    };

    if result.rows_affected() != 1 {
        return Err(DbError::Inconsistent(format!("usage row {} vanished", step.usage_id)));
    }
    Ok(())
}

pub(crate) async fn usage_count_for_batch(conn: &mut SqliteConnection, batch_id: i64) -> DbResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM sale_batch_usages WHERE batch_id = ?1")
        .bind(batch_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

pub(crate) async fn usage_count_for_sale(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM sale_batch_usages WHERE sale_id = ?1")
        .bind(sale_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
