//! # Unit of Work
//!
//! One database transaction per inventory operation.
//!
//! ## Locking on SQLite
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN (deferred)                                                       │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  first statement is a "touch" UPDATE on the row being worked on        │
//! │    (sale header, or product row)                                        │
//! │    │   → takes the database write lock before any quantity is read     │
//! │    │   → a second writer waits here (busy_timeout), then reads the     │
//! │    │     first writer's committed stock                                │
//! │    ▼                                                                    │
//! │  lock order: sale → products (ascending id) → batches                  │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  reads, FEFO/LIFO writes, snapshot, notifications, queued emails       │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  COMMIT ──► queued emails returned for delivery                        │
//! │                                                                         │
//! │  Dropped without commit ──► ROLLBACK, emails discarded                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Never read stock through the pool while a unit is open: with an in-memory
//! database the unit holds the only connection.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::mailer::PendingEmail;

/// An open inventory transaction.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    today: NaiveDate,
    now: DateTime<Utc>,
    locked_products: BTreeSet<i64>,
    outbox: Vec<PendingEmail>,
}

impl UnitOfWork {
    /// Begins a transaction. Nothing is locked until the first `lock_*` call.
    pub async fn begin(pool: &SqlitePool, today: NaiveDate) -> DbResult<Self> {
        let tx = pool.begin().await?;
        Ok(UnitOfWork {
            tx,
            today,
            now: Utc::now(),
            locked_products: BTreeSet::new(),
            outbox: Vec::new(),
        })
    }

    /// Connection for statements inside this unit.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Business date every rule in this unit uses.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Timestamp written to rows touched by this unit.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Locks a sale header. `false` if it does not belong to the pharmacy.
    pub async fn lock_sale(&mut self, pharmacy_id: i64, sale_id: i64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE sales SET updated_at = updated_at WHERE id = ?1 AND pharmacy_id = ?2")
            .bind(sale_id)
            .bind(pharmacy_id)
            .execute(&mut *self.tx)
            .await?;

        debug!(sale_id, pharmacy_id, "Sale locked");
        Ok(result.rows_affected() == 1)
    }

    /// Locks a product row. Idempotent within the unit.
    ///
    /// `false` if the product does not belong to the pharmacy.
    pub async fn lock_product(&mut self, pharmacy_id: i64, product_id: i64) -> DbResult<bool> {
        if self.locked_products.contains(&product_id) {
            return Ok(true);
        }

        let result = sqlx::query(
            "UPDATE pharmacy_products SET updated_at = updated_at WHERE id = ?1 AND pharmacy_id = ?2",
        )
        .bind(product_id)
        .bind(pharmacy_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            self.locked_products.insert(product_id);
            debug!(product_id, pharmacy_id, "Product locked");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Locks several products in ascending id order.
    ///
    /// Fails with `NotFound` on the first product outside the pharmacy.
    pub async fn lock_products(&mut self, pharmacy_id: i64, product_ids: impl IntoIterator<Item = i64>) -> DbResult<()> {
        let ordered: BTreeSet<i64> = product_ids.into_iter().collect();
        for product_id in ordered {
            if !self.lock_product(pharmacy_id, product_id).await? {
                return Err(DbError::not_found("Product", product_id));
            }
        }
        Ok(())
    }

    /// Locks a batch row. Its product must already be locked.
    pub async fn lock_batch(&mut self, pharmacy_id: i64, batch_id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE product_batches SET updated_at = updated_at WHERE id = ?1 AND pharmacy_id = ?2",
        )
        .bind(batch_id)
        .bind(pharmacy_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub fn is_product_locked(&self, product_id: i64) -> bool {
        self.locked_products.contains(&product_id)
    }

    /// Queues an email for delivery after commit.
    pub fn queue_email(&mut self, email: PendingEmail) {
        self.outbox.push(email);
    }

    /// Commits and hands back the queued emails.
    pub async fn commit(self) -> DbResult<Vec<PendingEmail>> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(self.outbox)
    }
}
