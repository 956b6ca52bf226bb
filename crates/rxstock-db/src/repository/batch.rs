//! # Batch Repository
//!
//! Read access to product batches. Every batch write goes through
//! [`StockService`](crate::service::StockService) so the snapshot stays
//! consistent.

use rxstock_core::ProductBatch;
use sqlx::SqlitePool;

use crate::error::DbResult;
use crate::inventory::ledger;

#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    pub async fn get(&self, pharmacy_id: i64, batch_id: i64) -> DbResult<Option<ProductBatch>> {
        ledger::batch_by_id(&self.pool, pharmacy_id, batch_id).await
    }

    /// Every batch of a product, any status, oldest first.
    pub async fn list_for_product(&self, pharmacy_id: i64, product_id: i64) -> DbResult<Vec<ProductBatch>> {
        ledger::batches_for_product(&self.pool, pharmacy_id, product_id).await
    }
}
