//! # Notification Repository
//!
//! Dashboard reads over alert rows. Rows are written only by the notifier.

use rxstock_core::Notification;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DbError, DbResult};

const NOTIFICATION_SELECT: &str = r#"
    SELECT id, pharmacy_id, product_id, batch_id, type, message,
           is_read, is_resolved, email_sent, created_at, resolved_at
    FROM notifications
"#;

#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Newest first. `unread_only` hides rows already read.
    pub async fn list(&self, pharmacy_id: i64, unread_only: bool, limit: u32) -> DbResult<Vec<Notification>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(NOTIFICATION_SELECT);
        qb.push(" WHERE pharmacy_id = ").push_bind(pharmacy_id);
        if unread_only {
            qb.push(" AND is_read = 0");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit.max(1));

        let rows = qb.build_query_as::<Notification>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Open alerts, i.e. conditions that still hold.
    pub async fn open(&self, pharmacy_id: i64) -> DbResult<Vec<Notification>> {
        let sql = format!("{NOTIFICATION_SELECT} WHERE pharmacy_id = ?1 AND is_resolved = 0 ORDER BY id");
        let rows = sqlx::query_as::<_, Notification>(&sql)
            .bind(pharmacy_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn mark_read(&self, pharmacy_id: i64, notification_id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1 AND pharmacy_id = ?2")
            .bind(notification_id)
            .bind(pharmacy_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", notification_id));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, pharmacy_id: i64) -> DbResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE pharmacy_id = ?1 AND is_read = 0")
            .bind(pharmacy_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::testing::TestDb;
    use rxstock_core::{NotificationType, StockIntake};

    async fn receive(t: &TestDb, barcode: &str, quantity: i64) {
        t.db.stock()
            .add_stock_by_barcode(
                &t.ctx(),
                StockIntake {
                    barcode: barcode.to_string(),
                    quantity,
                    expiry_date: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_flags() {
        let t = TestDb::new().await;
        t.product("N1", 100).await;
        t.product("N2", 100).await;
        // Below the default threshold of 10: one low-stock alert each
        receive(&t, "N1", 3).await;
        receive(&t, "N2", 4).await;

        let repo = t.db.notifications();
        let all = repo.list(t.pharmacy_id, false, 50).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|n| n.notification_type == NotificationType::LowStock && !n.is_read));

        repo.mark_read(t.pharmacy_id, all[0].id).await.unwrap();
        let unread = repo.list(t.pharmacy_id, true, 50).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, all[1].id);

        assert_eq!(repo.mark_all_read(t.pharmacy_id).await.unwrap(), 1);
        assert!(repo.list(t.pharmacy_id, true, 50).await.unwrap().is_empty());
        // Read is not resolved
        assert_eq!(repo.open(t.pharmacy_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_pharmacy() {
        let t = TestDb::new().await;
        t.product("N1", 100).await;
        receive(&t, "N1", 1).await;
        let id = t.db.notifications().open(t.pharmacy_id).await.unwrap()[0].id;

        let other = t.other_pharmacy().await;
        let err = t.db.notifications().mark_read(other, id).await.unwrap_err();
        assert!(matches!(err, crate::DbError::NotFound { .. }));
        assert!(t.db.notifications().list(other, false, 50).await.unwrap().is_empty());
    }
}
