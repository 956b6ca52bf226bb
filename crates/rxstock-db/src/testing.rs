//! Shared fixture for this crate's tests.
//!
//! One pharmacy with a verified owner, a fixed business date and a
//! recording mailer. Setup helpers write through units of work so the
//! snapshot columns stay consistent with the batches they create.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rxstock_core::allocation::snapshot_of;
use rxstock_core::{BatchStatus, PharmacyContext, PharmacyProduct, PharmacySettings, ProductBatch};
use tempfile::TempDir;

use crate::clock::FixedClock;
use crate::inventory::{ledger, snapshot};
use crate::mailer::RecordingMailer;
use crate::pool::{Database, DbConfig};
use crate::repository::{NewPharmacyProduct, NewUser};
use crate::unit_of_work::UnitOfWork;

pub const OWNER_EMAIL: &str = "owner@pharmacy.test";

pub struct TestDb {
    pub db: Database,
    pub pharmacy_id: i64,
    pub user_id: i64,
    pub mailer: Arc<RecordingMailer>,
    pub today: NaiveDate,
    _dir: Option<TempDir>,
}

impl TestDb {
    /// In-memory database, single connection.
    pub async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Self::setup(db, None).await
    }

    /// File-backed database with several connections, for concurrency tests.
    pub async fn file(max_connections: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("rxstock.db"))
            .max_connections(max_connections)
            .busy_timeout(std::time::Duration::from_secs(10));
        let db = Database::new(config).await.unwrap();
        Self::setup(db, Some(dir)).await
    }

    async fn setup(db: Database, dir: Option<TempDir>) -> Self {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let mailer = Arc::new(RecordingMailer::new());
        let db = db
            .with_clock(Arc::new(FixedClock(today)))
            .with_mailer(mailer.clone());

        let pharmacy_id = db.pharmacies().create("Main Street Pharmacy").await.unwrap();
        let user_id = db
            .pharmacies()
            .add_user(
                pharmacy_id,
                NewUser {
                    username: "owner".to_string(),
                    email: Some(OWNER_EMAIL.to_string()),
                    email_verified: true,
                },
            )
            .await
            .unwrap();

        TestDb {
            db,
            pharmacy_id,
            user_id,
            mailer,
            today,
            _dir: dir,
        }
    }

    pub fn ctx(&self) -> PharmacyContext {
        PharmacyContext::new(self.pharmacy_id, self.user_id)
    }

    /// Opens a unit of work on the fixed business date.
    pub async fn unit(&self) -> UnitOfWork {
        UnitOfWork::begin(self.db.pool(), self.today).await.unwrap()
    }

    /// `today` shifted by `days`.
    pub fn date(&self, days: i64) -> NaiveDate {
        self.today + Duration::days(days)
    }

    pub async fn other_pharmacy(&self) -> i64 {
        self.db.pharmacies().create("Other Pharmacy").await.unwrap()
    }

    pub async fn product(&self, barcode: &str, price_cents: i64) -> PharmacyProduct {
        self.product_in(self.pharmacy_id, barcode, price_cents).await
    }

    pub async fn product_in(&self, pharmacy_id: i64, barcode: &str, price_cents: i64) -> PharmacyProduct {
        self.db
            .products()
            .link(
                pharmacy_id,
                NewPharmacyProduct {
                    barcode: barcode.to_string(),
                    name: format!("Product {barcode}"),
                    price_cents,
                },
            )
            .await
            .unwrap()
    }

    /// Inserts a batch in this pharmacy and recalculates the snapshot.
    pub async fn batch(
        &self,
        product_id: i64,
        quantity: i64,
        expiry: Option<NaiveDate>,
        status: BatchStatus,
    ) -> ProductBatch {
        self.insert_batch(self.pharmacy_id, product_id, quantity, expiry, status)
            .await
    }

    /// Active batch without expiry in another pharmacy.
    pub async fn batch_in(&self, pharmacy_id: i64, product_id: i64, quantity: i64) -> ProductBatch {
        self.insert_batch(pharmacy_id, product_id, quantity, None, BatchStatus::Active)
            .await
    }

    async fn insert_batch(
        &self,
        pharmacy_id: i64,
        product_id: i64,
        quantity: i64,
        expiry: Option<NaiveDate>,
        status: BatchStatus,
    ) -> ProductBatch {
        let mut uow = self.unit().await;
        assert!(uow.lock_product(pharmacy_id, product_id).await.unwrap());
        let now = uow.now();
        let batch = ledger::insert_batch(uow.conn(), pharmacy_id, product_id, quantity, expiry, status, now)
            .await
            .unwrap();
        snapshot::recalc(&mut uow, pharmacy_id, product_id).await.unwrap();
        uow.commit().await.unwrap();
        batch
    }

    /// A sale header with no items, for driving consume/reverse directly.
    pub async fn empty_sale(&self) -> i64 {
        let now = Utc::now();
        sqlx::query_scalar(
            r#"
            INSERT INTO sales (pharmacy_id, user_id, total_cents, created_at, updated_at)
            VALUES (?1, ?2, 0, ?3, ?3)
            RETURNING id
            "#,
        )
        .bind(self.pharmacy_id)
        .bind(self.user_id)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .unwrap()
    }

    pub async fn batch_qty(&self, batch_id: i64) -> i64 {
        sqlx::query_scalar("SELECT quantity FROM product_batches WHERE id = ?1")
            .bind(batch_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }

    pub async fn set_threshold(&self, threshold: i64) {
        let mut settings = self.settings().await;
        settings.low_stock_threshold = threshold;
        self.db.pharmacies().save_settings(&settings).await.unwrap();
    }

    pub async fn enable_email(&self) {
        let mut settings = self.settings().await;
        settings.notify_by_email = true;
        self.db.pharmacies().save_settings(&settings).await.unwrap();
    }

    async fn settings(&self) -> PharmacySettings {
        self.db.pharmacies().settings(self.pharmacy_id).await.unwrap()
    }

    /// The stored snapshot equals the one derived from the batches.
    pub async fn assert_snapshot_consistent(&self, product_id: i64) {
        let product = self
            .db
            .products()
            .get(self.pharmacy_id, product_id)
            .await
            .unwrap()
            .unwrap();
        let batches = self
            .db
            .batches()
            .list_for_product(self.pharmacy_id, product_id)
            .await
            .unwrap();
        let expected = snapshot_of(&batches, self.today);

        assert_eq!(product.quantity, expected.quantity, "snapshot quantity drifted");
        assert_eq!(product.expiry_date, expected.next_expiry, "snapshot expiry drifted");
    }
}
