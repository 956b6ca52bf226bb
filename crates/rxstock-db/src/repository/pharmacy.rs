//! # Pharmacy Repository
//!
//! Tenants, their alert settings and the users who receive alert emails.
//! Authentication lives outside this crate; users here only carry what the
//! notifier needs (an email address and whether it is verified).

use chrono::Utc;
use rxstock_core::validation::validate_alert_settings;
use rxstock_core::{PharmacySettings, ValidationError};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbResult, InventoryResult};

// =============================================================================
// Shared Queries
// =============================================================================

/// Settings of a pharmacy, or the defaults if it never saved any.
pub(crate) async fn fetch_settings<'e, E>(exec: E, pharmacy_id: i64) -> DbResult<PharmacySettings>
where
    E: Executor<'e, Database = Sqlite>,
{
    let settings = sqlx::query_as::<_, PharmacySettings>(
        r#"
        SELECT pharmacy_id, low_stock_threshold, expiry_alert_days, notify_by_email, notify_by_dashboard
        FROM pharmacy_settings
        WHERE pharmacy_id = ?1
        "#,
    )
    .bind(pharmacy_id)
    .fetch_optional(exec)
    .await?;

    Ok(settings.unwrap_or_else(|| PharmacySettings::defaults_for(pharmacy_id)))
}

/// Verified email addresses of a pharmacy's users.
pub(crate) async fn verified_emails<'e, E>(exec: E, pharmacy_id: i64) -> DbResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let emails = sqlx::query_scalar::<_, String>(
        r#"
        SELECT email FROM users
        WHERE pharmacy_id = ?1 AND email_verified = 1 AND email IS NOT NULL AND email <> ''
        ORDER BY id
        "#,
    )
    .bind(pharmacy_id)
    .fetch_all(exec)
    .await?;
    Ok(emails)
}

// =============================================================================
// Repository
// =============================================================================

/// A user to attach to a pharmacy.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

/// Repository for pharmacies, settings and users.
#[derive(Debug, Clone)]
pub struct PharmacyRepository {
    pool: SqlitePool,
}

impl PharmacyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PharmacyRepository { pool }
    }

    /// Creates a pharmacy and returns its id.
    pub async fn create(&self, name: &str) -> InventoryResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            }
            .into());
        }

        let id: i64 = sqlx::query_scalar("INSERT INTO pharmacies (name, created_at) VALUES (?1, ?2) RETURNING id")
            .bind(name)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        info!(pharmacy_id = id, name, "Pharmacy created");
        Ok(id)
    }

    pub async fn exists(&self, pharmacy_id: i64) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM pharmacies WHERE id = ?1")
            .bind(pharmacy_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Every pharmacy id, ascending. Sweeps iterate this.
    pub async fn ids(&self) -> DbResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM pharmacies ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Current alert settings (defaults if never saved).
    pub async fn settings(&self, pharmacy_id: i64) -> DbResult<PharmacySettings> {
        fetch_settings(&self.pool, pharmacy_id).await
    }

    /// Inserts or replaces a pharmacy's alert settings.
    pub async fn save_settings(&self, settings: &PharmacySettings) -> InventoryResult<()> {
        validate_alert_settings(settings.low_stock_threshold, settings.expiry_alert_days)?;

        sqlx::query(
            r#"
            INSERT INTO pharmacy_settings (
                pharmacy_id, low_stock_threshold, expiry_alert_days,
                notify_by_email, notify_by_dashboard, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(pharmacy_id) DO UPDATE SET
                low_stock_threshold = excluded.low_stock_threshold,
                expiry_alert_days = excluded.expiry_alert_days,
                notify_by_email = excluded.notify_by_email,
                notify_by_dashboard = excluded.notify_by_dashboard,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.pharmacy_id)
        .bind(settings.low_stock_threshold)
        .bind(settings.expiry_alert_days)
        .bind(settings.notify_by_email)
        .bind(settings.notify_by_dashboard)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(pharmacy_id = settings.pharmacy_id, "Alert settings saved");
        Ok(())
    }

    pub async fn add_user(&self, pharmacy_id: i64, user: NewUser) -> InventoryResult<i64> {
        if user.username.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "username".to_string(),
            }
            .into());
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (pharmacy_id, username, email, email_verified, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(pharmacy_id)
        .bind(user.username.trim())
        .bind(user.email.as_deref().map(str::trim))
        .bind(user.email_verified)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Addresses that receive this pharmacy's alert emails.
    pub async fn alert_recipients(&self, pharmacy_id: i64) -> DbResult<Vec<String>> {
        verified_emails(&self.pool, pharmacy_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestDb;

    #[tokio::test]
    async fn test_settings_default_until_saved() {
        let t = TestDb::new().await;
        let repo = t.db.pharmacies();

        let settings = repo.settings(t.pharmacy_id).await.unwrap();
        assert_eq!(settings, PharmacySettings::defaults_for(t.pharmacy_id));

        let custom = PharmacySettings {
            low_stock_threshold: 20,
            expiry_alert_days: 60,
            notify_by_email: true,
            ..settings
        };
        repo.save_settings(&custom).await.unwrap();
        assert_eq!(repo.settings(t.pharmacy_id).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn test_save_settings_rejects_bad_window() {
        let t = TestDb::new().await;
        let settings = PharmacySettings {
            expiry_alert_days: 0,
            ..PharmacySettings::defaults_for(t.pharmacy_id)
        };
        let err = t.db.pharmacies().save_settings(&settings).await.unwrap_err();
        assert_eq!(err.kind(), rxstock_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_only_verified_emails_receive_alerts() {
        let t = TestDb::new().await;
        let repo = t.db.pharmacies();
        let other = t.other_pharmacy().await;

        repo.add_user(t.pharmacy_id, NewUser {
            username: "pending".to_string(),
            email: Some("pending@example.com".to_string()),
            email_verified: false,
        })
        .await
        .unwrap();
        repo.add_user(other, NewUser {
            username: "elsewhere".to_string(),
            email: Some("elsewhere@example.com".to_string()),
            email_verified: true,
        })
        .await
        .unwrap();

        // TestDb already adds one verified owner to its pharmacy.
        let recipients = repo.alert_recipients(t.pharmacy_id).await.unwrap();
        assert_eq!(recipients, vec![crate::testing::OWNER_EMAIL.to_string()]);
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let t = TestDb::new().await;
        assert!(t.db.pharmacies().create("  ").await.is_err());
        let ids = t.db.pharmacies().ids().await.unwrap();
        assert_eq!(ids, vec![t.pharmacy_id]);
    }
}
