//! # Alert Notifier
//!
//! Turns alert decisions from `rxstock_core::alerts` into notification rows
//! and queued emails, inside the caller's unit of work.
//!
//! ## Ensure Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key = (pharmacy, product, batch, type)                                 │
//! │                                                                         │
//! │  newest row for key          action               email                 │
//! │  ──────────────────          ──────               ─────                 │
//! │  none                        INSERT               yes                   │
//! │  unresolved                  leave as is          no                    │
//! │  resolved                    reopen, new message  yes                   │
//! │                                                                         │
//! │  Expiry alerts are one-shot: any row for the key, resolved or not,     │
//! │  suppresses a new one.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Emails go out only when the pharmacy has `notify_by_email` set, and only
//! to users with a verified address. They are queued on the unit of work and
//! sent after commit.
//!
//! Settings are read on every evaluation, never cached.

use rxstock_core::alerts::{
    expiry_message, low_stock_message, out_of_stock_message, stock_level_actions, AlertEmail, StockAlertAction,
};
use rxstock_core::{NotificationType, PharmacyProduct, PharmacySettings, ProductBatch};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::mailer::PendingEmail;
use crate::repository::{pharmacy, product};
use crate::unit_of_work::UnitOfWork;

/// `batch_id` used by product-level alerts.
pub const PRODUCT_LEVEL: i64 = 0;

/// Identity of an alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertKey {
    pub pharmacy_id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    pub kind: NotificationType,
}

/// What `ensure_open` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Inserted,
    Reopened,
    AlreadyOpen,
}

impl EnsureOutcome {
    /// `true` when the alert is new to the pharmacy and should be emailed.
    pub const fn is_new(&self) -> bool {
        !matches!(self, EnsureOutcome::AlreadyOpen)
    }
}

/// Result of evaluating one product's stock level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockLevelCheck {
    pub quantity: i64,
    pub opened: Vec<NotificationType>,
    pub resolved: Vec<NotificationType>,
}

// =============================================================================
// Stock Level
// =============================================================================

/// Evaluates low-stock and out-of-stock alerts for one product against its
/// current snapshot.
pub async fn check_stock_level(uow: &mut UnitOfWork, pharmacy_id: i64, product_id: i64) -> DbResult<StockLevelCheck> {
    let settings = pharmacy::fetch_settings(uow.conn(), pharmacy_id).await?;
    let product = product::fetch_by_id(uow.conn(), pharmacy_id, product_id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))?;

    let mut check = StockLevelCheck {
        quantity: product.quantity,
        ..StockLevelCheck::default()
    };

    for action in stock_level_actions(product.quantity, settings.low_stock_threshold) {
        match action {
            StockAlertAction::Open(kind) => {
                let key = AlertKey {
                    pharmacy_id,
                    product_id,
                    batch_id: PRODUCT_LEVEL,
                    kind,
                };
                let message = match kind {
                    NotificationType::OutOfStock => out_of_stock_message(&product.name, &product.barcode),
                    _ => low_stock_message(
                        &product.name,
                        &product.barcode,
                        product.quantity,
                        settings.low_stock_threshold,
                    ),
                };
                let email = AlertEmail::stock(
                    &product.name,
                    &product.barcode,
                    product.quantity,
                    settings.low_stock_threshold,
                );
                if ensure_open(uow, &settings, key, &message, email).await?.is_new() {
                    check.opened.push(kind);
                }
            }
            StockAlertAction::Resolve(kind) => {
                if resolve(uow, pharmacy_id, product_id, PRODUCT_LEVEL, kind).await? {
                    check.resolved.push(kind);
                }
            }
        }
    }

    if !check.opened.is_empty() || !check.resolved.is_empty() {
        debug!(
            pharmacy_id,
            product_id,
            quantity = check.quantity,
            opened = ?check.opened,
            resolved = ?check.resolved,
            "Stock alerts updated"
        );
    }
    Ok(check)
}

// =============================================================================
// Expiry
// =============================================================================

/// Records a one-shot expiry alert for a batch.
///
/// ## Returns
/// * `Ok(true)` - a new alert row was written
/// * `Ok(false)` - this batch already had an alert of this kind
pub async fn record_expiry_alert(
    uow: &mut UnitOfWork,
    settings: &PharmacySettings,
    product: &PharmacyProduct,
    batch: &ProductBatch,
    kind: NotificationType,
) -> DbResult<bool> {
    let Some(expiry) = batch.expiry_date else {
        return Ok(false);
    };

    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM notifications
        WHERE pharmacy_id = ?1 AND product_id = ?2 AND batch_id = ?3 AND type = ?4
        LIMIT 1
        "#,
    )
    .bind(batch.pharmacy_id)
    .bind(product.id)
    .bind(batch.id)
    .bind(kind)
    .fetch_optional(uow.conn())
    .await?;

    if existing.is_some() {
        return Ok(false);
    }

    let today = uow.today();
    let key = AlertKey {
        pharmacy_id: batch.pharmacy_id,
        product_id: product.id,
        batch_id: batch.id,
        kind,
    };
    let message = expiry_message(kind, &product.name, &product.barcode, batch.id, expiry, today);
    let id = insert(uow, key, &message).await?;
    queue_if_enabled(uow, settings, id, AlertEmail::expiry(&product.name, &product.barcode, expiry, today)).await?;

    info!(
        pharmacy_id = batch.pharmacy_id,
        batch_id = batch.id,
        kind = %kind,
        "Expiry alert recorded"
    );
    Ok(true)
}

/// Resolves open expiry alerts of a batch that left the saleable pool.
///
/// `keep` survives, so a batch flipped to `expired` keeps its `expired`
/// alert while its near-expiry reminders close.
pub async fn resolve_batch_alerts(
    uow: &mut UnitOfWork,
    pharmacy_id: i64,
    batch_id: i64,
    keep: Option<NotificationType>,
) -> DbResult<u64> {
    let now = uow.now();
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_resolved = 1, resolved_at = ?1
        WHERE pharmacy_id = ?2 AND batch_id = ?3 AND is_resolved = 0
          AND (?4 IS NULL OR type <> ?4)
        "#,
    )
    .bind(now)
    .bind(pharmacy_id)
    .bind(batch_id)
    .bind(keep)
    .execute(uow.conn())
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Row State Machine
// =============================================================================

/// Inserts, keeps or reopens the alert for `key`.
pub async fn ensure_open(
    uow: &mut UnitOfWork,
    settings: &PharmacySettings,
    key: AlertKey,
    message: &str,
    email: AlertEmail,
) -> DbResult<EnsureOutcome> {
    // Unresolved rows sort first; among resolved ones the newest wins.
    let newest: Option<(i64, bool)> = sqlx::query_as(
        r#"
        SELECT id, is_resolved FROM notifications
        WHERE pharmacy_id = ?1 AND product_id = ?2 AND batch_id = ?3 AND type = ?4
        ORDER BY is_resolved ASC, id DESC
        LIMIT 1
        "#,
    )
    .bind(key.pharmacy_id)
    .bind(key.product_id)
    .bind(key.batch_id)
    .bind(key.kind)
    .fetch_optional(uow.conn())
    .await?;

    let (id, outcome) = match newest {
        Some((_, false)) => return Ok(EnsureOutcome::AlreadyOpen),
        Some((id, true)) => {
            sqlx::query(
                r#"
                UPDATE notifications
                SET is_resolved = 0, resolved_at = NULL, is_read = 0, email_sent = 0, message = ?1
                WHERE id = ?2
                "#,
            )
            .bind(message)
            .bind(id)
            .execute(uow.conn())
            .await?;
            (id, EnsureOutcome::Reopened)
        }
        None => (insert(uow, key, message).await?, EnsureOutcome::Inserted),
    };

    queue_if_enabled(uow, settings, id, email).await?;

    debug!(
        pharmacy_id = key.pharmacy_id,
        product_id = key.product_id,
        batch_id = key.batch_id,
        kind = %key.kind,
        outcome = ?outcome,
        "Alert opened"
    );
    Ok(outcome)
}

/// Resolves the open alert for a key. `false` if none was open.
pub async fn resolve(
    uow: &mut UnitOfWork,
    pharmacy_id: i64,
    product_id: i64,
    batch_id: i64,
    kind: NotificationType,
) -> DbResult<bool> {
    let now = uow.now();
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_resolved = 1, resolved_at = ?1
        WHERE pharmacy_id = ?2 AND product_id = ?3 AND batch_id = ?4 AND type = ?5 AND is_resolved = 0
        "#,
    )
    .bind(now)
    .bind(pharmacy_id)
    .bind(product_id)
    .bind(batch_id)
    .bind(kind)
    .execute(uow.conn())
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert(uow: &mut UnitOfWork, key: AlertKey, message: &str) -> DbResult<i64> {
    let now = uow.now();
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO notifications (
            pharmacy_id, product_id, batch_id, type, message,
            is_read, is_resolved, email_sent, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6)
        RETURNING id
        "#,
    )
    .bind(key.pharmacy_id)
    .bind(key.product_id)
    .bind(key.batch_id)
    .bind(key.kind)
    .bind(message)
    .bind(now)
    .fetch_one(uow.conn())
    .await?;
    Ok(id)
}

/// Queues the email and flags the row, if the pharmacy wants emails and has
/// someone verified to send them to.
async fn queue_if_enabled(
    uow: &mut UnitOfWork,
    settings: &PharmacySettings,
    notification_id: i64,
    email: AlertEmail,
) -> DbResult<()> {
    if !settings.notify_by_email {
        return Ok(());
    }

    let recipients = pharmacy::verified_emails(uow.conn(), settings.pharmacy_id).await?;
    if recipients.is_empty() {
        return Ok(());
    }

    sqlx::query("UPDATE notifications SET email_sent = 1 WHERE id = ?1")
        .bind(notification_id)
        .execute(uow.conn())
        .await?;

    uow.queue_email(PendingEmail {
        pharmacy_id: settings.pharmacy_id,
        notification_id,
        recipients,
        email,
    });
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
