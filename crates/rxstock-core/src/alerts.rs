//! # Alert Rules
//!
//! Pure decision logic behind low-stock, out-of-stock and expiry alerts.
//! The database layer turns these decisions into idempotent notification
//! rows and queued emails.
//!
//! ## Stock Level State Machine
//! ```text
//! threshold = 20, buffer = max(1, ceil(20 × 10%)) = 2, resolve at ≥ 22
//!
//!   qty            out_of_stock        low_stock
//!   ───────────    ────────────        ─────────────────
//!   0              open                resolve
//!   1 ..= 20       resolve             open
//!   21             resolve             (unchanged: band)
//!   22 and up      resolve             resolve
//! ```
//!
//! The band between `threshold` and `threshold + buffer` keeps an alert from
//! flapping when stock hovers around the threshold.
//!
//! ## Expiry Classification
//! ```text
//!   expiry < today                     → expired
//!   0 ..= 7 days left                  → near_expiry_7d
//!   8 ..= expiry_alert_days days left  → near_expiry_initial
//!   otherwise                          → nothing
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::NotificationType;

/// Days before expiry at which the urgent reminder fires.
pub const NEAR_EXPIRY_URGENT_DAYS: i64 = 7;

// =============================================================================
// Stock Levels
// =============================================================================

/// Hysteresis buffer above the threshold: `max(1, ceil(threshold × 10%))`.
pub fn hysteresis_buffer(threshold: i64) -> i64 {
    ((threshold.max(0) + 9) / 10).max(1)
}

/// Quantity at or above which an open low-stock alert resolves.
pub fn resolve_level(threshold: i64) -> i64 {
    threshold + hysteresis_buffer(threshold)
}

/// A change the notifier should make for one alert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAlertAction {
    /// Ensure an unresolved alert exists (insert, keep, or reopen).
    Open(NotificationType),
    /// Resolve the alert if one is open.
    Resolve(NotificationType),
}

/// Decides stock-level alert actions for a product.
///
/// Out-of-stock is always settled before low-stock so the two are never open
/// together.
pub fn stock_level_actions(quantity: i64, threshold: i64) -> Vec<StockAlertAction> {
    use NotificationType::{LowStock, OutOfStock};
    use StockAlertAction::{Open, Resolve};

    if quantity <= 0 {
        return vec![Resolve(LowStock), Open(OutOfStock)];
    }

    let mut actions = vec![Resolve(OutOfStock)];
    if quantity <= threshold {
        actions.push(Open(LowStock));
    } else if quantity >= resolve_level(threshold) {
        actions.push(Resolve(LowStock));
    }
    actions
}

// =============================================================================
// Expiry
// =============================================================================

/// Whole days from `today` until `expiry`. Negative once expired.
pub fn days_until(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Classifies a batch expiry against the pharmacy's alert window.
pub fn expiry_alert_for(expiry: NaiveDate, today: NaiveDate, alert_days: i64) -> Option<NotificationType> {
    let days = days_until(expiry, today);
    if days < 0 {
        Some(NotificationType::Expired)
    } else if days <= NEAR_EXPIRY_URGENT_DAYS {
        Some(NotificationType::NearExpiry7d)
    } else if days <= alert_days {
        Some(NotificationType::NearExpiryInitial)
    } else {
        None
    }
}

// =============================================================================
// Messages
// =============================================================================

pub fn low_stock_message(name: &str, barcode: &str, quantity: i64, threshold: i64) -> String {
    format!(
        "Low stock: {} ({}) has {} units left, threshold is {}",
        name, barcode, quantity, threshold
    )
}

pub fn out_of_stock_message(name: &str, barcode: &str) -> String {
    format!("Out of stock: {} ({}) has no saleable units", name, barcode)
}

pub fn expiry_message(
    kind: NotificationType,
    name: &str,
    barcode: &str,
    batch_id: i64,
    expiry: NaiveDate,
    today: NaiveDate,
) -> String {
    let days = days_until(expiry, today);
    match kind {
        NotificationType::Expired => format!(
            "Expired: batch {} of {} ({}) expired on {}",
            batch_id, name, barcode, expiry
        ),
        _ => format!(
            "Expiring soon: batch {} of {} ({}) expires on {} ({} days left)",
            batch_id, name, barcode, expiry, days
        ),
    }
}

// =============================================================================
// Email Requests
// =============================================================================

/// Email templates the mailer knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum EmailTemplate {
    /// Args: product name, barcode, current stock, threshold.
    #[serde(rename = "lowStockAlert")]
    LowStockAlert,
    /// Args: product name, barcode, expiry date, days until expiry.
    #[serde(rename = "expiryAlert")]
    ExpiryAlert,
}

impl EmailTemplate {
    pub const fn name(&self) -> &'static str {
        match self {
            EmailTemplate::LowStockAlert => "lowStockAlert",
            EmailTemplate::ExpiryAlert => "expiryAlert",
        }
    }
}

/// A templated email waiting for delivery: `(template_name, args[])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertEmail {
    pub template: EmailTemplate,
    pub args: Vec<String>,
}

impl AlertEmail {
    pub fn stock(name: &str, barcode: &str, quantity: i64, threshold: i64) -> Self {
        AlertEmail {
            template: EmailTemplate::LowStockAlert,
            args: vec![
                name.to_string(),
                barcode.to_string(),
                quantity.to_string(),
                threshold.to_string(),
            ],
        }
    }

    pub fn expiry(name: &str, barcode: &str, expiry: NaiveDate, today: NaiveDate) -> Self {
        AlertEmail {
            template: EmailTemplate::ExpiryAlert,
            args: vec![
                name.to_string(),
                barcode.to_string(),
                expiry.to_string(),
                days_until(expiry, today).to_string(),
            ],
        }
    }

    fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn subject(&self) -> String {
        match self.template {
            EmailTemplate::LowStockAlert => format!("Low stock alert: {}", self.arg(0)),
            EmailTemplate::ExpiryAlert => format!("Expiry alert: {}", self.arg(0)),
        }
    }

    pub fn body(&self) -> String {
        match self.template {
            EmailTemplate::LowStockAlert => format!(
                "{} (barcode {}) is down to {} units. Your alert threshold is {}.",
                self.arg(0),
                self.arg(1),
                self.arg(2),
                self.arg(3)
            ),
            EmailTemplate::ExpiryAlert => format!(
                "{} (barcode {}) has stock expiring on {} ({} days).",
                self.arg(0),
                self.arg(1),
                self.arg(2),
                self.arg(3)
            ),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
