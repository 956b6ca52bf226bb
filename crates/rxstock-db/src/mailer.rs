//! # Alert Mailer
//!
//! Delivery seam for alert emails.
//!
//! ## Delivery Timing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UnitOfWork                                                             │
//! │    ensure alert ──► notification row written, email queued in memory   │
//! │    ...                                                                  │
//! │    commit ─────────► queued emails handed back                          │
//! │                           │                                             │
//! │                           ▼                                             │
//! │  deliver() ──► AlertMailer::send per email, failures logged only        │
//! │                                                                         │
//! │  A rolled-back unit sends nothing. A failed send never undoes stock.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use rxstock_core::alerts::AlertEmail;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Email transport failure.
#[derive(Debug, Error)]
#[error("email delivery failed: {0}")]
pub struct MailError(pub String);

/// An email queued by a unit of work, sent after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmail {
    pub pharmacy_id: i64,
    pub notification_id: i64,
    pub recipients: Vec<String>,
    pub email: AlertEmail,
}

/// Sends templated alert emails.
#[async_trait]
pub trait AlertMailer: Send + Sync + std::fmt::Debug {
    async fn send(&self, recipients: &[String], email: &AlertEmail) -> Result<(), MailError>;
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl AlertMailer for LogMailer {
    async fn send(&self, recipients: &[String], email: &AlertEmail) -> Result<(), MailError> {
        info!(
            template = email.template.name(),
            recipients = recipients.len(),
            subject = %email.subject(),
            "Alert email"
        );
        Ok(())
    }
}

/// Keeps every email in memory.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(Vec<String>, AlertEmail)>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        RecordingMailer::default()
    }

    /// Emails sent so far.
    pub fn sent(&self) -> Vec<(Vec<String>, AlertEmail)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertMailer for RecordingMailer {
    async fn send(&self, recipients: &[String], email: &AlertEmail) -> Result<(), MailError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError("recording mailer poisoned".to_string()))?;
        sent.push((recipients.to_vec(), email.clone()));
        Ok(())
    }
}

/// Sends committed emails. Failures are logged and swallowed.
pub async fn deliver(mailer: &dyn AlertMailer, pending: Vec<PendingEmail>) {
    for item in pending {
        if item.recipients.is_empty() {
            continue;
        }
        if let Err(e) = mailer.send(&item.recipients, &item.email).await {
            warn!(
                pharmacy_id = item.pharmacy_id,
                notification_id = item.notification_id,
                template = item.email.template.name(),
                error = %e,
                "Alert email not delivered"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingMailer;

    #[async_trait]
    impl AlertMailer for FailingMailer {
        async fn send(&self, _: &[String], _: &AlertEmail) -> Result<(), MailError> {
            Err(MailError("smtp down".to_string()))
        }
    }

    fn pending(recipients: Vec<String>) -> PendingEmail {
        PendingEmail {
            pharmacy_id: 1,
            notification_id: 1,
            recipients,
            email: AlertEmail::stock("Ibuprofen", "IBU", 2, 10),
        }
    }

    #[tokio::test]
    async fn test_deliver_skips_empty_recipient_lists() {
        let mailer = RecordingMailer::new();
        deliver(
            &mailer,
            vec![pending(vec![]), pending(vec!["owner@example.com".to_string()])],
        )
        .await;

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec!["owner@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        deliver(&FailingMailer, vec![pending(vec!["a@example.com".to_string()])]).await;
    }
}
