//! # RxStock Sweep
//!
//! One sweep pass over every pharmacy, then exit.
//!
//! ## Usage
//! ```bash
//! rxstock-sweep                          # defaults + RXSTOCK_* env
//! rxstock-sweep --config /etc/rxstock/sweep.toml
//! RUST_LOG=rxstock_db=debug rxstock-sweep
//! ```
//!
//! ## Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. sweep_expired()              flip past-expiry batches, recalc       │
//! │  2. for each pharmacy:                                                  │
//! │       sweep_near_expiry(id)      one-shot expiry warnings               │
//! │       evaluate_low_stock(id)     open/resolve stock alerts              │
//! │  3. JSON summary on stdout, exit code 1 if any product failed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step is idempotent, so a rerun after a partial failure is safe.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rxstock_db::{Database, ExpirySweepReport, LowStockReport, NearExpiryReport};

use crate::config::{SweepConfig, ENV_CONFIG};

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    expired: ExpirySweepReport,
    near_expiry: Vec<NearExpiryReport>,
    low_stock: Vec<LowStockReport>,
    failed_pharmacies: Vec<i64>,
}

impl RunSummary {
    fn has_failures(&self) -> bool {
        self.expired.failures > 0
            || !self.failed_pharmacies.is_empty()
            || self.near_expiry.iter().any(|r| r.failures > 0)
            || self.low_stock.iter().any(|r| r.failures > 0)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = config_path_from_args().or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
    let config = SweepConfig::load(config_path.as_deref()).context("loading sweep configuration")?;
    info!(
        path = %config.database_path.display(),
        max_connections = config.max_connections,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("opening database")?
        .with_policy(config.policy());

    let summary = run(&db).await?;
    db.close().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.has_failures() {
        anyhow::bail!("sweep finished with failures");
    }
    info!("Sweep complete");
    Ok(())
}

async fn run(db: &Database) -> anyhow::Result<RunSummary> {
    let sweeps = db.sweeps();
    let mut summary = RunSummary {
        expired: sweeps.sweep_expired().await.context("expiry sweep")?,
        ..RunSummary::default()
    };
    info!(
        batches_expired = summary.expired.batches_expired,
        alerts_opened = summary.expired.alerts_opened,
        "Expiry sweep done"
    );

    let pharmacies = db.pharmacies().ids().await.context("listing pharmacies")?;
    for pharmacy_id in pharmacies {
        match sweeps.sweep_near_expiry(pharmacy_id).await {
            Ok(report) => summary.near_expiry.push(report),
            Err(e) => {
                error!(pharmacy_id, error = %e, "Near-expiry sweep failed");
                summary.failed_pharmacies.push(pharmacy_id);
                continue;
            }
        }

        match sweeps.evaluate_low_stock(pharmacy_id).await {
            Ok(report) => {
                if report.failures > 0 {
                    warn!(pharmacy_id, failures = report.failures, "Low-stock evaluation incomplete");
                }
                summary.low_stock.push(report);
            }
            Err(e) => {
                error!(pharmacy_id, error = %e, "Low-stock evaluation failed");
                summary.failed_pharmacies.push(pharmacy_id);
            }
        }
    }

    Ok(summary)
}

/// Logging from `RUST_LOG`, default INFO with sqlx quieted.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// `--config <PATH>` or `-c <PATH>`.
fn config_path_from_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxstock_db::DbConfig;

    #[tokio::test]
    async fn test_run_on_empty_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.pharmacies().create("Corner Pharmacy").await.unwrap();

        let summary = run(&db).await.unwrap();
        assert_eq!(summary.expired, ExpirySweepReport::default());
        assert_eq!(summary.near_expiry.len(), 1);
        assert_eq!(summary.low_stock.len(), 1);
        assert!(!summary.has_failures());
    }
}
