//! Sweep configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then validated.
//!
//! ```toml
//! database_path = "/var/lib/rxstock/rxstock.db"
//! max_connections = 4
//! acquire_timeout_secs = 10
//! allow_hard_delete_with_stock = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rxstock_db::{DbConfig, InventoryPolicy};

pub const ENV_CONFIG: &str = "RXSTOCK_CONFIG";
pub const ENV_DATABASE_PATH: &str = "RXSTOCK_DATABASE_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "RXSTOCK_MAX_CONNECTIONS";
pub const ENV_ACQUIRE_TIMEOUT_SECS: &str = "RXSTOCK_ACQUIRE_TIMEOUT_SECS";
pub const ENV_ALLOW_HARD_DELETE: &str = "RXSTOCK_ALLOW_HARD_DELETE_WITH_STOCK";

/// Sweep runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Inventory policy shared with the API process
    pub allow_hard_delete_with_stock: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            database_path: PathBuf::from("./rxstock.db"),
            max_connections: 2,
            acquire_timeout_secs: 10,
            allow_hard_delete_with_stock: false,
        }
    }
}

impl SweepConfig {
    /// Loads the file at `path` (if any), applies environment overrides and
    /// validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => SweepConfig::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies overrides from `lookup`, normally the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = parse(ENV_MAX_CONNECTIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ACQUIRE_TIMEOUT_SECS) {
            self.acquire_timeout_secs = parse(ENV_ACQUIRE_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ALLOW_HARD_DELETE) {
            self.allow_hard_delete_with_stock = parse(ENV_ALLOW_HARD_DELETE, &raw)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("database_path".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections".to_string()));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("acquire_timeout_secs".to_string()));
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }

    pub fn policy(&self) -> InventoryPolicy {
        InventoryPolicy {
            allow_hard_delete_with_stock: self.allow_hard_delete_with_stock,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

// =============================================================================
// Unit Tests
// =============================================================================
