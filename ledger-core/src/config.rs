//! Configuration management
//!
//! Settings live in `settings.json` inside the ledger directory:
//! ```json
//! {
//!   "store": { "databaseFile": "ledger.duckdb", "poolSize": 8, "lockTimeoutMs": 5000 },
//!   "audit": { "databaseFile": "events.duckdb" }
//! }
//! ```
//! Fields this crate does not manage are preserved on update.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_FILE: &str = "ledger.duckdb";
pub const DEFAULT_AUDIT_FILE: &str = "events.duckdb";
pub const DEFAULT_POOL_SIZE: usize = 8;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    store: StoreSettings,
    #[serde(default)]
    audit: AuditSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pool_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lock_timeout_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database_file: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tuning knobs handed to a store adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Connections kept open by the pool, at least 1
    pub pool_size: usize,
    /// Bound on row lock waits and pool checkouts
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

/// Ledger configuration (resolved view of settings plus environment)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub database_file: String,
    pub audit_database_file: String,
    pub pool_size: usize,
    pub lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            audit_database_file: DEFAULT_AUDIT_FILE.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load config from the ledger directory
    ///
    /// Pool size and lock timeout can be overridden with `LEDGER_POOL_SIZE`
    /// and `LEDGER_LOCK_TIMEOUT_MS` (for CI and load testing).
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        Self::resolve(&read_settings(ledger_dir)?, Overrides::from_env()?)
    }

    /// Change store settings in settings.json and return the stored view
    ///
    /// Only the fields passed are written. Environment overrides are not
    /// consulted, so they never end up in the file.
    pub fn update(
        ledger_dir: &Path,
        pool_size: Option<usize>,
        lock_timeout_ms: Option<u64>,
    ) -> Result<Self> {
        let mut settings = read_settings(ledger_dir)?;
        if let Some(size) = pool_size {
            if size == 0 {
                bail!("poolSize must be at least 1");
            }
            settings.store.pool_size = Some(size);
        }
        if let Some(ms) = lock_timeout_ms {
            settings.store.lock_timeout_ms = Some(ms);
        }

        let stored = Self::resolve(&settings, Overrides::default())?;
        write_settings(ledger_dir, &settings)?;
        Ok(stored)
    }

    fn resolve(raw: &SettingsFile, overrides: Overrides) -> Result<Self> {
        let defaults = Self::default();
        let pool_size = overrides
            .pool_size
            .or(raw.store.pool_size)
            .unwrap_or(defaults.pool_size);

        let config = Self {
            database_file: raw.store.database_file.clone().unwrap_or(defaults.database_file),
            audit_database_file: raw
                .audit
                .database_file
                .clone()
                .unwrap_or(defaults.audit_database_file),
            pool_size: pool_size.max(1),
            lock_timeout_ms: overrides
                .lock_timeout_ms
                .or(raw.store.lock_timeout_ms)
                .unwrap_or(defaults.lock_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            pool_size: self.pool_size.max(1),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            bail!("lockTimeoutMs must be greater than zero");
        }
        if self.database_file.trim().is_empty() || self.audit_database_file.trim().is_empty() {
            bail!("database file names cannot be empty");
        }
        if self.database_file == self.audit_database_file {
            bail!("store and audit log must use different database files");
        }
        Ok(())
    }
}

/// Values from the environment that take precedence over settings.json
#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
    pool_size: Option<usize>,
    lock_timeout_ms: Option<u64>,
}

impl Overrides {
    fn from_env() -> Result<Self> {
        Ok(Self {
            pool_size: env_number("LEDGER_POOL_SIZE")?,
            lock_timeout_ms: env_number("LEDGER_LOCK_TIMEOUT_MS")?,
        })
    }
}

fn read_settings(ledger_dir: &Path) -> Result<SettingsFile> {
    let settings_path = ledger_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("reading {}", settings_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", settings_path.display()))
}

fn write_settings(ledger_dir: &Path, settings: &SettingsFile) -> Result<()> {
    let settings_path = ledger_dir.join("settings.json");
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::create_dir_all(ledger_dir)
        .with_context(|| format!("creating {}", ledger_dir.display()))?;
    std::fs::write(&settings_path, content)
        .with_context(|| format!("writing {}", settings_path.display()))
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", name, value)),
        _ => Ok(None),
    }
}
