//! Config command - show and change settings.json

use anyhow::{bail, Result};
use clap::Subcommand;

use super::get_ledger_dir;
use crate::output;
use ledger_core::config::Config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change store settings
    Set {
        /// Connections kept in the pool
        #[arg(long)]
        pool_size: Option<usize>,
        /// Maximum wait for a row lock or a pooled connection
        #[arg(long)]
        lock_timeout_ms: Option<u64>,
    },
}

pub fn run(command: ConfigCommands) -> Result<()> {
    let ledger_dir = get_ledger_dir()?;

    match command {
        ConfigCommands::Show { json } => {
            let config = Config::load(&ledger_dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }
            let mut table = output::create_table();
            table.add_row(vec!["Directory".to_string(), ledger_dir.display().to_string()]);
            table.add_row(vec!["Database".to_string(), config.database_file.clone()]);
            table.add_row(vec!["Audit database".to_string(), config.audit_database_file.clone()]);
            table.add_row(vec!["Pool size".to_string(), config.pool_size.to_string()]);
            table.add_row(vec!["Lock timeout".to_string(), format!("{} ms", config.lock_timeout_ms)]);
            println!("{}", table);
            Ok(())
        }
        ConfigCommands::Set { pool_size, lock_timeout_ms } => {
            if pool_size.is_none() && lock_timeout_ms.is_none() {
                bail!("nothing to change; pass --pool-size or --lock-timeout-ms");
            }
            let stored = Config::update(&ledger_dir, pool_size, lock_timeout_ms)?;
            output::success(&format!(
                "Configuration saved (pool size {}, lock timeout {} ms)",
                stored.pool_size, stored.lock_timeout_ms
            ));
            if std::env::var("LEDGER_POOL_SIZE").is_ok() || std::env::var("LEDGER_LOCK_TIMEOUT_MS").is_ok() {
                output::warning("Environment overrides are set and still take precedence over settings.json");
            }
            Ok(())
        }
    }
}
