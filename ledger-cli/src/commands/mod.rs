//! CLI command implementations

pub mod account;
pub mod config;
pub mod events;
pub mod funds;
pub mod reconcile;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ledger_core::{Error, LedgerContext};

/// Install the tracing subscriber
///
/// `RUST_LOG` wins; otherwise `--verbose` selects debug output and the
/// default only shows warnings.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "info,ledger_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the ledger directory from environment or default
pub fn get_ledger_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("LEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".ledger"))
        .context("Could not find home directory; set LEDGER_DIR")
}

/// Open the ledger context
pub fn get_context() -> Result<LedgerContext> {
    let ledger_dir = get_ledger_dir()?;
    debug!(dir = %ledger_dir.display(), "opening ledger");
    LedgerContext::new(&ledger_dir).context("Failed to initialize ledger context")
}

/// Parse a decimal amount exactly as typed
pub fn parse_amount(raw: &str) -> ledger_core::domain::result::Result<Decimal> {
    Decimal::from_str_exact(raw.trim())
        .map_err(|_| Error::invalid_amount(format!("'{}' is not a decimal amount", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.50").unwrap(), Decimal::new(1250, 2));
        assert_eq!(parse_amount(" 3 ").unwrap(), Decimal::new(3, 0));
        assert!(matches!(parse_amount("ten"), Err(Error::InvalidAmount(_))));
        assert!(matches!(parse_amount(""), Err(Error::InvalidAmount(_))));
    }
}
