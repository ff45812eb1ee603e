//! Output formatting utilities

use std::fmt;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;

use ledger_core::{Error, OperationResult};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Marker for failures whose details were already written to stdout
#[derive(Debug)]
pub struct AlreadyReported;

impl fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation failed")
    }
}

impl std::error::Error for AlreadyReported {}

/// Print a core result either as a JSON envelope or through `render`
///
/// In JSON mode failures are printed as part of the envelope and surface as
/// [`AlreadyReported`] so the caller only sets the exit code.
pub fn emit<T: Serialize>(
    json: bool,
    result: ledger_core::domain::result::Result<T>,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if json {
        let mut envelope = OperationResult::from(result);
        if envelope.retryable {
            envelope = envelope.with_context("hint", serde_json::json!("nothing was applied; safe to retry"));
        }
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return if envelope.success {
            Ok(())
        } else {
            Err(AlreadyReported.into())
        };
    }

    match result {
        Ok(value) => {
            render(&value);
            Ok(())
        }
        Err(e) => Err(describe(e)),
    }
}

/// Attach an operator hint to transient failures
fn describe(e: Error) -> anyhow::Error {
    if e.is_retryable() {
        anyhow::Error::new(e).context("transient failure, nothing was applied; safe to retry")
    } else {
        e.into()
    }
}
