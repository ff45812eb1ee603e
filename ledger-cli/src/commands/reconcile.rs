//! Reconcile command - compare balances against the audit trail

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output::{self, emit, AlreadyReported};

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.reconcile_service.run();
    let clean = result.as_ref().map(|r| r.is_clean()).unwrap_or(true);

    emit(json, result, |report| {
        println!(
            "Checked {} account(s) against {} event(s)",
            report.accounts_checked, report.events_replayed
        );
        if report.is_clean() {
            output::success("All balances match the audit trail");
            return;
        }

        let mut table = output::create_table();
        table.set_header(vec!["Account", "Expected", "Actual", "History"]);
        for d in &report.discrepancies {
            table.add_row(vec![
                d.account_id.to_string(),
                d.expected.to_string(),
                d.actual.map(|a| a.to_string()).unwrap_or_else(|| "missing".to_string()),
                if d.history_complete { "complete" } else { "incomplete" }.to_string(),
            ]);
        }
        println!("{}", table);
        println!(
            "{}",
            format!("{} discrepancy(ies) found", report.discrepancies.len()).red()
        );
    })?;

    // a dirty ledger is a failed check
    if clean {
        Ok(())
    } else {
        Err(AlreadyReported.into())
    }
}
