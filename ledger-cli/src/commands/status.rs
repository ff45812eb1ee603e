//! Status command - readiness and ledger summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output::{self, emit};

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.status_service.status();
    let db_path = ctx.store.db_path().map(|p| p.display().to_string());

    emit(json, result, |status| {
        println!("{}", "Ledger Status".bold());
        println!();

        let ready = if status.ready { "ready".green() } else { "unavailable".red() };
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec!["Store".to_string(), format!("{} ({})", status.store, ready)]);
        if let Some(path) = &db_path {
            table.add_row(vec!["Database".to_string(), path.clone()]);
        }
        table.add_row(vec!["Accounts".to_string(), status.total_accounts.to_string()]);
        table.add_row(vec![
            "Events".to_string(),
            status
                .total_events
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unavailable".to_string()),
        ]);
        println!("{}", table);

        if let Some(err) = &status.store_error {
            output::error(err);
        }

        if !status.totals.is_empty() {
            println!();
            let mut totals = output::create_table();
            totals.set_header(vec!["Currency", "Accounts", "Total balance"]);
            for total in &status.totals {
                totals.add_row(vec![
                    total.currency.clone(),
                    total.accounts.to_string(),
                    total.balance.to_string(),
                ]);
            }
            println!("{}", totals);
        }
    })
}
