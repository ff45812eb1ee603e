//! Events command - browse the audit trail

use anyhow::Result;

use super::get_context;
use crate::output::{self, emit};
use ledger_core::ports::EventLog;
use ledger_core::{AccountId, LedgerEvent, LedgerEventKind};

pub fn run(account: Option<AccountId>, limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = match account {
        Some(id) => ctx.events.for_account(id, limit),
        None => ctx.events.recent(limit),
    };

    emit(json, result, |events| print_events(events))
}

fn print_events(events: &[LedgerEvent]) {
    if events.is_empty() {
        println!("No events recorded.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Account", "Amount", "Details"]);
    for event in events {
        table.add_row(vec![
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            event.event_type().to_string(),
            event.account_id().to_string(),
            event.amount().map(|a| a.to_string()).unwrap_or_default(),
            details(&event.kind),
        ]);
    }
    println!("{}", table);
}

fn details(kind: &LedgerEventKind) -> String {
    match kind {
        LedgerEventKind::AccountCreated { owner_id, currency, .. } => {
            format!("owner {} ({})", owner_id, currency)
        }
        LedgerEventKind::Deposit { new_balance, .. }
        | LedgerEventKind::Withdrawal { new_balance, .. } => format!("balance {}", new_balance),
        LedgerEventKind::Transfer {
            to_account_id,
            from_balance,
            to_balance,
            ..
        } => format!("to {}; balances {} / {}", to_account_id, from_balance, to_balance),
    }
}
