//! Account command - open and inspect accounts

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Input;

use super::get_context;
use crate::output::{self, emit};
use ledger_core::{Account, AccountId};

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with a zero balance
    New {
        /// Owner identifier
        #[arg(long)]
        owner: Option<String>,
        /// Currency code, e.g. USD
        #[arg(long)]
        currency: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one account
    Show {
        /// Account ID
        id: AccountId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::New { owner, currency, json } => run_new(owner, currency, json),
        AccountCommands::Show { id, json } => {
            let ctx = get_context()?;
            emit(json, ctx.ledger_service.get_account(id), print_account)
        }
        AccountCommands::List { json } => {
            let ctx = get_context()?;
            emit(json, ctx.ledger_service.list_accounts(), |accounts| {
                print_accounts(accounts)
            })
        }
    }
}

fn run_new(owner: Option<String>, currency: Option<String>, json: bool) -> Result<()> {
    let owner = match owner {
        Some(o) => o,
        None if json => bail!("--owner is required with --json"),
        None => Input::new().with_prompt("Owner").interact_text()?,
    };
    let currency = match currency {
        Some(c) => c,
        None if json => bail!("--currency is required with --json"),
        None => Input::new()
            .with_prompt("Currency")
            .default("USD".to_string())
            .interact_text()?,
    };

    let ctx = get_context()?;
    emit(json, ctx.ledger_service.create_account(&owner, &currency), |account| {
        output::success(&format!("Account {} opened", account.id));
        print_account(account);
    })
}

fn print_account(account: &Account) {
    let mut table = output::create_table();
    table.add_row(vec!["ID".to_string(), account.id.to_string()]);
    table.add_row(vec!["Owner".to_string(), account.owner_id.clone()]);
    table.add_row(vec!["Currency".to_string(), account.currency.clone()]);
    table.add_row(vec!["Balance".to_string(), account.balance.to_string()]);
    table.add_row(vec![
        "Created".to_string(),
        account.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    table.add_row(vec![
        "Updated".to_string(),
        account.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    println!("{}", table);
}

fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts yet. Open one with 'ledger account new'.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Owner", "Currency", "Balance"]);
    for account in accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.owner_id.clone(),
            account.currency.clone(),
            account.balance.to_string(),
        ]);
    }
    println!("{}", table);
    println!("{}", format!("{} account(s)", accounts.len()).dimmed());
}
