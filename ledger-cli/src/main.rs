//! Ledger CLI - operate the account ledger from a terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, config, events, funds, load_test, reconcile, status};
use ledger_core::AccountId;

/// Ledger - concurrency-safe account balances
#[derive(Parser)]
#[command(name = "ledger", version, about, long_about = None)]
struct Cli {
    /// Show debug logs from the ledger engine
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open and inspect accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Credit an account
    Deposit {
        /// Account ID
        account_id: AccountId,
        /// Amount, e.g. 10.50
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Debit an account
    Withdraw {
        /// Account ID
        account_id: AccountId,
        /// Amount, e.g. 10.50
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move funds between two accounts
    Transfer {
        /// Source account ID
        from: AccountId,
        /// Destination account ID
        to: AccountId,
        /// Amount, e.g. 10.50
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the committed balance of an account
    Balance {
        /// Account ID
        account_id: AccountId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the audit trail
    Events {
        /// Only events touching this account
        #[arg(long)]
        account: Option<AccountId>,
        /// Number of events to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check stored balances against the audit trail
    Reconcile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show store readiness and ledger totals
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run concurrent deposits against a fresh account and verify the result
    LoadTest {
        /// Number of concurrent deposits
        #[arg(long, default_value = "100")]
        deposits: usize,
        /// Amount of each deposit
        #[arg(long, default_value = "1")]
        amount: String,
        /// Initial balance of the test account
        #[arg(long, default_value = "1000")]
        initial: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<output::AlreadyReported>().is_none() {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Deposit { account_id, amount, json } => funds::run_deposit(account_id, &amount, json),
        Commands::Withdraw { account_id, amount, json } => funds::run_withdraw(account_id, &amount, json),
        Commands::Transfer { from, to, amount, json } => funds::run_transfer(from, to, &amount, json),
        Commands::Balance { account_id, json } => funds::run_balance(account_id, json),
        Commands::Events { account, limit, json } => events::run(account, limit, json),
        Commands::Reconcile { json } => reconcile::run(json),
        Commands::Status { json } => status::run(json),
        Commands::LoadTest { deposits, amount, initial, json } => {
            load_test::run(deposits, &amount, &initial, json)
        }
        Commands::Config { command } => config::run(command),
    }
}
