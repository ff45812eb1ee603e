//! Deposit, withdraw, transfer and balance commands

use anyhow::Result;
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{get_context, parse_amount};
use crate::output::emit;
use ledger_core::AccountId;

#[derive(Serialize)]
struct BalanceView {
    account_id: AccountId,
    balance: Decimal,
    currency: String,
}

pub fn run_deposit(account_id: AccountId, amount: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = parse_amount(amount).and_then(|a| ctx.ledger_service.deposit(account_id, a));
    emit(json, result, |balance| {
        println!("{} Account {} balance: {}", "Deposited.".green(), account_id, balance);
    })
}

pub fn run_withdraw(account_id: AccountId, amount: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = parse_amount(amount).and_then(|a| ctx.ledger_service.withdraw(account_id, a));
    emit(json, result, |balance| {
        println!("{} Account {} balance: {}", "Withdrawn.".green(), account_id, balance);
    })
}

pub fn run_transfer(from: AccountId, to: AccountId, amount: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = parse_amount(amount).and_then(|a| ctx.ledger_service.transfer(from, to, a));
    emit(json, result, |outcome| {
        println!("{}", "Transfer committed".green());
        println!("  {} -> {}", from, outcome.from_balance);
        println!("  {} -> {}", to, outcome.to_balance);
    })
}

pub fn run_balance(account_id: AccountId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.ledger_service.get_account(account_id).map(|a| BalanceView {
        account_id: a.id,
        balance: a.balance,
        currency: a.currency,
    });
    emit(json, result, |view| {
        println!("{} {}", view.balance.to_string().bold(), view.currency);
    })
}
