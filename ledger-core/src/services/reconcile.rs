//! Reconcile service - checks stored balances against the audit history
//!
//! Events are appended after their mutation commits, so a reconciliation
//! that races with in-flight mutations can report transient differences.
//! Run it against a quiescent ledger for a definitive answer.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, LedgerEvent, LedgerEventKind};
use crate::ports::{AccountStore, EventLog};

/// Balance rebuilt from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayedAccount {
    pub balance: Decimal,
    /// The history contains the account's creation event
    pub created: bool,
}

/// An account whose stored state disagrees with its history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub account_id: AccountId,
    /// Balance implied by the recorded events
    pub expected: Decimal,
    /// Stored balance, `None` when events name an account the store lacks
    pub actual: Option<Decimal>,
    pub history_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub accounts_checked: usize,
    pub events_replayed: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Fold events into per-account balances
///
/// Only amounts are summed, so the result does not depend on the order in
/// which concurrent mutations appended their events.
pub fn replay(events: &[LedgerEvent]) -> Result<BTreeMap<AccountId, ReplayedAccount>> {
    let mut accounts: BTreeMap<AccountId, ReplayedAccount> = BTreeMap::new();

    for event in events {
        match &event.kind {
            LedgerEventKind::AccountCreated { account_id, .. } => {
                accounts.entry(*account_id).or_default().created = true;
            }
            LedgerEventKind::Deposit { account_id, amount, .. } => {
                apply(&mut accounts, *account_id, *amount)?;
            }
            LedgerEventKind::Withdrawal { account_id, amount, .. } => {
                apply(&mut accounts, *account_id, -*amount)?;
            }
            LedgerEventKind::Transfer {
                from_account_id,
                to_account_id,
                amount,
                ..
            } => {
                apply(&mut accounts, *from_account_id, -*amount)?;
                apply(&mut accounts, *to_account_id, *amount)?;
            }
        }
    }
    Ok(accounts)
}

fn apply(
    accounts: &mut BTreeMap<AccountId, ReplayedAccount>,
    id: AccountId,
    delta: Decimal,
) -> Result<()> {
    let entry = accounts.entry(id).or_default();
    entry.balance = entry
        .balance
        .checked_add(delta)
        .ok_or_else(|| Error::validation(format!("replayed balance of account {} overflows", id)))?;
    Ok(())
}

/// Service for post-hoc reconciliation
pub struct ReconcileService {
    store: Arc<dyn AccountStore>,
    events: Arc<dyn EventLog>,
}

impl ReconcileService {
    pub fn new(store: Arc<dyn AccountStore>, events: Arc<dyn EventLog>) -> Self {
        Self { store, events }
    }

    pub fn run(&self) -> Result<ReconcileReport> {
        let accounts = self.store.list()?;
        let events = self.events.events()?;
        let mut replayed = replay(&events)?;

        let mut discrepancies = Vec::new();
        for account in &accounts {
            let history = replayed.remove(&account.id).unwrap_or_default();
            if !history.created || history.balance != account.balance {
                discrepancies.push(Discrepancy {
                    account_id: account.id,
                    expected: history.balance,
                    actual: Some(account.balance),
                    history_complete: history.created,
                });
            }
        }
        // whatever is left was never found in the store
        for (account_id, history) in replayed {
            discrepancies.push(Discrepancy {
                account_id,
                expected: history.balance,
                actual: None,
                history_complete: history.created,
            });
        }

        Ok(ReconcileReport {
            accounts_checked: accounts.len(),
            events_replayed: events.len(),
            discrepancies,
        })
    }
}
