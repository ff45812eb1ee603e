//! Ledger service - deposits, withdrawals and transfers
//!
//! Every mutation runs as one unit of work against the account store:
//! lock the rows it touches in ascending id order, read, validate, write,
//! commit. The audit event is appended only after the commit succeeded.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, Account, AccountId, LedgerEvent, LockPlan};
use crate::ports::{AccountStore, AuditMonitor, EventLog, UnitOfWork};

/// Balances of both sides after a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

/// Service for balance mutations and reads
pub struct LedgerService {
    store: Arc<dyn AccountStore>,
    events: Arc<dyn EventLog>,
    monitor: Arc<dyn AuditMonitor>,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        events: Arc<dyn EventLog>,
        monitor: Arc<dyn AuditMonitor>,
    ) -> Self {
        Self {
            store,
            events,
            monitor,
        }
    }

    /// Open an account with a zero balance
    pub fn create_account(&self, owner_id: &str, currency: &str) -> Result<Account> {
        Account::validate_new(owner_id, currency)?;
        let account = self.store.create(owner_id.trim(), currency)?;
        debug!(account_id = account.id, currency = %account.currency, "account created");

        self.record(LedgerEvent::account_created(
            account.id,
            &account.owner_id,
            &account.currency,
        ));
        Ok(account)
    }

    pub fn get_account(&self, account_id: AccountId) -> Result<Account> {
        self.store.read(account_id)
    }

    /// Committed balance; never observes an uncommitted write
    pub fn get_balance(&self, account_id: AccountId) -> Result<Decimal> {
        Ok(self.store.read(account_id)?.balance)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.store.list()
    }

    /// Credit an account and return its new balance
    pub fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Decimal> {
        validate_amount(amount)?;

        let new_balance = self.in_unit_of_work("deposit", |uow| {
            let account = uow.lock_and_read(account_id)?;
            let new_balance = account.credited(amount)?;
            uow.write(account_id, new_balance)?;
            Ok(new_balance)
        })?;

        self.record(LedgerEvent::deposit(account_id, amount, new_balance));
        Ok(new_balance)
    }

    /// Debit an account and return its new balance
    ///
    /// Fails with `InsufficientFunds` without writing anything when the
    /// balance does not cover the amount.
    pub fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<Decimal> {
        validate_amount(amount)?;

        let new_balance = self.in_unit_of_work("withdraw", |uow| {
            let account = uow.lock_and_read(account_id)?;
            let new_balance = account.debited(amount)?;
            uow.write(account_id, new_balance)?;
            Ok(new_balance)
        })?;

        self.record(LedgerEvent::withdrawal(account_id, amount, new_balance));
        Ok(new_balance)
    }

    /// Move funds between two accounts atomically
    ///
    /// Both rows are locked in ascending id order regardless of direction.
    /// A transfer to the same account locks it once, still requires the
    /// funds to be present, and leaves the balance unchanged.
    pub fn transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferOutcome> {
        validate_amount(amount)?;
        let plan = LockPlan::for_transfer(from_id, to_id);

        let outcome = self.in_unit_of_work("transfer", |uow| {
            let mut accounts = uow.lock_and_read_many(&plan)?;
            let from = accounts
                .remove(&from_id)
                .ok_or_else(|| Error::account_not_found(from_id))?;

            if from_id == to_id {
                from.debited(amount)?;
                return Ok(TransferOutcome {
                    from_balance: from.balance,
                    to_balance: from.balance,
                });
            }

            let to = accounts
                .remove(&to_id)
                .ok_or_else(|| Error::account_not_found(to_id))?;
            let from_balance = from.debited(amount)?;
            let to_balance = to.credited(amount)?;

            for &id in plan.ids() {
                let balance = if id == from_id { from_balance } else { to_balance };
                uow.write(id, balance)?;
            }
            Ok(TransferOutcome {
                from_balance,
                to_balance,
            })
        })?;

        self.record(LedgerEvent::transfer(
            from_id,
            to_id,
            amount,
            outcome.from_balance,
            outcome.to_balance,
        ));
        Ok(outcome)
    }

    /// Run `work` in a fresh unit of work
    ///
    /// Commits when `work` succeeds and rolls back when it fails. A failed
    /// rollback is surfaced as `TransactionAborted` carrying both causes.
    fn in_unit_of_work<T>(
        &self,
        operation: &str,
        work: impl FnOnce(&mut dyn UnitOfWork) -> Result<T>,
    ) -> Result<T> {
        let mut uow = self.store.begin()?;
        match work(uow.as_mut()) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(err) => match uow.rollback() {
                Ok(()) => {
                    debug!(operation, error = %err, "unit of work rolled back");
                    Err(err)
                }
                Err(rollback_err) => {
                    warn!(operation, error = %err, rollback_error = %rollback_err, "rollback failed");
                    Err(Error::aborted(format!(
                        "{} failed ({}) and rollback failed ({})",
                        operation, err, rollback_err
                    )))
                }
            },
        }
    }

    /// Append an event for an already committed mutation
    fn record(&self, event: LedgerEvent) {
        if let Err(err) = self.events.append(&event) {
            self.monitor.append_failed(&event, &err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryEventLog, MemoryStore};
    use crate::services::TracingMonitor;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        events: Arc<MemoryEventLog>,
        monitor: Arc<TracingMonitor>,
        service: LedgerService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(100)));
        let events = Arc::new(MemoryEventLog::new());
        let monitor = Arc::new(TracingMonitor::new());
        let service = LedgerService::new(store.clone(), events.clone(), monitor.clone());
        Fixture {
            store,
            events,
            monitor,
            service,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let f = fixture();
        let account = f.service.create_account("alice", "usd").unwrap();
        assert_eq!(account.currency, "USD");

        assert_eq!(f.service.deposit(account.id, dec("100.50")).unwrap(), dec("100.50"));
        assert_eq!(f.service.withdraw(account.id, dec("0.50")).unwrap(), dec("100"));
        assert_eq!(f.service.get_balance(account.id).unwrap(), dec("100"));

        let types: Vec<_> = f.events.events().unwrap().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["account_created", "deposit", "withdrawal"]);
    }

    #[test]
    fn test_invalid_amounts_are_rejected_before_locking() {
        let f = fixture();
        let account = f.service.create_account("alice", "USD").unwrap();

        for amount in [Decimal::ZERO, dec("-5"), dec("0.000000001")] {
            assert!(matches!(
                f.service.deposit(account.id, amount),
                Err(Error::InvalidAmount(_))
            ));
            assert!(matches!(
                f.service.transfer(account.id, account.id, amount),
                Err(Error::InvalidAmount(_))
            ));
        }
        assert_eq!(f.events.count().unwrap(), 1);
    }

    #[test]
    fn test_overdraft_leaves_balance_untouched() {
        let f = fixture();
        let account = f.service.create_account("alice", "USD").unwrap();
        f.service.deposit(account.id, dec("10")).unwrap();

        match f.service.withdraw(account.id, dec("10.01")) {
            Err(Error::InsufficientFunds { account_id, balance, requested }) => {
                assert_eq!(account_id, account.id);
                assert_eq!(balance, dec("10"));
                assert_eq!(requested, dec("10.01"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(f.service.get_balance(account.id).unwrap(), dec("10"));
        assert!(!f.store.is_locked(account.id));
    }

    #[test]
    fn test_transfer_moves_funds() {
        let f = fixture();
        let a = f.service.create_account("alice", "USD").unwrap();
        let b = f.service.create_account("bob", "USD").unwrap();
        f.service.deposit(a.id, dec("500")).unwrap();
        f.service.deposit(b.id, dec("200")).unwrap();

        // higher id to lower id exercises the ordered lock path
        let outcome = f.service.transfer(b.id, a.id, dec("50")).unwrap();
        assert_eq!(outcome.from_balance, dec("150"));
        assert_eq!(outcome.to_balance, dec("550"));
    }

    #[test]
    fn test_transfer_with_missing_account() {
        let f = fixture();
        let a = f.service.create_account("alice", "USD").unwrap();
        f.service.deposit(a.id, dec("5")).unwrap();

        match f.service.transfer(a.id, 999, dec("1")) {
            Err(Error::AccountNotFound(ids)) => assert_eq!(ids, vec![999]),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(f.service.get_balance(a.id).unwrap(), dec("5"));
        assert!(!f.store.is_locked(a.id));
    }

    #[test]
    fn test_self_transfer_is_a_checked_no_op() {
        let f = fixture();
        let a = f.service.create_account("alice", "USD").unwrap();
        f.service.deposit(a.id, dec("20")).unwrap();

        let outcome = f.service.transfer(a.id, a.id, dec("20")).unwrap();
        assert_eq!(outcome.from_balance, dec("20"));
        assert_eq!(outcome.to_balance, dec("20"));
        assert!(matches!(
            f.service.transfer(a.id, a.id, dec("21")),
            Err(Error::InsufficientFunds { .. })
        ));
        assert_eq!(f.events.recent(1).unwrap()[0].event_type(), "transfer");
    }

    #[test]
    fn test_commit_failure_is_retryable_and_leaves_nothing() {
        let f = fixture();
        let a = f.service.create_account("alice", "USD").unwrap();
        let b = f.service.create_account("bob", "USD").unwrap();
        f.service.deposit(a.id, dec("100")).unwrap();
        let events_before = f.events.count().unwrap();

        f.store.fail_next_commits(1);
        let err = f.service.transfer(a.id, b.id, dec("40")).unwrap_err();
        assert!(matches!(err, Error::TransactionAborted(_)));
        assert!(err.is_retryable());
        assert_eq!(f.service.get_balance(a.id).unwrap(), dec("100"));
        assert_eq!(f.service.get_balance(b.id).unwrap(), Decimal::ZERO);
        assert_eq!(f.events.count().unwrap(), events_before);

        f.service.transfer(a.id, b.id, dec("40")).unwrap();
        assert_eq!(f.service.get_balance(b.id).unwrap(), dec("40"));
    }

    #[test]
    fn test_audit_failure_does_not_undo_commit() {
        let f = fixture();
        let a = f.service.create_account("alice", "USD").unwrap();

        f.events.fail_appends(true);
        assert_eq!(f.service.deposit(a.id, dec("3")).unwrap(), dec("3"));
        assert_eq!(f.service.get_balance(a.id).unwrap(), dec("3"));
        assert_eq!(f.monitor.failures(), 1);
    }

    #[test]
    fn test_validation_of_new_accounts() {
        let f = fixture();
        assert!(matches!(f.service.create_account(" ", "USD"), Err(Error::Validation(_))));
        assert!(matches!(f.service.create_account("alice", ""), Err(Error::Validation(_))));
        assert!(f.service.list_accounts().unwrap().is_empty());
    }
}
