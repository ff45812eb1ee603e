//! In-memory store and event log
//!
//! Used by tests and by embedders that do not need durability. Locking and
//! commit semantics match the DuckDB adapter: writes are staged per unit of
//! work and applied in one step on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use super::row_locks::{RowLockGuard, RowLocks};
use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, LedgerEvent, LockPlan};
use crate::ports::{AccountStore, EventLog, UnitOfWork};

/// Volatile account store
pub struct MemoryStore {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
    next_id: AtomicI64,
    locks: RowLocks,
    failing_commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            locks: RowLocks::new(lock_timeout),
            failing_commits: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` commits fail as if the backing store faulted
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Whether a unit of work currently holds the row
    pub fn is_locked(&self, id: AccountId) -> bool {
        self.locks.is_locked(id)
    }

    fn committed(&self, id: AccountId) -> Result<Option<Account>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| Error::unavailable("account map lock poisoned"))?;
        Ok(accounts.get(&id).cloned())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl AccountStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, owner_id: &str, currency: &str) -> Result<Account> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let account = Account::new(id, owner_id, currency);
        self.accounts
            .write()
            .map_err(|_| Error::unavailable("account map lock poisoned"))?
            .insert(id, account.clone());
        Ok(account)
    }

    fn read(&self, id: AccountId) -> Result<Account> {
        self.committed(id)?
            .ok_or_else(|| Error::account_not_found(id))
    }

    fn list(&self) -> Result<Vec<Account>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| Error::unavailable("account map lock poisoned"))?;
        Ok(accounts.values().cloned().collect())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self,
            guards: BTreeMap::new(),
            staged: BTreeMap::new(),
        }))
    }
}

struct MemoryUnitOfWork<'a> {
    store: &'a MemoryStore,
    guards: BTreeMap<AccountId, RowLockGuard<'a>>,
    staged: BTreeMap<AccountId, Decimal>,
}

impl MemoryUnitOfWork<'_> {
    /// Committed state overlaid with this unit's staged balance
    fn current(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.store.committed(id)?.map(|mut account| {
            if let Some(balance) = self.staged.get(&id) {
                account.balance = *balance;
            }
            account
        }))
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn lock_and_read(&mut self, id: AccountId) -> Result<Account> {
        if self.guards.contains_key(&id) {
            return self.current(id)?.ok_or_else(|| Error::account_not_found(id));
        }
        let guard = self.store.locks.acquire(id)?;
        match self.current(id)? {
            Some(account) => {
                self.guards.insert(id, guard);
                Ok(account)
            }
            None => Err(Error::account_not_found(id)),
        }
    }

    fn lock_and_read_many(&mut self, plan: &LockPlan) -> Result<BTreeMap<AccountId, Account>> {
        let fresh = LockPlan::new(
            plan.ids().iter().copied().filter(|id| !self.guards.contains_key(id)),
        );
        let new_guards = self.store.locks.acquire_all(&fresh)?;

        let mut found = BTreeMap::new();
        let mut missing = Vec::new();
        for &id in plan.ids() {
            match self.current(id)? {
                Some(account) => {
                    found.insert(id, account);
                }
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            return Err(Error::AccountNotFound(missing));
        }

        for guard in new_guards {
            self.guards.insert(guard.id(), guard);
        }
        Ok(found)
    }

    fn write(&mut self, id: AccountId, new_balance: Decimal) -> Result<()> {
        if !self.guards.contains_key(&id) {
            return Err(Error::aborted(format!(
                "account {} is not locked by this unit of work",
                id
            )));
        }
        if new_balance < Decimal::ZERO {
            return Err(Error::validation(format!(
                "balance of account {} cannot become negative",
                id
            )));
        }
        self.staged.insert(id, new_balance);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.store.take_injected_failure() {
            return Err(Error::aborted("injected commit failure"));
        }
        let now = Utc::now();
        let mut accounts = self
            .store
            .accounts
            .write()
            .map_err(|_| Error::aborted("account map lock poisoned"))?;
        for (id, balance) in &self.staged {
            if let Some(account) = accounts.get_mut(id) {
                account.balance = *balance;
                account.updated_at = now;
            }
        }
        debug!(rows = self.staged.len(), "memory unit of work committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Volatile event log
#[derive(Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LedgerEvent>>,
    failing: AtomicBool,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail until switched off again
    pub fn fail_appends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<LedgerEvent>>> {
        self.events
            .lock()
            .map_err(|_| Error::unavailable("event log lock poisoned"))
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, event: &LedgerEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::unavailable("event log is not accepting appends"));
        }
        self.lock()?.push(event.clone());
        Ok(())
    }

    fn events(&self) -> Result<Vec<LedgerEvent>> {
        Ok(self.lock()?.clone())
    }

    fn recent(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        Ok(self.lock()?.iter().rev().take(limit).cloned().collect())
    }

    fn for_account(&self, id: AccountId, limit: usize) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .lock()?
            .iter()
            .rev()
            .filter(|event| event.involves(id))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.lock()?.len() as u64)
    }
}
