//! In-process row lock table
//!
//! DuckDB resolves concurrent writers optimistically and has no
//! `SELECT ... FOR UPDATE`, so exclusive row locks are granted here. Every
//! store adapter routes its locked reads through this table.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, LockPlan};

/// Exclusive per-account locks with bounded waits
pub struct RowLocks {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
    timeout: Duration,
}

/// A held row lock, released on drop
#[must_use = "the row lock is released as soon as the guard is dropped"]
pub struct RowLockGuard<'a> {
    locks: &'a RowLocks,
    id: AccountId,
}

impl RowLockGuard<'_> {
    pub fn id(&self) -> AccountId {
        self.id
    }
}

impl Drop for RowLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.id);
    }
}

impl RowLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Lock one row, waiting at most the configured timeout
    pub fn acquire(&self, id: AccountId) -> Result<RowLockGuard<'_>> {
        let start = Instant::now();
        self.acquire_until(id, start, start + self.timeout)
    }

    /// Lock every row of the plan in ascending id order
    ///
    /// The whole plan shares one deadline. If any row cannot be locked in
    /// time, the rows already taken by this call are released before the
    /// error is returned.
    pub fn acquire_all(&self, plan: &LockPlan) -> Result<Vec<RowLockGuard<'_>>> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut guards = Vec::with_capacity(plan.len());
        for &id in plan.ids() {
            guards.push(self.acquire_until(id, start, deadline)?);
        }
        Ok(guards)
    }

    /// Whether any unit of work currently holds the row
    pub fn is_locked(&self, id: AccountId) -> bool {
        self.table().contains(&id)
    }

    fn acquire_until(
        &self,
        id: AccountId,
        start: Instant,
        deadline: Instant,
    ) -> Result<RowLockGuard<'_>> {
        let mut held = self.table();
        while held.contains(&id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockTimeout {
                    account_id: id,
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            debug!(account_id = id, "waiting for row lock");
            held = match self.released.wait_timeout(held, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        held.insert(id);
        Ok(RowLockGuard { locks: self, id })
    }

    fn release(&self, id: AccountId) {
        self.table().remove(&id);
        self.released.notify_all();
    }

    // The set stays consistent even if a holder panicked: every mutation of
    // it is a single insert or remove.
    fn table(&self) -> MutexGuard<'_, HashSet<AccountId>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
