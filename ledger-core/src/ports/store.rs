//! Account store port - transactional row storage

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, LockPlan};

/// Durable account storage with row-level locking
///
/// Implementations must guarantee that a row locked by one unit of work
/// cannot be locked by another until the first commits or rolls back, and
/// that writes become visible to other readers only after commit.
pub trait AccountStore: Send + Sync {
    /// Store name (e.g., "duckdb", "memory")
    fn name(&self) -> &str;

    /// Create an account with a zero balance and persist it before returning
    fn create(&self, owner_id: &str, currency: &str) -> Result<Account>;

    /// Read the committed state of an account without locking it
    fn read(&self, id: AccountId) -> Result<Account>;

    /// All accounts in ascending id order
    fn list(&self) -> Result<Vec<Account>>;

    /// Check that the backing store is reachable
    fn ping(&self) -> Result<()>;

    /// Open a unit of work
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;
}

/// A bounded sequence of locked reads and writes that commits or rolls back
/// atomically
///
/// Dropping a unit of work without calling `commit` rolls it back and
/// releases every lock it holds.
pub trait UnitOfWork {
    /// Lock one row for the rest of the unit of work and return its current state
    fn lock_and_read(&mut self, id: AccountId) -> Result<Account>;

    /// Lock every row of the plan, in plan order, as a single step
    ///
    /// Fails with `AccountNotFound` listing every missing id; locks taken by
    /// this call are released before returning the error.
    fn lock_and_read_many(&mut self, plan: &LockPlan) -> Result<BTreeMap<AccountId, Account>>;

    /// Stage a new balance for a row this unit of work holds locked
    fn write(&mut self, id: AccountId, new_balance: Decimal) -> Result<()>;

    /// Make every staged write visible, then release the locks
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged write, then release the locks
    fn rollback(self: Box<Self>) -> Result<()>;
}
