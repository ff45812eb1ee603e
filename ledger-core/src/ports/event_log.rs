//! Event log port - append-only audit trail

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, LedgerEvent};

/// Append-only record of committed ledger transitions
pub trait EventLog: Send + Sync {
    /// Append an event after its mutation has committed
    fn append(&self, event: &LedgerEvent) -> Result<()>;

    /// Every event, oldest first
    fn events(&self) -> Result<Vec<LedgerEvent>>;

    /// Most recent events first, up to `limit`
    fn recent(&self, limit: usize) -> Result<Vec<LedgerEvent>>;

    /// Most recent events touching an account, up to `limit`
    fn for_account(&self, id: AccountId, limit: usize) -> Result<Vec<LedgerEvent>>;

    /// Number of recorded events
    fn count(&self) -> Result<u64>;
}

/// External monitoring collaborator
///
/// Receives audit failures that must not affect the already-committed
/// mutation but must not go unnoticed either.
pub trait AuditMonitor: Send + Sync {
    fn append_failed(&self, event: &LedgerEvent, error: &Error);
}
