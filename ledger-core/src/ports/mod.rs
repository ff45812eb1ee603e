//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The ledger engine
//! depends only on these traits, not on concrete implementations.

mod event_log;
mod store;

pub use event_log::{AuditMonitor, EventLog};
pub use store::{AccountStore, UnitOfWork};
