//! Core domain entities
//!
//! All ledger entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod event;
pub mod lock_plan;
pub mod result;

pub use account::{validate_amount, Account, AccountId, MAX_AMOUNT_SCALE};
pub use event::{LedgerEvent, LedgerEventKind};
pub use lock_plan::LockPlan;
