//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod audit;
mod ledger;
pub mod migration;
mod reconcile;
mod status;

pub use audit::{AuditService, TracingMonitor};
pub use ledger::{LedgerService, TransferOutcome};
pub use migration::{MigrationResult, MigrationService};
pub use reconcile::{replay, Discrepancy, ReconcileReport, ReconcileService, ReplayedAccount};
pub use status::{CurrencyTotal, StatusService, StatusSummary};
