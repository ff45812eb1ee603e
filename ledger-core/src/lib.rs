//! Ledger Core - concurrency-safe account ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, LedgerEvent, LockPlan, errors)
//! - **ports**: Trait definitions for external dependencies (AccountStore, EventLog)
//! - **services**: Business logic orchestration (LedgerService, audit, reconcile)
//! - **adapters**: Concrete implementations (DuckDB store, in-memory store)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod audit_migrations;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use config::Config;
use services::{AuditService, LedgerService, ReconcileService, StatusService, TracingMonitor};

// Re-export commonly used types at crate root
pub use domain::{Account, AccountId, LedgerEvent, LedgerEventKind, LockPlan};
pub use domain::result::{Error, OperationResult};
pub use config::StoreOptions;
pub use services::TransferOutcome;

/// Main context for ledger operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, the audit log, configuration, and all services.
pub struct LedgerContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub events: Arc<AuditService>,
    pub monitor: Arc<TracingMonitor>,
    pub ledger_service: LedgerService,
    pub reconcile_service: ReconcileService,
    pub status_service: StatusService,
}

impl LedgerContext {
    /// Create a new ledger context rooted at `ledger_dir`
    pub fn new(ledger_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(ledger_dir)
            .with_context(|| format!("creating {}", ledger_dir.display()))?;
        let config = Config::load(ledger_dir)?;

        let db_path = ledger_dir.join(&config.database_file);
        let store = Arc::new(DuckDbStore::open(&db_path, &config.store_options())?);
        let events = Arc::new(AuditService::new(ledger_dir, &config.audit_database_file)?);
        let monitor = Arc::new(TracingMonitor::new());

        let ledger_service = LedgerService::new(store.clone(), events.clone(), monitor.clone());
        let reconcile_service = ReconcileService::new(store.clone(), events.clone());
        let status_service = StatusService::new(store.clone(), events.clone());

        Ok(Self {
            config,
            store,
            events,
            monitor,
            ledger_service,
            reconcile_service,
            status_service,
        })
    }
}
