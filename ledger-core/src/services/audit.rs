//! Audit service - durable ledger event history in DuckDB
//!
//! Events are appended to their own database file (events.duckdb by default)
//! so an outage of the audit store never blocks account mutations. Each row
//! keeps the full event as JSON plus a few columns for filtering.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use duckdb::{params, Connection};
use tracing::error;

use crate::audit_migrations::AUDIT_MIGRATIONS;
use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, LedgerEvent};
use crate::ports::{AuditMonitor, EventLog};
use crate::services::MigrationService;

/// DuckDB-backed event log
pub struct AuditService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl AuditService {
    /// Open or create the audit database in the ledger directory and run
    /// any pending migrations.
    pub fn new(ledger_dir: &Path, file_name: &str) -> anyhow::Result<Self> {
        let db_path = ledger_dir.join(file_name);
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(&db_path, config)
            .with_context(|| format!("opening {}", db_path.display()))?;

        MigrationService::new(&conn, AUDIT_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Get the path to the audit database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::unavailable(format!("Lock poisoned: {}", e)))
    }

    fn query(&self, filter: &str, limit: Option<usize>, args: &[&dyn duckdb::ToSql]) -> Result<Vec<LedgerEvent>> {
        let conn = self.connection()?;
        let order = if limit.is_some() { "DESC" } else { "ASC" };
        let mut sql = format!(
            "SELECT payload FROM sys_ledger_events {} ORDER BY seq {}",
            filter, order
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql).map_err(unavailable)?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(unavailable)?;

        let mut events = Vec::new();
        for payload in rows {
            let payload = payload.map_err(unavailable)?;
            events.push(serde_json::from_str(&payload)?);
        }
        Ok(events)
    }
}

impl EventLog for AuditService {
    fn append(&self, event: &LedgerEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO sys_ledger_events (
                event_id, timestamp_ms, event_type, account_id,
                counterparty_id, amount, payload
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                event.id.to_string(),
                event.timestamp.timestamp_millis(),
                event.event_type(),
                event.account_id(),
                event.counterparty_id(),
                event.amount().map(|a| a.to_string()),
                payload,
            ],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn events(&self) -> Result<Vec<LedgerEvent>> {
        self.query("", None, &[])
    }

    fn recent(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        self.query("", Some(limit), &[])
    }

    fn for_account(&self, id: AccountId, limit: usize) -> Result<Vec<LedgerEvent>> {
        self.query(
            "WHERE account_id = ? OR counterparty_id = ?",
            Some(limit),
            &[&id, &id],
        )
    }

    fn count(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sys_ledger_events", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count.max(0) as u64)
    }
}

fn unavailable(e: duckdb::Error) -> Error {
    Error::unavailable(format!("audit store: {}", e))
}

/// Reports audit failures through `tracing` and keeps a running count
#[derive(Debug, Default)]
pub struct TracingMonitor {
    failures: AtomicU64,
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit appends that failed since startup
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl AuditMonitor for TracingMonitor {
    fn append_failed(&self, event: &LedgerEvent, err: &Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        error!(
            event_id = %event.id,
            event_type = event.event_type(),
            account_id = event.account_id(),
            error = %err,
            "failed to record committed ledger event"
        );
    }
}
