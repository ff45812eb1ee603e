//! DuckDB account store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use super::pool::{ConnectionPool, PooledConnection};
use super::row_locks::{RowLockGuard, RowLocks};
use crate::config::StoreOptions;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, LockPlan};
use crate::migrations::MIGRATIONS;
use crate::ports::{AccountStore, UnitOfWork};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str =
    "account_id, owner_id, currency, balance::VARCHAR, created_at::VARCHAR, updated_at::VARCHAR";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed account store
///
/// Every connection in the pool is a clone of one database instance.
/// Exclusive row locks are granted by the in-process [`RowLocks`] table, so a
/// database file must only be opened by one `DuckDbStore` at a time.
pub struct DuckDbStore {
    pool: ConnectionPool,
    locks: RowLocks,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur while another process is still closing the file.
    pub fn open(db_path: &Path, options: &StoreOptions) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Self::with_seed(conn, Some(db_path.to_path_buf()), options),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e)
                        .with_context(|| format!("opening {}", db_path.display()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a private in-memory database
    pub fn open_in_memory(options: &StoreOptions) -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Self::with_seed(conn, None, options)
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off: cached extensions in ~/.duckdb may
        // not match the bundled engine
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn with_seed(
        conn: Connection,
        db_path: Option<PathBuf>,
        options: &StoreOptions,
    ) -> anyhow::Result<Self> {
        let pool = ConnectionPool::new(conn, options.pool_size, options.lock_timeout)?;
        let store = Self {
            pool,
            locks: RowLocks::new(options.lock_timeout),
            db_path,
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.pool.get()?;
        let result = MigrationService::new(&conn, MIGRATIONS).run_pending()?;
        if !result.applied.is_empty() {
            debug!(applied = ?result.applied, "store migrations applied");
        }
        Ok(result)
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Whether a unit of work currently holds the row
    pub fn is_locked(&self, id: AccountId) -> bool {
        self.locks.is_locked(id)
    }
}

impl AccountStore for DuckDbStore {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn create(&self, owner_id: &str, currency: &str) -> Result<Account> {
        let now = timestamp_param(Utc::now());
        let conn = self.pool.get()?;
        let sql = format!(
            "INSERT INTO sys_accounts (owner_id, currency, balance, created_at, updated_at)
             VALUES (?, ?, 0, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             RETURNING {}",
            ACCOUNT_COLUMNS
        );
        conn.query_row(
            &sql,
            params![owner_id, Account::normalize_currency(currency), now, now],
            row_to_account,
        )
        .map_err(|e| Error::unavailable(format!("failed to create account: {}", e)))
    }

    fn read(&self, id: AccountId) -> Result<Account> {
        let conn = self.pool.get()?;
        select_account(&conn, id)?.ok_or_else(|| Error::account_not_found(id))
    }

    fn list(&self) -> Result<Vec<Account>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM sys_accounts ORDER BY account_id", ACCOUNT_COLUMNS);
        let mut stmt = conn.prepare(&sql).map_err(unavailable)?;
        let rows = stmt.query_map([], row_to_account).map_err(unavailable)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row.map_err(unavailable)?);
        }
        Ok(accounts)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map(|_| ())
            .map_err(unavailable)
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(DuckDbUnitOfWork {
            conn: self.pool.get()?,
            locks: &self.locks,
            guards: BTreeMap::new(),
            in_transaction: false,
            finished: false,
        }))
    }
}

/// A unit of work on one pooled connection
///
/// Reads happen under row locks before any write. The DuckDB transaction is
/// opened by the first write, so its snapshot is taken after every row it
/// touches is locked and the previous holder of each lock has committed.
struct DuckDbUnitOfWork<'a> {
    conn: PooledConnection<'a>,
    locks: &'a RowLocks,
    guards: BTreeMap<AccountId, RowLockGuard<'a>>,
    in_transaction: bool,
    finished: bool,
}

impl DuckDbUnitOfWork<'_> {
    fn ensure_can_lock(&self, id: AccountId) -> Result<()> {
        if self.in_transaction {
            return Err(Error::aborted(format!(
                "account {} must be locked before the first write",
                id
            )));
        }
        Ok(())
    }

    fn end_transaction(&mut self, statement: &str) -> std::result::Result<(), duckdb::Error> {
        self.finished = true;
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn.execute_batch(statement)
    }
}

impl UnitOfWork for DuckDbUnitOfWork<'_> {
    fn lock_and_read(&mut self, id: AccountId) -> Result<Account> {
        if self.guards.contains_key(&id) {
            return select_account(&self.conn, id)?.ok_or_else(|| Error::account_not_found(id));
        }
        self.ensure_can_lock(id)?;

        let guard = self.locks.acquire(id)?;
        let account = select_account(&self.conn, id)?.ok_or_else(|| Error::account_not_found(id))?;
        self.guards.insert(id, guard);
        Ok(account)
    }

    fn lock_and_read_many(&mut self, plan: &LockPlan) -> Result<BTreeMap<AccountId, Account>> {
        let fresh = LockPlan::new(
            plan.ids().iter().copied().filter(|id| !self.guards.contains_key(id)),
        );
        if let Some(&first) = fresh.ids().first() {
            self.ensure_can_lock(first)?;
        }
        let new_guards = self.locks.acquire_all(&fresh)?;

        let mut found = BTreeMap::new();
        let mut missing = Vec::new();
        for &id in plan.ids() {
            match select_account(&self.conn, id)? {
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
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN TRANSACTION")
                .map_err(|e| Error::aborted(format!("failed to begin transaction: {}", e)))?;
            self.in_transaction = true;
        }

        let updated = self
            .conn
            .execute(
                "UPDATE sys_accounts
                 SET balance = CAST(? AS DECIMAL(38, 8)), updated_at = CAST(? AS TIMESTAMP)
                 WHERE account_id = ?",
                params![new_balance.to_string(), timestamp_param(Utc::now()), id],
            )
            .map_err(|e| Error::aborted(format!("failed to write account {}: {}", id, e)))?;
        if updated != 1 {
            return Err(Error::aborted(format!(
                "account {} disappeared during the unit of work",
                id
            )));
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let wrote = self.in_transaction;
        match self.end_transaction("COMMIT") {
            Ok(()) => {
                if wrote {
                    debug!(rows = self.guards.len(), "unit of work committed");
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
                self.conn.mark_broken();
                Err(Error::aborted(format!("commit failed: {}", e)))
            }
        }
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.end_transaction("ROLLBACK").map_err(|e| {
            self.conn.mark_broken();
            Error::aborted(format!("rollback failed: {}", e))
        })
    }
}

impl Drop for DuckDbUnitOfWork<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.end_transaction("ROLLBACK") {
            error!(error = %e, "rollback of abandoned unit of work failed");
            self.conn.mark_broken();
        }
    }
}

fn select_account(conn: &Connection, id: AccountId) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM sys_accounts WHERE account_id = ?", ACCOUNT_COLUMNS);
    match conn.query_row(&sql, [id], row_to_account) {
        Ok(account) => Ok(Some(account)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(unavailable(e)),
    }
}

fn row_to_account(row: &duckdb::Row<'_>) -> duckdb::Result<Account> {
    let balance: String = row.get(3)?;
    let balance = Decimal::from_str_exact(balance.trim()).map_err(|e| {
        duckdb::Error::FromSqlConversionFailure(3, duckdb::types::Type::Text, Box::new(e))
    })?;
    let created_at = timestamp_column(row, 4)?;
    let updated_at = timestamp_column(row, 5)?;

    Ok(Account {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        currency: row.get(2)?,
        balance: balance.normalize(),
        created_at,
        updated_at,
    })
}

fn unavailable(e: duckdb::Error) -> Error {
    Error::unavailable(e.to_string())
}

/// TIMESTAMP columns hold naive UTC
fn timestamp_param(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
        })
}

fn timestamp_column(row: &duckdb::Row<'_>, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| {
        duckdb::Error::FromSqlConversionFailure(idx, duckdb::types::Type::Text, Box::new(e))
    })
}
