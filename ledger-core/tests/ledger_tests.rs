//! End-to-end tests against a real ledger directory
//!
//! Each test builds a `LedgerContext` in a temp directory, exactly as the CLI
//! does, and drives it through the ledger service.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use tempfile::TempDir;

use ledger_core::adapters::duckdb::DuckDbStore;
use ledger_core::adapters::memory::MemoryEventLog;
use ledger_core::ports::{AccountStore, EventLog};
use ledger_core::services::{LedgerService, TracingMonitor};
use ledger_core::{Error, LedgerContext, LedgerEventKind, OperationResult, StoreOptions};

fn context(dir: &TempDir) -> LedgerContext {
    std::fs::write(
        dir.path().join("settings.json"),
        r#"{"store": {"poolSize": 8, "lockTimeoutMs": 30000}}"#,
    )
    .unwrap();
    LedgerContext::new(dir.path()).unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

#[test]
fn test_end_to_end_scenario() {
    let dir = TempDir::new().unwrap();
    let ctx = Arc::new(context(&dir));
    let ledger = &ctx.ledger_service;

    // 100 concurrent deposits of 1 onto 1000
    let hot = ledger.create_account("load", "USD").unwrap();
    ledger.deposit(hot.id, dec("1000")).unwrap();

    let barrier = Arc::new(Barrier::new(100));
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            let id = hot.id;
            thread::spawn(move || {
                barrier.wait();
                ctx.ledger_service.deposit(id, Decimal::ONE).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(ledger.get_balance(hot.id).unwrap(), dec("1100"));

    // transfer between two accounts
    let a = ledger.create_account("alice", "USD").unwrap();
    let b = ledger.create_account("bob", "USD").unwrap();
    ledger.deposit(a.id, dec("500")).unwrap();
    ledger.deposit(b.id, dec("200")).unwrap();

    let outcome = ledger.transfer(a.id, b.id, dec("300")).unwrap();
    assert_eq!(outcome.from_balance, dec("200"));
    assert_eq!(outcome.to_balance, dec("500"));

    // overdraft fails and changes nothing
    let err = ledger.transfer(a.id, b.id, dec("9999")).unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
    assert!(!err.is_retryable());
    assert_eq!(ledger.get_balance(a.id).unwrap(), dec("200"));
    assert_eq!(ledger.get_balance(b.id).unwrap(), dec("500"));

    let report = ctx.reconcile_service.run().unwrap();
    assert!(report.is_clean(), "discrepancies: {:?}", report.discrepancies);
    assert_eq!(report.accounts_checked, 3);
}

#[test]
fn test_unknown_account_and_bad_amounts() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let ledger = &ctx.ledger_service;
    let account = ledger.create_account("alice", "USD").unwrap();

    assert!(matches!(ledger.deposit(12345, dec("1")), Err(Error::AccountNotFound(_))));
    assert!(matches!(ledger.withdraw(12345, dec("1")), Err(Error::AccountNotFound(_))));
    assert!(matches!(ledger.get_balance(12345), Err(Error::AccountNotFound(_))));
    match ledger.transfer(777, 778, dec("1")) {
        Err(Error::AccountNotFound(ids)) => assert_eq!(ids, vec![777, 778]),
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(matches!(ledger.deposit(account.id, dec("0")), Err(Error::InvalidAmount(_))));
    assert!(matches!(ledger.withdraw(account.id, dec("-1")), Err(Error::InvalidAmount(_))));
    assert!(matches!(
        ledger.deposit(account.id, dec("0.123456789")),
        Err(Error::InvalidAmount(_))
    ));
    assert_eq!(ledger.get_balance(account.id).unwrap(), Decimal::ZERO);
}

#[test]
fn test_reads_are_idempotent_and_exclude_uncommitted_writes() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let account = ctx.ledger_service.create_account("alice", "USD").unwrap();
    ctx.ledger_service.deposit(account.id, dec("42.5")).unwrap();

    let mut uow = ctx.store.begin().unwrap();
    uow.lock_and_read(account.id).unwrap();
    uow.write(account.id, dec("1")).unwrap();

    assert_eq!(ctx.ledger_service.get_balance(account.id).unwrap(), dec("42.5"));
    assert_eq!(ctx.ledger_service.get_balance(account.id).unwrap(), dec("42.5"));

    drop(uow);
    assert_eq!(ctx.ledger_service.get_balance(account.id).unwrap(), dec("42.5"));
    assert!(!ctx.store.is_locked(account.id));
}

#[test]
fn test_events_are_durable() {
    let dir = TempDir::new().unwrap();
    let account_id = {
        let ctx = context(&dir);
        let a = ctx.ledger_service.create_account("alice", "eur").unwrap();
        let b = ctx.ledger_service.create_account("bob", "eur").unwrap();
        ctx.ledger_service.deposit(a.id, dec("10")).unwrap();
        ctx.ledger_service.transfer(a.id, b.id, dec("4")).unwrap();
        ctx.ledger_service.withdraw(b.id, dec("1")).unwrap();
        b.id
    };

    let ctx = LedgerContext::new(dir.path()).unwrap();
    assert_eq!(ctx.events.count().unwrap(), 5);

    let history = ctx.events.for_account(account_id, 10).unwrap();
    assert_eq!(history.len(), 3);
    assert!(matches!(history[0].kind, LedgerEventKind::Withdrawal { .. }));
    assert!(matches!(history[1].kind, LedgerEventKind::Transfer { .. }));
    assert_eq!(ctx.ledger_service.get_balance(account_id).unwrap(), dec("3"));
    assert!(ctx.reconcile_service.run().unwrap().is_clean());
}

#[test]
fn test_audit_outage_keeps_committed_mutation() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        DuckDbStore::open(&dir.path().join("ledger.duckdb"), &StoreOptions::default()).unwrap(),
    );
    let events = Arc::new(MemoryEventLog::new());
    let monitor = Arc::new(TracingMonitor::new());
    let ledger = LedgerService::new(store.clone(), events.clone(), monitor.clone());

    let account = ledger.create_account("alice", "USD").unwrap();
    events.fail_appends(true);
    ledger.deposit(account.id, dec("8")).unwrap();
    ledger.withdraw(account.id, dec("3")).unwrap();

    assert_eq!(store.read(account.id).unwrap().balance, dec("5"));
    assert_eq!(monitor.failures(), 2);
    assert_eq!(events.count().unwrap(), 1);
}

#[test]
fn test_lock_timeout_is_reported_and_retryable() {
    let dir = TempDir::new().unwrap();
    let options = StoreOptions {
        pool_size: 2,
        lock_timeout: Duration::from_millis(50),
    };
    let store = Arc::new(DuckDbStore::open(&dir.path().join("ledger.duckdb"), &options).unwrap());
    let ledger = LedgerService::new(
        store.clone(),
        Arc::new(MemoryEventLog::new()),
        Arc::new(TracingMonitor::new()),
    );
    let account = ledger.create_account("alice", "USD").unwrap();

    let mut holder = store.begin().unwrap();
    holder.lock_and_read(account.id).unwrap();

    let err = ledger.deposit(account.id, dec("1")).unwrap_err();
    assert!(matches!(err, Error::LockTimeout { .. }));

    let envelope: OperationResult<Decimal> = Err(err).into();
    assert!(!envelope.success);
    assert!(envelope.retryable);
    assert_eq!(envelope.error_kind.as_deref(), Some("lock_timeout"));

    holder.rollback().unwrap();
    assert_eq!(ledger.deposit(account.id, dec("1")).unwrap(), dec("1"));
}

#[test]
fn test_status_reports_totals() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let a = ctx.ledger_service.create_account("alice", "USD").unwrap();
    ctx.ledger_service.deposit(a.id, dec("12.25")).unwrap();

    let status = ctx.status_service.status().unwrap();
    assert!(status.ready);
    assert_eq!(status.store, "duckdb");
    assert_eq!(status.total_accounts, 1);
    assert_eq!(status.totals[0].balance, dec("12.25"));
    assert_eq!(status.total_events, Some(2));
}
