//! Concurrent mutation tests
//!
//! Many threads hit the same accounts at once; balances must come out exact,
//! never negative, and crossing transfers must never deadlock.
//!
//! Run with: cargo test --test concurrent_transfer_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tempfile::TempDir;

use ledger_core::adapters::duckdb::DuckDbStore;
use ledger_core::adapters::memory::{MemoryEventLog, MemoryStore};
use ledger_core::ports::AccountStore;
use ledger_core::services::{LedgerService, ReconcileService, TracingMonitor};
use ledger_core::{AccountId, Error, StoreOptions};

/// Concurrent callers for the deposit test
const DEPOSIT_THREADS: usize = 100;

/// Threads per direction in the crossing-transfer test
const CROSSING_THREADS: usize = 25;

/// Transfers each crossing thread performs
const TRANSFERS_PER_THREAD: usize = 4;

struct Harness {
    service: Arc<LedgerService>,
    reconcile: ReconcileService,
    _dir: Option<TempDir>,
}

fn duckdb_harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let options = StoreOptions {
        pool_size: 8,
        lock_timeout: Duration::from_secs(30),
    };
    let store = Arc::new(DuckDbStore::open(&dir.path().join("ledger.duckdb"), &options).unwrap());
    harness(store, Some(dir))
}

fn memory_harness() -> Harness {
    harness(Arc::new(MemoryStore::new(Duration::from_secs(30))), None)
}

fn harness(store: Arc<dyn AccountStore>, dir: Option<TempDir>) -> Harness {
    let events = Arc::new(MemoryEventLog::new());
    let service = LedgerService::new(store.clone(), events.clone(), Arc::new(TracingMonitor::new()));
    Harness {
        service: Arc::new(service),
        reconcile: ReconcileService::new(store, events),
        _dir: dir,
    }
}

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn concurrent_deposits_are_exact(h: Harness) {
    let account_id = h.service.create_account("load", "USD").unwrap().id;
    h.service.deposit(account_id, dec(1000)).unwrap();

    let barrier = Arc::new(Barrier::new(DEPOSIT_THREADS));
    let failures = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..DEPOSIT_THREADS)
        .map(|_| {
            let service = Arc::clone(&h.service);
            let barrier = Arc::clone(&barrier);
            let failures = Arc::clone(&failures);
            thread::spawn(move || {
                barrier.wait();
                if let Err(e) = service.deposit(account_id, Decimal::ONE) {
                    eprintln!("deposit failed: {}", e);
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    println!("{} deposits in {:?}", DEPOSIT_THREADS, start.elapsed());

    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(h.service.get_balance(account_id).unwrap(), dec(1100));
    assert!(h.reconcile.run().unwrap().is_clean());
}

fn crossing_transfers_conserve_funds(h: Harness) {
    let a = h.service.create_account("a", "USD").unwrap().id;
    let b = h.service.create_account("b", "USD").unwrap().id;
    h.service.deposit(a, dec(60)).unwrap();
    h.service.deposit(b, dec(40)).unwrap();

    let barrier = Arc::new(Barrier::new(CROSSING_THREADS * 2));
    let completed = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let aborted = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for (from, to) in [(a, b), (b, a)] {
        for _ in 0..CROSSING_THREADS {
            let service = Arc::clone(&h.service);
            let barrier = Arc::clone(&barrier);
            let completed = Arc::clone(&completed);
            let rejected = Arc::clone(&rejected);
            let aborted = Arc::clone(&aborted);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..TRANSFERS_PER_THREAD {
                    match service.transfer(from, to, dec(3)) {
                        Ok(outcome) => {
                            assert!(outcome.from_balance >= Decimal::ZERO);
                            assert!(outcome.to_balance >= Decimal::ZERO);
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(Error::InsufficientFunds { .. }) => {
                            rejected.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            eprintln!("transfer {} -> {} failed: {}", from, to, e);
                            aborted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }));
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // lock waits are bounded far above the test's runtime, so nothing may abort
    assert_eq!(aborted.load(Ordering::SeqCst), 0);
    let total = CROSSING_THREADS * 2 * TRANSFERS_PER_THREAD;
    assert_eq!(
        completed.load(Ordering::SeqCst) + rejected.load(Ordering::SeqCst),
        total
    );

    let balance_a = h.service.get_balance(a).unwrap();
    let balance_b = h.service.get_balance(b).unwrap();
    assert!(balance_a >= Decimal::ZERO && balance_b >= Decimal::ZERO);
    assert_eq!(balance_a + balance_b, dec(100));
    assert!(h.reconcile.run().unwrap().is_clean());
}

fn ring_transfers_conserve_funds(h: Harness) {
    let ids: Vec<AccountId> = (0..4)
        .map(|i| {
            let id = h.service.create_account(&format!("ring{}", i), "EUR").unwrap().id;
            h.service.deposit(id, dec(25)).unwrap();
            id
        })
        .collect();
    let ids = Arc::new(ids);
    let barrier = Arc::new(Barrier::new(ids.len() * 3));
    let aborted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..ids.len() * 3)
        .map(|n| {
            let service = Arc::clone(&h.service);
            let barrier = Arc::clone(&barrier);
            let ids = Arc::clone(&ids);
            let aborted = Arc::clone(&aborted);
            thread::spawn(move || {
                barrier.wait();
                for step in 0..10 {
                    let from = ids[(n + step) % ids.len()];
                    let to = ids[(n + step * 3 + 1) % ids.len()];
                    match service.transfer(from, to, dec(7)) {
                        Ok(_) | Err(Error::InsufficientFunds { .. }) => {}
                        Err(e) => {
                            eprintln!("transfer {} -> {} failed: {}", from, to, e);
                            aborted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(aborted.load(Ordering::SeqCst), 0);
    let mut sum = Decimal::ZERO;
    for id in ids.iter() {
        let balance = h.service.get_balance(*id).unwrap();
        assert!(balance >= Decimal::ZERO);
        sum += balance;
    }
    assert_eq!(sum, dec(100));
}

#[test]
fn test_concurrent_deposits_duckdb() {
    concurrent_deposits_are_exact(duckdb_harness());
}

#[test]
fn test_concurrent_deposits_memory() {
    concurrent_deposits_are_exact(memory_harness());
}

#[test]
fn test_crossing_transfers_duckdb() {
    crossing_transfers_conserve_funds(duckdb_harness());
}

#[test]
fn test_crossing_transfers_memory() {
    crossing_transfers_conserve_funds(memory_harness());
}

#[test]
fn test_ring_transfers_duckdb() {
    ring_transfers_conserve_funds(duckdb_harness());
}

#[test]
fn test_ring_transfers_memory() {
    ring_transfers_conserve_funds(memory_harness());
}
