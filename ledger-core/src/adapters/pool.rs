//! DuckDB connection pool
//!
//! All pooled connections are `try_clone`s of one seed connection, so they
//! share a single database instance. A connection whose transaction state is
//! unknown (failed commit or rollback) is discarded and replaced by a fresh
//! clone instead of being handed out again. A replacement that cannot be
//! opened leaves the pool short until a later checkout manages to open one.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use duckdb::Connection;
use tracing::warn;

use crate::domain::result::{Error, Result};

pub struct ConnectionPool {
    seed: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
    checkout_timeout: Duration,
    capacity: usize,
    /// Connections that exist, idle or checked out
    live: AtomicUsize,
    #[cfg(test)]
    failing_clones: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(seed: Connection, size: usize, checkout_timeout: Duration) -> Result<Self> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(seed.try_clone().map_err(|e| {
                Error::unavailable(format!("failed to open pooled connection: {}", e))
            })?);
        }
        Ok(Self {
            seed: Mutex::new(seed),
            idle: Mutex::new(idle),
            available: Condvar::new(),
            checkout_timeout,
            capacity: size,
            live: AtomicUsize::new(size),
            #[cfg(test)]
            failing_clones: AtomicUsize::new(0),
        })
    }

    /// Connections currently open, at most the configured size
    pub fn size(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Take a connection, waiting at most the checkout timeout
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        let deadline = Instant::now() + self.checkout_timeout;
        let mut idle = self.idle_list();
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(self.checked_out(conn));
            }
            if self.live.load(Ordering::SeqCst) < self.capacity {
                match self.clone_seed() {
                    Ok(conn) => {
                        self.live.fetch_add(1, Ordering::SeqCst);
                        return Ok(self.checked_out(conn));
                    }
                    Err(e) => warn!(error = %e, "could not reopen a pooled connection"),
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::unavailable(format!(
                    "no database connection became free within {}ms",
                    self.checkout_timeout.as_millis()
                )));
            }
            idle = match self.available.wait_timeout(idle, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn checked_out(&self, conn: Connection) -> PooledConnection<'_> {
        PooledConnection {
            pool: self,
            conn: Some(conn),
            broken: false,
        }
    }

    fn give_back(&self, conn: Connection) {
        self.idle_list().push(conn);
        self.available.notify_one();
    }

    // `live` only changes while the idle list is locked, so checkouts never
    // open more than `capacity` connections
    fn replace_broken(&self) {
        let mut idle = self.idle_list();
        match self.clone_seed() {
            Ok(conn) => idle.push(conn),
            Err(e) => {
                self.live.fetch_sub(1, Ordering::SeqCst);
                warn!(error = %e, "could not replace a broken pooled connection");
            }
        }
        drop(idle);
        // on failure a waiter may still open the missing connection itself
        self.available.notify_one();
    }

    fn clone_seed(&self) -> Result<Connection> {
        #[cfg(test)]
        if self
            .failing_clones
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::unavailable("injected clone failure"));
        }
        self.seed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_clone()
            .map_err(|e| Error::unavailable(format!("failed to open pooled connection: {}", e)))
    }

    fn idle_list(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A connection checked out of the pool, returned on drop
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
    broken: bool,
}

impl PooledConnection<'_> {
    /// Discard this connection instead of returning it to the pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // `conn` is only taken in `drop`
        self.conn.as_ref().unwrap_or_else(|| unreachable!("pooled connection used after drop"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                drop(conn);
                self.pool.replace_broken();
            } else {
                self.pool.give_back(conn);
            }
        }
    }
}
