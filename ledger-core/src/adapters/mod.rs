//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the AccountStore port, with a connection pool and row locks
//! - In-memory store and event log for tests and embedding
//!
//! The DuckDB event log lives in `services::AuditService`.

pub mod duckdb;
pub mod memory;
pub mod pool;
pub mod row_locks;
