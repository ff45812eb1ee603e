//! Event log database migrations - embedded SQL files
//!
//! Same layout as the account store migrations, applied to events.duckdb.

/// All event log migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const AUDIT_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_ledger_events.sql",
        include_str!("001_ledger_events.sql"),
    ),
];
