//! Schema migrations, tracked in the `migrations` table.

use rusqlite::Connection;
use tracing::{debug, info};

pub const CURRENT_VERSION: i32 = 2;

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        return Ok(());
    }

    info!(
        current_version,
        target_version = CURRENT_VERSION,
        "Running store migrations"
    );

    if current_version < 1 {
        migrate_v1_queue_tables(conn)?;
    }
    if current_version < 2 {
        migrate_v2_state(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: queue and dead-letter tables.
fn migrate_v1_queue_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            destination TEXT NOT NULL,
            event_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_attempt_at INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_queue_ready ON queue (next_attempt_at, created_at);
        CREATE INDEX idx_queue_created ON queue (created_at);

        CREATE TABLE deadletter (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            destination TEXT NOT NULL,
            event_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            failure_message TEXT NOT NULL,
            failed_at INTEGER NOT NULL
        );
        CREATE INDEX idx_deadletter_failed ON deadletter (failed_at);
        ",
    )?;
    record_migration(conn, 1, "queue_tables")
}

/// V2: scalar state (last dispatch pass).
fn migrate_v2_state(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE state (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        ",
    )?;
    record_migration(conn, 2, "state")
}
