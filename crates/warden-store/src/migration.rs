//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1 and is
//! recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::records::now_millis;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: requests and permissions.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Requests awaiting a decision
        CREATE TABLE pending (
            id TEXT PRIMARY KEY,
            caller TEXT NOT NULL,           -- hex public key
            method TEXT NOT NULL,
            params TEXT NOT NULL,           -- JSON array
            created_at INTEGER NOT NULL     -- Unix ms
        );

        -- Resolved requests, written once
        CREATE TABLE history (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            caller TEXT NOT NULL,
            method TEXT NOT NULL,
            params TEXT NOT NULL,
            allowed INTEGER NOT NULL,       -- 0 or 1
            timestamp INTEGER NOT NULL
        );

        -- Cached decisions per (caller, verb)
        CREATE TABLE permissions (
            caller TEXT NOT NULL,
            verb TEXT NOT NULL,
            value TEXT NOT NULL,            -- '1' allow, '0' deny
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (caller, verb)
        );

        CREATE INDEX idx_pending_created ON pending(created_at);
        CREATE INDEX idx_history_caller ON history(caller);
        "#,
    )?;

    Ok(())
}

/// Migration v2: connected apps and held keys.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE apps (
            app TEXT PRIMARY KEY,
            key TEXT NOT NULL,              -- holder public key
            name TEXT,
            url TEXT,
            icon TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE keys (
            key TEXT PRIMARY KEY,
            name TEXT,
            encrypted_key TEXT NOT NULL,    -- opaque, encrypted by the caller
            created_at INTEGER NOT NULL
        );

        CREATE INDEX idx_apps_key ON apps(key);
        "#,
    )?;

    Ok(())
}
