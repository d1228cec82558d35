//! Database schema migrations for focuswall.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{info, warn};

type Migration = fn(&Connection) -> SqliteResult<()>;

/// Schema steps in order; step `n` brings the database to version `n + 1`.
const MIGRATIONS: &[Migration] = &[migrate_v1, migrate_v2];

/// Current schema version.
const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    if current_version > SCHEMA_VERSION {
        warn!(
            found = current_version,
            supported = SCHEMA_VERSION,
            "database was written by a newer focuswall"
        );
        return Ok(());
    }

    for (version, step) in (1..=SCHEMA_VERSION).zip(MIGRATIONS) {
        if current_version < version {
            step(conn)?;
        }
    }
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: workspaces, tasks and the key-value store.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS workspaces (
            id                    TEXT PRIMARY KEY,
            name                  TEXT NOT NULL,
            position              INTEGER NOT NULL DEFAULT 0,
            work_duration         INTEGER NOT NULL DEFAULT 25,
            break_duration        INTEGER NOT NULL DEFAULT 5,
            long_break_duration   INTEGER NOT NULL DEFAULT 15,
            work_intervals        INTEGER NOT NULL DEFAULT 4,
            autostart_work        INTEGER NOT NULL DEFAULT 1,
            autostart_break       INTEGER NOT NULL DEFAULT 1,
            enable_website_filter INTEGER NOT NULL DEFAULT 0,
            filter_mode           TEXT NOT NULL DEFAULT 'blocklist',
            blocklist             TEXT NOT NULL DEFAULT '[]',
            allowlist             TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            task_type       TEXT NOT NULL DEFAULT 'TODO',
            position        INTEGER NOT NULL DEFAULT 0,
            elapsed_time_ms INTEGER NOT NULL DEFAULT 0,
            target_time_ms  INTEGER
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()?;
    info!("database migrated to v1");
    Ok(())
}

/// v2: index for ordered per-list task queries.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tasks_workspace_type_position
            ON tasks(workspace_id, task_type, position);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()?;
    info!("database migrated to v2");
    Ok(())
}
