//! `SQLite` schema and migrations for generation records.

use rusqlite::Connection;

use crate::error::{GateError, Result};

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_generations.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_pending_lookup.sql"),
    },
];

/// Latest schema version this build knows about.
#[must_use]
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

/// Wrap a `rusqlite` error with what was being attempted.
pub(crate) fn db_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> GateError {
    move |e| GateError::Storage(format!("{context}: {e}"))
}

/// Apply pending migrations. Returns the schema version afterwards.
///
/// # Errors
/// Returns an error if the migrations table cannot be created or read, or a
/// migration fails (that migration is rolled back).
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(db_err("create schema_migrations"))?;

    let applied = schema_version(conn)?;
    let mut current = applied;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let tx = conn.transaction().map_err(db_err("begin migration"))?;
        tx.execute_batch(migration.sql)
            .map_err(|e| GateError::Storage(format!("apply migration {}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(db_err("record migration"))?;
        tx.commit().map_err(db_err("commit migration"))?;
        tracing::debug!(version = migration.version, "applied record store migration");
        current = migration.version;
    }
    Ok(current)
}

/// Highest applied migration, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .map_err(db_err("read schema version"))?;
    Ok(version.unwrap_or(0))
}
