//! Schema migration runner for the relational store.
//!
//! Migrations are embedded at compile time via [`include_str!`] and applied
//! in version order, each inside its own transaction. The `schema_version`
//! table tracks applied versions, so running the migrator is idempotent.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Complete schema — regions, concepts, syncs, turns, proposals, plans, flow, quality, locks",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending store migrations. Returns the number applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    apply_all(conn, MIGRATIONS)
}

fn apply_all(conn: &Connection, migrations: &[Migration]) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in migrations {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }
        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_one(conn, migration)?;
        applied += 1;
    }

    Ok(applied)
}

/// Queue-substrate migrations, kept separate so the queue database carries
/// only its own tables.
pub fn run_queue_migrations(conn: &Connection) -> Result<u32> {
    const QUEUE_MIGRATIONS: &[Migration] = &[Migration {
        version: 1,
        description: "Queue streams and consumer-group claims",
        sql: include_str!("v001_queue.sql"),
    }];
    apply_all(conn, QUEUE_MIGRATIONS)
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version    INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;
    Ok(())
}

fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn apply_one(conn: &Connection, migration: &Migration) -> Result<()> {
    let wrap = |e: rusqlite::Error| StoreError::Migration {
        version: migration.version,
        source: e,
    };
    conn.execute_batch("BEGIN").map_err(wrap)?;
    let outcome = conn.execute_batch(migration.sql).and_then(|()| {
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )
        .map(|_| ())
    });
    match outcome {
        Ok(()) => conn.execute_batch("COMMIT").map_err(wrap),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(wrap(e))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
