//! `SQLite` connection pooling with WAL mode, foreign keys, and the
//! `similarity` scalar function applied to every connection.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;
use crate::similarity::register_similarity;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size.
    pub pool_size: u32,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Runs on each new connection: pragmas plus scalar function registration.
#[derive(Debug)]
struct ConnectionCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        register_similarity(conn)
    }
}

/// Create a file-backed connection pool.
pub fn new_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::file(path), config, config.pool_size)
}

/// Create an in-memory connection pool (for tests).
///
/// Pool size is pinned to 1 so every borrower sees the same database;
/// separate in-memory connections would each get a private one.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::memory(), config, 1)
}

fn build(
    manager: SqliteConnectionManager,
    config: &ConnectionConfig,
    size: u32,
) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(size)
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(ConnectionCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)?;
    Ok(pool)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
