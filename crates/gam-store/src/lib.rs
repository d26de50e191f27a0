//! # gam-store
//!
//! The persistence gateway: typed access to the relational store, the
//! durable two-stream queue, and the store-backed advisory mutexes.
//!
//! - [`Store`] wraps a pooled `SQLite` database with migrations applied
//! - [`repositories`] hold the stateless SQL access layer per entity
//! - [`queue::Queue`] is the durable task/proposal substrate
//! - [`locks`] serialize region mutations across processes
//! - [`similarity`] provides the trigram ranking used by memory retrieval

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod locks;
pub mod migrations;
pub mod queue;
pub mod repositories;
pub mod similarity;

use std::path::Path;

pub use connection::{ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};

use connection::ConnectionConfig;
use migrations::run_migrations;

/// Handle to the relational store.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Open (and migrate) a file-backed store, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).ok();
            }
        }
        let pool = connection::new_file(path, &ConnectionConfig::default())?;
        run_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Open an in-memory store (tests). The pool is pinned to one
    /// connection so all borrowers share the database.
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        run_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Borrow a connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// The underlying pool, for lock guards that outlive one borrow.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
