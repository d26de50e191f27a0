//! Store error types.
//!
//! Infrastructure failures only. Validation outcomes never travel through
//! this enum; they are values, not errors.

use thiserror::Error;

/// Errors from store, queue, and lock operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A persisted document failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity lookup failed.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (e.g. "Region", "Concept", "Proposal").
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// A migration failed to apply.
    #[error("migration v{version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Convenience result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::not_found("Region", "app.missing");
        assert_eq!(err.to_string(), "Region not found: app.missing");
    }
}
