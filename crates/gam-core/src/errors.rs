//! Top-level error type shared across the workspace binary surface.
//!
//! Infrastructure failures (store, queue, filesystem, parse) propagate as
//! `Err`; validation failures travel as [`crate::validation::ValidationResult`]
//! values and are never wrapped in this enum.

use thiserror::Error;

/// Workspace-level error, aggregating per-crate domains at the binary seam.
#[derive(Debug, Error)]
pub enum GamError {
    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O failure outside the store (manifest, context artifacts).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
