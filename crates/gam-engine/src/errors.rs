//! Engine error types.
//!
//! The turn-end validation gate surfaces as [`EngineError::GateFailed`]
//! carrying the prioritized issue list; the turn stays `ACTIVE` and the
//! caller retries after fixing the inputs.

use thiserror::Error;

use gam_region::RegionError;
use gam_store::StoreError;
use gam_validator::ValidatorError;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Region scan or manifest access failed.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Validator infrastructure failed.
    #[error(transparent)]
    Validator(#[from] ValidatorError),

    /// Context bundle or docs write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A direct sqlite transaction failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted document failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Turn end requested with no `ACTIVE` turn in the store.
    #[error("no active turn found")]
    NoActiveTurn,

    /// A named turn does not exist.
    #[error("turn not found: {0}")]
    TurnNotFound(String),

    /// The turn-end validation gate blocked completion.
    #[error("validation gate failed with {} issue(s)", issues.len())]
    GateFailed {
        /// Prioritized issues, manifest problems first.
        issues: Vec<String>,
    },

    /// A proposal named in a queue message does not exist.
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    /// Decision recording on a plan that is not `ACTIVE`.
    #[error("plan {0} is not active")]
    PlanNotActive(String),

    /// A plan declaration is malformed (bad dependency shape).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A declared-but-unimplemented operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}
