//! # gam-validator
//!
//! The tiered, deterministic gate every proposal passes before mutating
//! the store.
//!
//! - **Tier 0** (structural): region exists, scope containment, markers
//!   present for claimed modifications
//! - **Tier 1** (semantic): transition legality, invariants against
//!   evidence, sync reference integrity, orphan prevention
//! - **Tier 2/4** (integration/runtime): trait contracts, disabled here
//! - **Tier 3** (audit): an opaque policy driven by the proposal
//!   processor's bounded feedback loop
//!
//! Validation failures are values ([`ValidationResult`]), never `Err`;
//! `Err` is reserved for infrastructure trouble. The first failing check
//! of a tier short-circuits the rest of that tier, and a failed tier
//! stops the pipeline — fail fast, with specificity.

#![deny(unsafe_code)]

pub mod contracts;
pub mod risk;
pub mod semantic;
pub mod structural;

use std::path::PathBuf;

use thiserror::Error;

use gam_core::proposal::Proposal;
use gam_core::validation::ValidationResult;
use gam_store::{Store, StoreError};

pub use contracts::{AuditPolicy, AuditVerdict, IntegrationRunner, RuntimeProbe};
pub use risk::HighRiskPolicy;

/// Infrastructure errors raised while validating.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs Tier 0 and Tier 1 validation against the store and source tree.
pub struct Validator {
    store: Store,
    project_root: PathBuf,
}

impl Validator {
    /// Create a validator over the given store and project root.
    #[must_use]
    pub fn new(store: Store, project_root: PathBuf) -> Self {
        Self {
            store,
            project_root,
        }
    }

    /// Run Tier 0, then Tier 1. Returns the first failing result, or the
    /// passing Tier 1 result.
    pub fn validate(&self, proposal: &Proposal) -> Result<ValidationResult, ValidatorError> {
        let tier0 = structural::tier0(&self.store, &self.project_root, proposal)?;
        if !tier0.passed {
            return Ok(tier0);
        }
        semantic::tier1(&self.store, proposal)
    }
}
