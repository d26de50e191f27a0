//! Contracts for the tiers whose internals live outside this core.
//!
//! Tier 2 runs builds and tests in an isolated container; Tier 4 boots
//! the runtime and compares observed flow activity to expected sync
//! behavior. Both are pass/fail-plus-diagnostics here. Tier 3 is the
//! opaque audit policy; the proposal processor drives its bounded loop.

use gam_core::proposal::Proposal;
use gam_core::validation::{code, ValidationDetail, ValidationResult};

use crate::ValidatorError;

/// Tier 2: integration checks in an isolated container.
pub trait IntegrationRunner: Send + Sync {
    /// Build and test the region's tree with the proposal applied.
    fn run(&self, region_path: &str, proposal: &Proposal)
        -> Result<ValidationResult, ValidatorError>;
}

/// Tier 4: runtime probes executing operational principles.
pub trait RuntimeProbe: Send + Sync {
    /// Boot and compare observed flow-log activity to expected behavior.
    fn run(&self, proposal: &Proposal) -> Result<ValidationResult, ValidatorError>;
}

/// Outcome of one Tier 3 audit pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditVerdict {
    /// The auditor has no remaining objections.
    Satisfied,
    /// A structured concern with suggested remediation.
    Concern {
        concern: String,
        remediation: String,
    },
}

/// Tier 3: the opaque audit policy invoked on high-risk proposals.
pub trait AuditPolicy: Send + Sync {
    /// Review one proposal revision.
    fn review(&self, proposal: &Proposal) -> Result<AuditVerdict, ValidatorError>;
}

/// A Tier 2 runner that fails every proposal with a wiring reminder.
/// Deployments that enable Tier 2 must supply a real container runner.
pub struct UnconfiguredIntegration;

impl IntegrationRunner for UnconfiguredIntegration {
    fn run(
        &self,
        region_path: &str,
        _proposal: &Proposal,
    ) -> Result<ValidationResult, ValidatorError> {
        Ok(ValidationResult::fail(
            2,
            code::INTEGRATION_BUILD,
            format!("No integration runner configured for {region_path}"),
            ValidationDetail::fail(
                "integration_runner",
                "a container-backed integration runner",
                "unconfigured",
                "Disable run_integration or wire an IntegrationRunner implementation into the \
                 proposal processor.",
            ),
        ))
    }
}

/// A Tier 4 probe that fails every proposal with a wiring reminder.
pub struct UnconfiguredRuntime;

impl RuntimeProbe for UnconfiguredRuntime {
    fn run(&self, _proposal: &Proposal) -> Result<ValidationResult, ValidatorError> {
        Ok(ValidationResult::fail(
            4,
            code::RUNTIME_FAILURE,
            "No runtime probe configured".to_owned(),
            ValidationDetail::fail(
                "runtime_probe",
                "a bootable runtime probe",
                "unconfigured",
                "Disable run_runtime or wire a RuntimeProbe implementation into the proposal \
                 processor.",
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::tests::pending_proposal;

    #[test]
    fn unconfigured_tiers_fail_with_fix() {
        let proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        let t2 = UnconfiguredIntegration.run("app", &proposal).unwrap();
        assert!(!t2.passed);
        assert_eq!(t2.tier, 2);
        assert!(!t2.details[0].fix.is_empty());

        let t4 = UnconfiguredRuntime.run(&proposal).unwrap();
        assert!(!t4.passed);
        assert_eq!(t4.tier, 4);
    }
}
