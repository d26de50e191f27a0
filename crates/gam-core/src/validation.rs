//! Validation results and the error-code taxonomy.
//!
//! Every failing detail must carry a non-empty fix. Vague failures cost
//! the next turn, so a missing fix is itself a defect surfaced with a
//! `warn!` and a debug assertion.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Structural codes (manifest / marker violations, recoverable by editing).
pub mod code {
    /// Proposal targets a region that does not exist.
    pub const REGION_MISSING: i32 = 1;
    /// Proposal region is outside the owning turn's declared scope.
    pub const OUT_OF_SCOPE: i32 = 2;
    /// Evidence names a modified region whose file lacks markers.
    pub const MARKERS_MISSING: i32 = 3;

    /// Invariant violated against declared evidence.
    pub const INVARIANT_VIOLATION: i32 = -1;
    /// Proposed lifecycle transition is not in any governing state machine.
    pub const ILLEGAL_TRANSITION: i32 = -2;
    /// A sync clause references a nonexistent action or state field.
    pub const BROKEN_SYNC_REF: i32 = -3;
    /// Removing an action would orphan enabled syncs.
    pub const ORPHANED_SYNC: i32 = -4;

    /// Integration (Tier 2) build failure.
    pub const INTEGRATION_BUILD: i32 = -99;
    /// Integration (Tier 2) test failure.
    pub const INTEGRATION_TEST: i32 = -98;
    /// Tier 3 audit exhausted its iterations.
    pub const AUDIT_EXHAUSTED: i32 = -100;
    /// Tier 4 runtime probe failure.
    pub const RUNTIME_FAILURE: i32 = -101;
}

/// A single validation check outcome. `fix` is mandatory whenever
/// `passed` is false.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub check: String,
    pub passed: bool,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub got: String,
    #[serde(default)]
    pub fix: String,
}

impl ValidationDetail {
    /// A passing check with no further context.
    #[must_use]
    pub fn pass(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed: true,
            ..Self::default()
        }
    }

    /// A failing check. `fix` must be actionable by the next turn.
    #[must_use]
    pub fn fail(
        check: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        let detail = Self {
            check: check.into(),
            passed: false,
            expected: expected.into(),
            got: got.into(),
            fix: fix.into(),
        };
        if detail.fix.is_empty() {
            warn!(check = %detail.check, "failing validation detail has no fix");
            debug_assert!(false, "failing validation detail must carry a fix");
        }
        detail
    }
}

/// The outcome of running one validation tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub tier: i32,
    pub passed: bool,
    /// 0 on pass; taxonomy code otherwise.
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub details: Vec<ValidationDetail>,
}

impl ValidationResult {
    /// A passing result for the given tier.
    #[must_use]
    pub fn pass(tier: i32) -> Self {
        Self {
            tier,
            passed: true,
            code: 0,
            message: format!("Tier {tier} passed"),
            details: Vec::new(),
        }
    }

    /// A failing result carrying one detail.
    #[must_use]
    pub fn fail(tier: i32, code: i32, message: impl Into<String>, detail: ValidationDetail) -> Self {
        Self {
            tier,
            passed: false,
            code,
            message: message.into(),
            details: vec![detail],
        }
    }

    /// Compose the agent-facing rejection briefing: a header naming tier
    /// and code, then one `Check / Expected / Got / Fix` block per failing
    /// detail.
    #[must_use]
    pub fn briefing(&self) -> String {
        let mut out = format!(
            "REJECTION (Tier {}, Code {})\n{}",
            self.tier, self.code, self.message
        );
        for d in &self.details {
            if d.passed {
                continue;
            }
            out.push_str(&format!(
                "\n  Check: {} | Expected: {} | Got: {}",
                d.check, d.expected, d.got
            ));
            if !d.fix.is_empty() {
                out.push_str(&format!("\n  Fix: {}", d.fix));
            }
        }
        out
    }
}
