//! High-risk triggers for the Tier 3 audit loop.

use gam_core::proposal::Proposal;

/// Which proposal shapes get routed through the auditor. All triggers
/// default on; deployments tighten or relax per field.
#[derive(Clone, Copy, Debug)]
pub struct HighRiskPolicy {
    /// Any sync mutation set counts as high risk.
    pub sync_mutations: bool,
    /// A proposed transition into `stable` counts as high risk.
    pub stable_transitions: bool,
    /// Declared API removals count as high risk.
    pub api_removals: bool,
}

impl Default for HighRiskPolicy {
    fn default() -> Self {
        Self {
            sync_mutations: true,
            stable_transitions: true,
            api_removals: true,
        }
    }
}

impl HighRiskPolicy {
    /// Whether `proposal` should pass through the Tier 3 loop.
    #[must_use]
    pub fn is_high_risk(&self, proposal: &Proposal) -> bool {
        if self.sync_mutations
            && proposal.sync_changes.as_ref().is_some_and(|c| !c.is_empty())
        {
            return true;
        }
        if self.stable_transitions && proposal.proposed_state.as_deref() == Some("stable") {
            return true;
        }
        if self.api_removals
            && proposal
                .evidence
                .api_analysis
                .as_ref()
                .is_some_and(|api| !api.removals.is_empty())
        {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::tests::pending_proposal;
    use gam_core::proposal::{ApiAnalysis, SyncChanges};

    #[test]
    fn plain_proposal_is_low_risk() {
        let proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        assert!(!HighRiskPolicy::default().is_high_risk(&proposal));
    }

    #[test]
    fn stable_transition_is_high_risk() {
        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.proposed_state = Some("stable".into());
        assert!(HighRiskPolicy::default().is_high_risk(&proposal));
    }

    #[test]
    fn sync_mutations_are_high_risk_unless_empty() {
        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.sync_changes = Some(SyncChanges::default());
        assert!(!HighRiskPolicy::default().is_high_risk(&proposal), "empty set is not a mutation");
        proposal.sync_changes = Some(SyncChanges {
            deleted: vec!["Fan".into()],
            ..SyncChanges::default()
        });
        assert!(HighRiskPolicy::default().is_high_risk(&proposal));
    }

    #[test]
    fn api_removals_are_high_risk_and_togglable() {
        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.evidence.api_analysis = Some(ApiAnalysis {
            removals: vec!["query".into()],
            ..ApiAnalysis::default()
        });
        assert!(HighRiskPolicy::default().is_high_risk(&proposal));

        let relaxed = HighRiskPolicy {
            api_removals: false,
            ..HighRiskPolicy::default()
        };
        assert!(!relaxed.is_high_risk(&proposal));
    }
}
