//! Proposals: structured change requests validated before acceptance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProposalId, RegionId, TurnId};
use crate::sync::Synchronization;
use crate::turn::TaskKind;

/// Processing status of a proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "VALIDATING")]
    Validating,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl ProposalStatus {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Validating => "VALIDATING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parse a store column value. Unknown values map to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "VALIDATING" => Self::Validating,
            "APPROVED" => Self::Approved,
            "REJECTED" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

/// A structured change request emitted by a researcher turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub turn_id: TurnId,
    pub region_id: RegionId,
    /// Denormalized for lock keying and validation; joined from the region row.
    pub region_path: String,
    /// Action name from the governing state machine, e.g. `implement`.
    pub action_taken: String,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub proposed_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_changes: Option<SyncChanges>,
    pub evidence: Evidence,
    #[serde(default)]
    pub deferred_actions: Vec<DeferredAction>,
    pub status: ProposalStatus,
    #[serde(default)]
    pub review_iterations: u32,
    #[serde(default)]
    pub review_history: Vec<ReviewComment>,
    #[serde(default)]
    pub validation_error_code: Option<i32>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sync mutations carried by a proposal, applied atomically on approval.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncChanges {
    #[serde(default)]
    pub added: Vec<Synchronization>,
    #[serde(default)]
    pub modified: Vec<Synchronization>,
    /// Sync names to delete.
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl SyncChanges {
    /// Whether the change set is entirely empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Structured analysis blocks accompanying a proposal. The validator checks
/// invariants against these declarations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_analysis: Option<ApiAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_analysis: Option<MigrationAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_analysis: Option<DependencyAnalysis>,
    #[serde(default)]
    pub modified_regions: Vec<ModifiedRegion>,
    #[serde(default)]
    pub summary: String,
}

/// Declared changes to a concept's exported API surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiAnalysis {
    #[serde(default)]
    pub exports_before: Vec<String>,
    #[serde(default)]
    pub exports_after: Vec<String>,
    #[serde(default)]
    pub additions: Vec<String>,
    #[serde(default)]
    pub removals: Vec<String>,
}

/// Declared store migration operations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MigrationAnalysis {
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub reversible: bool,
    #[serde(default)]
    pub data_loss: bool,
}

/// Declared dependency changes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub changed: Vec<String>,
}

/// A region the proposal claims to have modified, with the file carrying
/// its markers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModifiedRegion {
    pub path: String,
    pub file: String,
    #[serde(default)]
    pub description: String,
}

/// Work queued for a separate researcher session after approval.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeferredAction {
    #[serde(rename = "task_type")]
    pub task_kind: TaskKind,
    pub reason: String,
    pub target_region: String,
}

/// Review severity from the Tier 3 audit loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSeverity {
    RequestChanges,
    Reject,
    EscalateHuman,
}

/// One feedback entry from the Tier 3 review loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewComment {
    pub proposal_id: ProposalId,
    pub iteration: u32,
    pub concern: String,
    pub remediation: String,
    pub severity: ReviewSeverity,
}
