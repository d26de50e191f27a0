//! Turns: bounded agent sessions bracketed by start and end.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PlanId, RegionId, TurnId};

/// Agent role owning a turn. Roles are distinguished only by which queue
/// they consume and which task kinds they emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Produces code and proposals.
    #[default]
    Researcher,
    /// Audits proposals and manages plans.
    Memorizer,
}

impl AgentRole {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Memorizer => "memorizer",
        }
    }

    /// Parse a store column value. Unknown values map to `Researcher`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "memorizer" => Self::Memorizer,
            _ => Self::Researcher,
        }
    }
}

/// What kind of work a turn carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Implement,
    ReviewResponse,
    Gardener,
    Fix,
}

impl TaskKind {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Implement => "implement",
            Self::ReviewResponse => "review_response",
            Self::Gardener => "gardener",
            Self::Fix => "fix",
        }
    }

    /// Parse a store column value. Unknown values map to `Implement`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "review_response" => Self::ReviewResponse,
            "gardener" => Self::Gardener,
            "fix" => Self::Fix,
            _ => Self::Implement,
        }
    }
}

/// Lifecycle status of a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnStatus {
    #[default]
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

impl TurnStatus {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }

    /// Parse a store column value. Unknown values map to `Active`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "COMPLETED" => Self::Completed,
            "ABANDONED" => Self::Abandoned,
            _ => Self::Active,
        }
    }
}

/// Snapshot of the region tree: region path to its marker locations,
/// each rendered `file:start-end`.
pub type TreeSnapshot = BTreeMap<String, Vec<String>>;

/// One bounded agent session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub agent_role: AgentRole,
    /// Declared scope; proposals must target descendants of this path.
    pub scope_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    pub task_kind: TaskKind,
    pub status: TurnStatus,
    #[serde(default)]
    pub scratchpad: Option<String>,
    #[serde(default)]
    pub tree_before: Option<TreeSnapshot>,
    #[serde(default)]
    pub tree_after: Option<TreeSnapshot>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a turn did to a region, derived by diffing tree snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRegionAction {
    Created,
    Modified,
    Deleted,
}

impl TurnRegionAction {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    /// Parse a store column value. Unknown values map to `Modified`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "deleted" => Self::Deleted,
            _ => Self::Modified,
        }
    }
}

/// Log row recording that a turn touched a region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRegion {
    pub turn_id: TurnId,
    pub region_id: RegionId,
    pub action: TurnRegionAction,
}

/// Diff two tree snapshots into per-region actions.
///
/// A region present in both snapshots counts as modified only when its
/// location list changed, so an empty turn yields no entries.
#[must_use]
pub fn diff_snapshots(
    before: &TreeSnapshot,
    after: &TreeSnapshot,
) -> BTreeMap<String, TurnRegionAction> {
    let mut out = BTreeMap::new();
    for (path, locations) in after {
        match before.get(path) {
            None => {
                out.insert(path.clone(), TurnRegionAction::Created);
            }
            Some(prev) if prev != locations => {
                out.insert(path.clone(), TurnRegionAction::Modified);
            }
            Some(_) => {}
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            out.insert(path.clone(), TurnRegionAction::Deleted);
        }
    }
    out
}
