//! Execution plans: dependency-ordered multi-turn DAGs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PlanId, TurnId};

/// Lifecycle status of an execution plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    #[default]
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

impl PlanStatus {
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

/// A multi-turn plan toward a single goal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub name: String,
    pub goal: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub quality_grade: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A design choice recorded against an active plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub description: String,
    pub rationale: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub turn_id: Option<TurnId>,
    pub decided_at: DateTime<Utc>,
}

/// Status of one turn within a plan.
///
/// Transitions only move `pending -> active -> completed`; `blocked` is a
/// manual-intervention terminal outside the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTurnStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Blocked,
}

impl PlanTurnStatus {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    /// Parse a store column value. Unknown values map to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "completed" => Self::Completed,
            "blocked" => Self::Blocked,
            _ => Self::Pending,
        }
    }
}

/// One turn's slot within an execution plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanTurn {
    pub plan_id: PlanId,
    pub turn_id: TurnId,
    pub region_path: String,
    pub ordering: i64,
    /// Turn IDs that must complete before this one is released. Must
    /// reference turns declared earlier in the same plan's ordering.
    #[serde(default)]
    pub depends_on: Vec<TurnId>,
    pub status: PlanTurnStatus,
}

/// Requested shape of a plan turn at creation time, before turn IDs exist.
/// `depends_on` indexes into the request list by position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanTurnRequest {
    pub region_path: String,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub prompt: Option<String>,
}
