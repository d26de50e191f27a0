//! Quality grades, golden principles, and gardener findings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RegionId;

/// A per-region quality assessment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityGrade {
    pub region_id: RegionId,
    pub category: String,
    pub grade: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub assessed_at: DateTime<Utc>,
    pub assessed_by: String,
}

/// A mechanical coherence rule applied across regions (naming, size,
/// shared utilities).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoldenPrinciple {
    pub name: String,
    pub rule: String,
    #[serde(default)]
    pub lint_check: Option<String>,
    pub remediation: String,
    pub enabled: bool,
}

/// Category of an entropy finding from the gardener sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    StaleTodo,
    OrphanedRegion,
    SyncDrift,
    SpecDivergence,
    StaleDocs,
    Duplication,
    QualityDegradation,
    PrincipleViolation,
}

impl FindingCategory {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StaleTodo => "stale_todo",
            Self::OrphanedRegion => "orphaned_region",
            Self::SyncDrift => "sync_drift",
            Self::SpecDivergence => "spec_divergence",
            Self::StaleDocs => "stale_docs",
            Self::Duplication => "duplication",
            Self::QualityDegradation => "quality_degradation",
            Self::PrincipleViolation => "principle_violation",
        }
    }

    /// Parse a store column value. Unknown values map to `SpecDivergence`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "stale_todo" => Self::StaleTodo,
            "orphaned_region" => Self::OrphanedRegion,
            "sync_drift" => Self::SyncDrift,
            "stale_docs" => Self::StaleDocs,
            "duplication" => Self::Duplication,
            "quality_degradation" => Self::QualityDegradation,
            "principle_violation" => Self::PrincipleViolation,
            _ => Self::SpecDivergence,
        }
    }
}

/// An entropy issue discovered by the gardener. Mechanical findings can be
/// fixed without human judgment and are enqueued as fix-up turns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GardenFinding {
    /// Empty when the finding is not attributable to one region.
    pub region_path: String,
    pub category: FindingCategory,
    pub description: String,
    pub mechanical: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_roundtrip() {
        for c in [
            FindingCategory::StaleTodo,
            FindingCategory::OrphanedRegion,
            FindingCategory::SyncDrift,
            FindingCategory::SpecDivergence,
            FindingCategory::StaleDocs,
            FindingCategory::Duplication,
            FindingCategory::QualityDegradation,
            FindingCategory::PrincipleViolation,
        ] {
            assert_eq!(FindingCategory::parse(c.as_str()), c);
        }
    }
}
