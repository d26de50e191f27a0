//! Region rows and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RegionId;

/// Lifecycle state of a region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Declared but not yet implemented.
    #[default]
    Draft,
    /// Implementation in progress.
    Implementation,
    /// Under test.
    Testing,
    /// Stable, breaking changes gated.
    Stable,
    /// Retired; markers may be removed.
    Deprecated,
}

impl LifecycleState {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Stable => "stable",
            Self::Deprecated => "deprecated",
        }
    }

    /// Parse a store column value. Unknown values map to `Draft`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "implementation" => Self::Implementation,
            "testing" => Self::Testing,
            "stable" => Self::Stable,
            "deprecated" => Self::Deprecated,
            _ => Self::Draft,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the dotted namespace hierarchy, mirrored from the
/// architecture manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    /// Dotted path, e.g. `app.search.sources.btv2`.
    pub path: String,
    pub description: Option<String>,
    pub lifecycle_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Return the parent path of a dotted path, or `None` for a single segment.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(parent, _)| parent)
}

/// All ancestor paths of `path`, inclusive, longest first.
#[must_use]
pub fn ancestor_paths(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    loop {
        out.push(current);
        match parent_path(current) {
            Some(p) => current = p,
            None => break,
        }
    }
    out
}

/// Whether `path` is a valid dotted namespace: non-empty segments matching
/// `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_namespace(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    path.split('.').all(|seg| {
        let mut chars = seg.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
