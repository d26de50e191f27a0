//! Branded ID newtypes for type safety.
//!
//! Every entity has a distinct ID type implemented as a newtype wrapper
//! around `String`, so a proposal ID cannot be passed where a plan ID is
//! expected. Most IDs are prefixed UUID v7 (time-ordered). Turn IDs carry
//! a human-scannable UTC timestamp instead: `T_<YYYYMMDD>_<HHMMSS>_<6 hex>`.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a prefixed UUID v7 string (time-ordered).
fn prefixed_v7(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (prefixed UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(prefixed_v7($prefix))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a region row.
    RegionId, "rgn"
}

branded_id! {
    /// Unique identifier for a concept.
    ConceptId, "cpt"
}

branded_id! {
    /// Unique identifier for a synchronization.
    SyncId, "syn"
}

branded_id! {
    /// Unique identifier for a proposal.
    ProposalId, "prp"
}

branded_id! {
    /// Unique identifier for an execution plan.
    PlanId, "pln"
}

branded_id! {
    /// Unique identifier for a flow-log entry.
    FlowEntryId, "flw"
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnId — timestamped format, not UUID
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier for one bounded agent session.
///
/// Format: `T_<YYYYMMDD>_<HHMMSS>_<6 lowercase hex>`, UTC. The random
/// suffix gives 2^24 distinctions within one second.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    /// Generate a fresh turn ID stamped with the current UTC time.
    #[must_use]
    pub fn generate() -> Self {
        let now = Utc::now();
        let entropy = Uuid::new_v4();
        let bytes = entropy.as_bytes();
        Self(format!(
            "T_{}_{}_{:02x}{:02x}{:02x}",
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            bytes[0],
            bytes[1],
            bytes[2],
        ))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for TurnId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TurnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TurnId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<TurnId> for String {
    fn from(id: TurnId) -> Self {
        id.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ids_carry_their_prefix() {
        assert!(RegionId::new().as_str().starts_with("rgn-"));
        assert!(ConceptId::new().as_str().starts_with("cpt-"));
        assert!(ProposalId::new().as_str().starts_with("prp-"));
        assert!(PlanId::new().as_str().starts_with("pln-"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ProposalId::new(), ProposalId::new());
    }

    #[test]
    fn turn_id_format() {
        let id = TurnId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "T");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[3]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn turn_ids_within_one_second_do_not_collide() {
        let ids: Vec<TurnId> = (0..64).map(|_| TurnId::generate()).collect();
        let mut dedup = ids.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), ids.len());
    }

    #[test]
    fn serde_roundtrip() {
        let id = TurnId::from("T_20260101_120000_ab12cd");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"T_20260101_120000_ab12cd\"");
        let back: TurnId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
