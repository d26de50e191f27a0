//! Concepts: self-contained capabilities with declared state machines,
//! typed actions, and invariants.
//!
//! Concept specs deliberately forbid cross-concept references; generality
//! comes from type parameters instead. The store never represents
//! concept-to-concept edges.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConceptId, RegionId};

/// A self-contained unit of user-facing functionality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    pub purpose: String,
    pub spec: ConceptSpec,
    pub state_machine: StateMachine,
    pub invariants: Vec<Invariant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The full concept specification: type parameters, relational state,
/// actions, and an operational principle scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConceptSpec {
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub state: BTreeMap<String, StateComponent>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSpec>,
    #[serde(default)]
    pub operational_principle: String,
}

impl ConceptSpec {
    /// Whether the spec declares an action with this name.
    #[must_use]
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Whether the spec declares a state component with this name.
    #[must_use]
    pub fn has_state_field(&self, field: &str) -> bool {
        self.state.contains_key(field)
    }
}

/// A relational state component: a named set or a binary mapping with
/// typed endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateComponent {
    /// `field: set T`
    Set { of: String },
    /// `field: A -> B`
    Map { from: String, to: String },
}

/// A named operation; each case pairs a typed input pattern with a typed
/// output pattern (success vs error outputs are separate cases).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionSpec {
    pub cases: Vec<ActionCase>,
}

/// One case of an action.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionCase {
    #[serde(default)]
    pub input: BTreeMap<String, String>,
    #[serde(default)]
    pub output: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
}

/// States and legal transitions for a concept.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateMachine {
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StateMachine {
    /// Whether `(from, to, action)` is a declared transition.
    #[must_use]
    pub fn is_legal(&self, from: &str, to: &str, action: &str) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to && t.action == action)
    }

    /// Human-readable list of legal transitions out of `from`, for fix text.
    #[must_use]
    pub fn transitions_from(&self, from: &str) -> String {
        let list: Vec<String> = self
            .transitions
            .iter()
            .filter(|t| t.from == from)
            .map(|t| format!("{}->{} via {}", t.from, t.to, t.action))
            .collect();
        if list.is_empty() {
            "(none)".to_owned()
        } else {
            format!("[{}]", list.join(", "))
        }
    }
}

/// A legal state transition via an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub action: String,
}

/// Classification of an invariant, driving how the validator evaluates it
/// against proposal evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    Representation,
    Abstract,
    Api,
    Migration,
    Dependency,
}

impl InvariantKind {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Representation => "representation",
            Self::Abstract => "abstract",
            Self::Api => "api",
            Self::Migration => "migration",
            Self::Dependency => "dependency",
        }
    }
}

/// A rule that must always hold for a concept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InvariantKind,
    /// Textual rule for representation/abstract invariants; carried but
    /// not evaluated by the core validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Per-invariant configuration, e.g. `{"no_removals": true}` or
    /// `{"forbidden": ["DROP_COLUMN"]}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
}

/// Role a concept plays relative to an assigned region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    #[default]
    Implementation,
    Integration,
    Test,
    Consumer,
}

impl AssignmentRole {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Implementation => "implementation",
            Self::Integration => "integration",
            Self::Test => "test",
            Self::Consumer => "consumer",
        }
    }

    /// Parse a store column value. Unknown values map to `Implementation`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "integration" => Self::Integration,
            "test" => Self::Test,
            "consumer" => Self::Consumer,
            _ => Self::Implementation,
        }
    }
}

/// Many-to-many link between a concept and a region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConceptRegionAssignment {
    pub concept_id: ConceptId,
    pub region_id: RegionId,
    pub role: AssignmentRole,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> ConceptSpec {
        let mut state = BTreeMap::new();
        state.insert("sources".to_owned(), StateComponent::Set { of: "S".into() });
        state.insert(
            "name".to_owned(),
            StateComponent::Map {
                from: "S".into(),
                to: "string".into(),
            },
        );

        let mut actions = BTreeMap::new();
        actions.insert(
            "register".to_owned(),
            ActionSpec {
                cases: vec![
                    ActionCase {
                        input: BTreeMap::from([
                            ("source".to_owned(), "S".to_owned()),
                            ("name".to_owned(), "string".to_owned()),
                        ]),
                        output: BTreeMap::from([("source".to_owned(), "S".to_owned())]),
                        description: "add source, set enabled true".to_owned(),
                    },
                    ActionCase {
                        input: BTreeMap::from([("source".to_owned(), "S".to_owned())]),
                        output: BTreeMap::from([("error".to_owned(), "string".to_owned())]),
                        description: "if name not unique".to_owned(),
                    },
                ],
            },
        );

        ConceptSpec {
            type_params: vec!["S".to_owned()],
            state,
            actions,
            operational_principle: "after register => query succeeds".to_owned(),
        }
    }

    #[test]
    fn spec_serialization_roundtrip() {
        let spec = sample_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: ConceptSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.type_params, vec!["S"]);
        assert_eq!(back.state.len(), 2);
        assert_eq!(back.actions["register"].cases.len(), 2);
        assert!(back.has_action("register"));
        assert!(!back.has_action("deregister"));
        assert!(back.has_state_field("sources"));
    }

    #[test]
    fn state_component_tags() {
        let json = serde_json::to_string(&StateComponent::Set { of: "S".into() }).unwrap();
        assert!(json.contains("\"type\":\"set\""));
        let json =
            serde_json::to_string(&StateComponent::Map { from: "A".into(), to: "B".into() })
                .unwrap();
        assert!(json.contains("\"type\":\"map\""));
    }

    #[test]
    fn state_machine_legality() {
        let sm = StateMachine {
            states: vec!["ACTIVE".into(), "DISABLED".into()],
            transitions: vec![
                Transition { from: "ACTIVE".into(), to: "DISABLED".into(), action: "disable".into() },
                Transition { from: "DISABLED".into(), to: "ACTIVE".into(), action: "enable".into() },
            ],
        };
        assert!(sm.is_legal("ACTIVE", "DISABLED", "disable"));
        assert!(!sm.is_legal("ACTIVE", "ACTIVE", "disable"));
        assert!(sm.transitions_from("ACTIVE").contains("via disable"));
        assert_eq!(sm.transitions_from("GONE"), "(none)");
    }

    #[test]
    fn invariant_kind_serde() {
        let inv = Invariant {
            name: "api_stability".into(),
            kind: InvariantKind::Api,
            rule: None,
            config: Some(BTreeMap::from([(
                "no_removals".to_owned(),
                serde_json::Value::Bool(true),
            )])),
        };
        let json = serde_json::to_string(&inv).unwrap();
        assert!(json.contains("\"type\":\"api\""));
        let back: Invariant = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, InvariantKind::Api);
    }
}
