//! Synchronizations: declarative when/where/then rules composing concept
//! actions without inter-concept code dependencies.
//!
//! Match cells are tagged [`MatchValue`]s rather than bare strings. On the
//! wire a capture is a `?`-prefixed identifier and a literal is anything
//! else, so the serde form is identical to the original documents while
//! downstream code keeps the literal/capture distinction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::ids::SyncId;

/// A literal value or a `?var` capture in a sync clause cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchValue {
    /// Matches exactly this string.
    Literal(String),
    /// Binds or references the named variable (wire form `?name`).
    Capture(String),
}

impl MatchValue {
    /// Parse the wire form: `?name` is a capture, anything else a literal.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('?') {
            Some(name) if !name.is_empty() => Self::Capture(name.to_owned()),
            _ => Self::Literal(s.to_owned()),
        }
    }

    /// Render the wire form.
    #[must_use]
    pub fn wire(&self) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Capture(name) => format!("?{name}"),
        }
    }

    /// The capture name, if this is a capture.
    #[must_use]
    pub fn capture_name(&self) -> Option<&str> {
        match self {
            Self::Capture(name) => Some(name),
            Self::Literal(_) => None,
        }
    }
}

impl Serialize for MatchValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.wire())
    }
}

impl<'de> Deserialize<'de> for MatchValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl Visitor<'_> for V {
            type Value = MatchValue;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a literal string or a ?var capture")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<MatchValue, E> {
                Ok(MatchValue::parse(v))
            }
        }
        deserializer.deserialize_str(V)
    }
}

/// Matches an action completion in a sync's when clause.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WhenPattern {
    pub concept: String,
    pub action: String,
    #[serde(default)]
    pub input_match: BTreeMap<String, MatchValue>,
    #[serde(default)]
    pub output_match: BTreeMap<String, MatchValue>,
}

/// Queries concept state and binds variables in a sync's where clause.
///
/// `pattern` maps a `?var` to a record of state-field constraints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WherePattern {
    pub concept: String,
    #[serde(default)]
    pub pattern: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bind: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl WherePattern {
    /// All state fields this pattern constrains, across every variable.
    pub fn state_fields(&self) -> impl Iterator<Item = &str> {
        self.pattern.values().flat_map(|fields| fields.keys().map(String::as_str))
    }
}

/// Invokes an action on a concept in a sync's then clause.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThenAction {
    pub concept: String,
    pub action: String,
    #[serde(default)]
    pub args: BTreeMap<String, MatchValue>,
}

/// A named synchronization rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Synchronization {
    pub id: SyncId,
    pub name: String,
    pub when_clause: Vec<WhenPattern>,
    #[serde(default)]
    pub where_clause: Vec<WherePattern>,
    pub then_clause: Vec<ThenAction>,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which clause a sync-ref row was extracted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    When,
    Where,
    Then,
}

impl ClauseKind {
    /// Store column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::When => "when",
            Self::Where => "where",
            Self::Then => "then",
        }
    }

    /// Parse a store column value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "where" => Self::Where,
            "then" => Self::Then,
            _ => Self::When,
        }
    }
}

/// A denormalized projection of one reference inside a sync, indexed for
/// impact analysis ("which syncs break if action X is removed?").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncRef {
    pub sync_id: SyncId,
    pub concept_name: String,
    /// Set for when/then refs.
    pub action_name: Option<String>,
    /// Set for where refs.
    pub state_field: Option<String>,
    pub clause_kind: ClauseKind,
}

impl Synchronization {
    /// Extract the full sync-ref projection of this sync's clauses.
    #[must_use]
    pub fn extract_refs(&self) -> Vec<SyncRef> {
        let mut refs = Vec::new();
        for w in &self.when_clause {
            refs.push(SyncRef {
                sync_id: self.id.clone(),
                concept_name: w.concept.clone(),
                action_name: Some(w.action.clone()),
                state_field: None,
                clause_kind: ClauseKind::When,
            });
        }
        for t in &self.then_clause {
            refs.push(SyncRef {
                sync_id: self.id.clone(),
                concept_name: t.concept.clone(),
                action_name: Some(t.action.clone()),
                state_field: None,
                clause_kind: ClauseKind::Then,
            });
        }
        for w in &self.where_clause {
            for field in w.state_fields() {
                refs.push(SyncRef {
                    sync_id: self.id.clone(),
                    concept_name: w.concept.clone(),
                    action_name: None,
                    state_field: Some(field.to_owned()),
                    clause_kind: ClauseKind::Where,
                });
            }
        }
        refs.sort();
        refs.dedup();
        refs
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
