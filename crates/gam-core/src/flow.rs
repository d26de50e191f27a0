//! Flow-log entries: runtime provenance records forming a causal DAG.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::FlowEntryId;

/// One action completion in the runtime provenance log. Entries sharing a
/// flow token belong to one request; `parent_id` links the causal chain,
/// with roots at `None`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEntry {
    pub id: FlowEntryId,
    pub flow_token: String,
    pub concept_name: String,
    pub action_name: String,
    #[serde(default)]
    pub input_args: serde_json::Value,
    #[serde(default)]
    pub output_args: serde_json::Value,
    /// The sync whose then-clause triggered this action, if any.
    #[serde(default)]
    pub sync_name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<FlowEntryId>,
    pub created_at: DateTime<Utc>,
}
