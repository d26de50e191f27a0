//! Flow-log entries: runtime provenance, consumed here for trace queries
//! and the gardener's drift sweep.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use gam_core::flow::FlowEntry;
use gam_core::ids::FlowEntryId;

use crate::errors::Result;
use crate::repositories::{parse_iso, to_iso};

/// Flow-log repository.
pub struct FlowRepository;

impl FlowRepository {
    /// Persist one flow entry.
    pub fn insert(conn: &Connection, entry: &FlowEntry) -> Result<()> {
        conn.execute(
            "INSERT INTO flow_log
                 (id, flow_token, concept_name, action_name, input_args, output_args,
                  sync_name, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.as_str(),
                entry.flow_token,
                entry.concept_name,
                entry.action_name,
                serde_json::to_string(&entry.input_args)?,
                serde_json::to_string(&entry.output_args)?,
                entry.sync_name,
                entry.parent_id.as_ref().map(FlowEntryId::as_str),
                to_iso(entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// All entries of one flow token, oldest first (causal order).
    pub fn trace(conn: &Connection, flow_token: &str) -> Result<Vec<FlowEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, flow_token, concept_name, action_name, input_args, output_args,
                    sync_name, parent_id, created_at
             FROM flow_log WHERE flow_token = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![flow_token], entry_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }

    /// Most recent entries across all flows.
    pub fn list_recent(conn: &Connection, limit: u32) -> Result<Vec<FlowEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, flow_token, concept_name, action_name, input_args, output_args,
                    sync_name, parent_id, created_at
             FROM flow_log ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], entry_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }

    /// How many times `concept/action` completed since `cutoff`.
    pub fn action_completions_since(
        conn: &Connection,
        concept: &str,
        action: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM flow_log
             WHERE concept_name = ?1 AND action_name = ?2 AND created_at > ?3",
            params![concept, action, to_iso(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// How many entries name `sync_name` as their trigger since `cutoff`.
    pub fn sync_firings_since(
        conn: &Connection,
        sync_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM flow_log WHERE sync_name = ?1 AND created_at > ?2",
            params![sync_name, to_iso(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<FlowEntry>> {
    let input_json: String = row.get(4)?;
    let output_json: String = row.get(5)?;
    let created: String = row.get(8)?;

    let build = || -> Result<FlowEntry> {
        Ok(FlowEntry {
            id: FlowEntryId::from(row.get::<_, String>(0)?),
            flow_token: row.get(1)?,
            concept_name: row.get(2)?,
            action_name: row.get(3)?,
            input_args: serde_json::from_str(&input_json)?,
            output_args: serde_json::from_str(&output_json)?,
            sync_name: row.get(6)?,
            parent_id: row.get::<_, Option<String>>(7)?.map(FlowEntryId::from),
            created_at: parse_iso(&created),
        })
    };
    Ok(build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::testutil::setup_conn;

    pub(crate) fn entry(
        token: &str,
        concept: &str,
        action: &str,
        sync: Option<&str>,
        parent: Option<&FlowEntryId>,
    ) -> FlowEntry {
        FlowEntry {
            id: FlowEntryId::new(),
            flow_token: token.to_owned(),
            concept_name: concept.to_owned(),
            action_name: action.to_owned(),
            input_args: serde_json::json!({"terms": "rust"}),
            output_args: serde_json::Value::Null,
            sync_name: sync.map(str::to_owned),
            parent_id: parent.cloned(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn trace_returns_causal_chain() {
        let conn = setup_conn();
        let root = entry("flow-1", "Web", "request", None, None);
        let child = entry("flow-1", "SearchSource", "query", Some("FanOut"), Some(&root.id));
        let other = entry("flow-2", "Web", "request", None, None);
        FlowRepository::insert(&conn, &root).unwrap();
        FlowRepository::insert(&conn, &child).unwrap();
        FlowRepository::insert(&conn, &other).unwrap();

        let chain = FlowRepository::trace(&conn, "flow-1").unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].parent_id.is_none());
        assert_eq!(chain[1].parent_id.as_ref(), Some(&root.id));
        assert_eq!(chain[1].sync_name.as_deref(), Some("FanOut"));
    }

    #[test]
    fn window_counts() {
        let conn = setup_conn();
        FlowRepository::insert(&conn, &entry("f", "Web", "request", None, None)).unwrap();
        FlowRepository::insert(&conn, &entry("f", "Web", "request", Some("Fan"), None)).unwrap();

        let week_ago = Utc::now() - chrono::Duration::days(7);
        assert_eq!(
            FlowRepository::action_completions_since(&conn, "Web", "request", week_ago).unwrap(),
            2
        );
        assert_eq!(FlowRepository::sync_firings_since(&conn, "Fan", week_ago).unwrap(), 1);
        assert_eq!(FlowRepository::sync_firings_since(&conn, "Ghost", week_ago).unwrap(), 0);
    }
}
