//! Synchronizations and their denormalized reference index.
//!
//! Sync-refs exist exclusively to answer "which syncs break if I remove
//! action X / field Y?" without parsing clause documents. They are rebuilt
//! (clear + re-insert) whenever a sync is written.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::SyncId;
use gam_core::sync::{ClauseKind, SyncRef, Synchronization, ThenAction, WhenPattern, WherePattern};

use crate::errors::{Result, StoreError};
use crate::repositories::{now_iso, parse_iso};

/// Synchronization repository.
pub struct SyncRepository;

impl SyncRepository {
    /// Insert or update a sync by name and rebuild its refs. Idempotent
    /// for identical bodies.
    pub fn upsert(conn: &Connection, sync: &Synchronization) -> Result<Synchronization> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO synchronizations
                 (id, name, when_clause, where_clause, then_clause, description, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(name) DO UPDATE SET
                 when_clause = excluded.when_clause,
                 where_clause = excluded.where_clause,
                 then_clause = excluded.then_clause,
                 description = excluded.description,
                 enabled = excluded.enabled,
                 updated_at = excluded.updated_at",
            params![
                sync.id.as_str(),
                sync.name,
                serde_json::to_string(&sync.when_clause)?,
                serde_json::to_string(&sync.where_clause)?,
                serde_json::to_string(&sync.then_clause)?,
                sync.description,
                sync.enabled,
                now,
            ],
        )?;

        let stored = Self::get_by_name(conn, &sync.name)?
            .ok_or_else(|| StoreError::not_found("Synchronization", &sync.name))?;
        Self::rebuild_refs(conn, &stored)?;
        Ok(stored)
    }

    /// Delete a sync by name (refs cascade). Returns true when a row went.
    pub fn delete(conn: &Connection, name: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM synchronizations WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    /// Fetch a sync by name.
    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Synchronization>> {
        let row = conn
            .query_row(
                "SELECT id, name, when_clause, where_clause, then_clause, description, enabled,
                        created_at, updated_at
                 FROM synchronizations WHERE name = ?1",
                params![name],
                sync_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// All syncs ordered by name; optionally only enabled ones.
    pub fn list(conn: &Connection, enabled_only: bool) -> Result<Vec<Synchronization>> {
        let sql = if enabled_only {
            "SELECT id, name, when_clause, where_clause, then_clause, description, enabled,
                    created_at, updated_at
             FROM synchronizations WHERE enabled = 1 ORDER BY name"
        } else {
            "SELECT id, name, when_clause, where_clause, then_clause, description, enabled,
                    created_at, updated_at
             FROM synchronizations ORDER BY name"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], sync_from_row)?;
        let mut syncs = Vec::new();
        for row in rows {
            syncs.push(row??);
        }
        Ok(syncs)
    }

    /// Clear and re-insert the ref rows for one sync.
    pub fn rebuild_refs(conn: &Connection, sync: &Synchronization) -> Result<()> {
        conn.execute("DELETE FROM sync_refs WHERE sync_id = ?1", params![sync.id.as_str()])?;
        for r in sync.extract_refs() {
            conn.execute(
                "INSERT INTO sync_refs (sync_id, concept_name, action_name, state_field, clause_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT DO NOTHING",
                params![
                    r.sync_id.as_str(),
                    r.concept_name,
                    r.action_name,
                    r.state_field,
                    r.clause_kind.as_str(),
                ],
            )?;
        }
        Ok(())
    }

    /// Ref rows for one sync, ordered for comparison.
    pub fn refs_for_sync(conn: &Connection, sync_id: &SyncId) -> Result<Vec<SyncRef>> {
        let mut stmt = conn.prepare(
            "SELECT sync_id, concept_name, action_name, state_field, clause_type
             FROM sync_refs WHERE sync_id = ?1
             ORDER BY clause_type, concept_name, action_name, state_field",
        )?;
        let refs = stmt
            .query_map(params![sync_id.as_str()], |row| {
                let kind: String = row.get(4)?;
                Ok(SyncRef {
                    sync_id: SyncId::from(row.get::<_, String>(0)?),
                    concept_name: row.get(1)?,
                    action_name: row.get(2)?,
                    state_field: row.get(3)?,
                    clause_kind: ClauseKind::parse(&kind),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    /// Names of enabled syncs whose refs mention `action`, for orphan
    /// prevention and impact analysis.
    pub fn enabled_syncs_referencing_action(
        conn: &Connection,
        action: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.name
             FROM sync_refs sr
             JOIN synchronizations s ON s.id = sr.sync_id
             WHERE sr.action_name = ?1 AND s.enabled = 1
             ORDER BY s.name",
        )?;
        let names = stmt
            .query_map(params![action], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Names of enabled syncs whose refs mention `concept`.
    pub fn enabled_syncs_referencing_concept(
        conn: &Connection,
        concept: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.name
             FROM sync_refs sr
             JOIN synchronizations s ON s.id = sr.sync_id
             WHERE sr.concept_name = ?1 AND s.enabled = 1
             ORDER BY s.name",
        )?;
        let names = stmt
            .query_map(params![concept], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// `(sync_name, concept, action)` triples for enabled syncs' when
    /// clauses, used by the gardener's drift sweep.
    pub fn enabled_when_refs(conn: &Connection) -> Result<Vec<(String, String, String)>> {
        let mut stmt = conn.prepare(
            "SELECT s.name, sr.concept_name, sr.action_name
             FROM sync_refs sr
             JOIN synchronizations s ON s.id = sr.sync_id
             WHERE s.enabled = 1 AND sr.clause_type = 'when' AND sr.action_name IS NOT NULL
             ORDER BY s.name",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn sync_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Synchronization>> {
    let when_json: String = row.get(2)?;
    let where_json: String = row.get(3)?;
    let then_json: String = row.get(4)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;

    let build = || -> Result<Synchronization> {
        let when_clause: Vec<WhenPattern> = serde_json::from_str(&when_json)?;
        let where_clause: Vec<WherePattern> = serde_json::from_str(&where_json)?;
        let then_clause: Vec<ThenAction> = serde_json::from_str(&then_json)?;
        Ok(Synchronization {
            id: SyncId::from(row.get::<_, String>(0)?),
            name: row.get(1)?,
            when_clause,
            where_clause,
            then_clause,
            description: row.get(5)?,
            enabled: row.get(6)?,
            created_at: parse_iso(&created),
            updated_at: parse_iso(&updated),
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
    use gam_core::sync::MatchValue;
    use std::collections::BTreeMap;

    pub(crate) fn sample_sync(name: &str) -> Synchronization {
        Synchronization {
            id: SyncId::new(),
            name: name.to_owned(),
            when_clause: vec![WhenPattern {
                concept: "Web".into(),
                action: "request".into(),
                input_match: BTreeMap::from([("terms".to_owned(), MatchValue::parse("?terms"))]),
                output_match: BTreeMap::new(),
            }],
            where_clause: vec![WherePattern {
                concept: "SearchSource".into(),
                pattern: BTreeMap::from([(
                    "?s".to_owned(),
                    BTreeMap::from([("enabled".to_owned(), serde_json::Value::Bool(true))]),
                )]),
                optional: false,
                bind: BTreeMap::new(),
                filter: None,
            }],
            then_clause: vec![ThenAction {
                concept: "SearchSource".into(),
                action: "query".into(),
                args: BTreeMap::from([("terms".to_owned(), MatchValue::parse("?terms"))]),
            }],
            description: String::new(),
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn upsert_roundtrips_clauses() {
        let conn = setup_conn();
        SyncRepository::upsert(&conn, &sample_sync("FanOut")).unwrap();

        let back = SyncRepository::get_by_name(&conn, "FanOut").unwrap().unwrap();
        assert_eq!(back.when_clause[0].action, "request");
        assert_eq!(
            back.when_clause[0].input_match["terms"],
            MatchValue::Capture("terms".into())
        );
        assert_eq!(back.then_clause[0].concept, "SearchSource");
    }

    #[test]
    fn upsert_is_idempotent_by_name() {
        let conn = setup_conn();
        let first = SyncRepository::upsert(&conn, &sample_sync("FanOut")).unwrap();
        let second = SyncRepository::upsert(&conn, &sample_sync("FanOut")).unwrap();
        assert_eq!(first.id, second.id, "same row updated, not duplicated");
        assert_eq!(SyncRepository::list(&conn, false).unwrap().len(), 1);
    }

    #[test]
    fn refs_exactly_cover_clauses() {
        let conn = setup_conn();
        let stored = SyncRepository::upsert(&conn, &sample_sync("FanOut")).unwrap();

        let refs = SyncRepository::refs_for_sync(&conn, &stored.id).unwrap();
        let mut expected = stored.extract_refs();
        expected.sort_by(|a, b| {
            (a.clause_kind, &a.concept_name, &a.action_name, &a.state_field).cmp(&(
                b.clause_kind,
                &b.concept_name,
                &b.action_name,
                &b.state_field,
            ))
        });
        let mut got = refs.clone();
        got.sort_by(|a, b| {
            (a.clause_kind, &a.concept_name, &a.action_name, &a.state_field).cmp(&(
                b.clause_kind,
                &b.concept_name,
                &b.action_name,
                &b.state_field,
            ))
        });
        assert_eq!(got, expected);
    }

    #[test]
    fn action_reference_lookup_filters_disabled() {
        let conn = setup_conn();
        SyncRepository::upsert(&conn, &sample_sync("Live")).unwrap();
        let mut disabled = sample_sync("Dormant");
        disabled.enabled = false;
        SyncRepository::upsert(&conn, &disabled).unwrap();

        let names = SyncRepository::enabled_syncs_referencing_action(&conn, "query").unwrap();
        assert_eq!(names, vec!["Live"]);
    }

    #[test]
    fn delete_cascades_refs() {
        let conn = setup_conn();
        let stored = SyncRepository::upsert(&conn, &sample_sync("FanOut")).unwrap();
        assert!(SyncRepository::delete(&conn, "FanOut").unwrap());
        assert!(SyncRepository::refs_for_sync(&conn, &stored.id).unwrap().is_empty());
        assert!(!SyncRepository::delete(&conn, "FanOut").unwrap());
    }
}
