//! Turns, turn-region logs, and scratchpad memory queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::{PlanId, RegionId, TurnId};
use gam_core::turn::{AgentRole, TaskKind, TreeSnapshot, Turn, TurnRegionAction, TurnStatus};

use crate::errors::Result;
use crate::repositories::{ancestor_of, descendant_of, now_iso, parse_iso, to_iso};

/// A scratchpad retrieved by one of the memory strategies.
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    pub turn_id: TurnId,
    pub scope_path: String,
    pub scratchpad: String,
    pub completed_at: Option<DateTime<Utc>>,
    /// Only set by the similarity strategy.
    pub similarity: Option<f64>,
}

/// Turn repository.
pub struct TurnRepository;

impl TurnRepository {
    /// Persist a new turn.
    pub fn insert(conn: &Connection, turn: &Turn) -> Result<()> {
        conn.execute(
            "INSERT INTO turns (id, agent_role, scope_path, plan_id, task_type, scratchpad,
                                status, tree_before, tree_after, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                turn.id.as_str(),
                turn.agent_role.as_str(),
                turn.scope_path,
                turn.plan_id.as_ref().map(PlanId::as_str),
                turn.task_kind.as_str(),
                turn.scratchpad,
                turn.status.as_str(),
                turn.tree_before.as_ref().map(serde_json::to_string).transpose()?,
                turn.tree_after.as_ref().map(serde_json::to_string).transpose()?,
                to_iso(turn.created_at),
                turn.completed_at.map(to_iso),
            ],
        )?;
        Ok(())
    }

    /// Fetch a turn by id.
    pub fn get(conn: &Connection, id: &TurnId) -> Result<Option<Turn>> {
        let row = conn
            .query_row(
                "SELECT id, agent_role, scope_path, plan_id, task_type, scratchpad, status,
                        tree_before, tree_after, created_at, completed_at
                 FROM turns WHERE id = ?1",
                params![id.as_str()],
                turn_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// The most recently started `ACTIVE` turn, if any.
    pub fn latest_active(conn: &Connection) -> Result<Option<Turn>> {
        let row = conn
            .query_row(
                "SELECT id, agent_role, scope_path, plan_id, task_type, scratchpad, status,
                        tree_before, tree_after, created_at, completed_at
                 FROM turns WHERE status = 'ACTIVE' ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                turn_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// All `ACTIVE` turns, newest first.
    pub fn active(conn: &Connection) -> Result<Vec<Turn>> {
        let mut stmt = conn.prepare(
            "SELECT id, agent_role, scope_path, plan_id, task_type, scratchpad, status,
                    tree_before, tree_after, created_at, completed_at
             FROM turns WHERE status = 'ACTIVE' ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], turn_from_row)?;
        let mut turns = Vec::new();
        for row in rows {
            turns.push(row??);
        }
        Ok(turns)
    }

    /// Complete a turn: persist scratchpad, the after snapshot, and the
    /// completion timestamp.
    pub fn complete(
        conn: &Connection,
        id: &TurnId,
        scratchpad: &str,
        tree_after: &TreeSnapshot,
    ) -> Result<()> {
        conn.execute(
            "UPDATE turns
             SET scratchpad = ?1, status = 'COMPLETED', completed_at = ?2, tree_after = ?3
             WHERE id = ?4",
            params![
                scratchpad,
                now_iso(),
                serde_json::to_string(tree_after)?,
                id.as_str()
            ],
        )?;
        Ok(())
    }

    /// Mark a turn abandoned.
    pub fn abandon(conn: &Connection, id: &TurnId) -> Result<()> {
        conn.execute(
            "UPDATE turns SET status = 'ABANDONED', completed_at = ?1 WHERE id = ?2",
            params![now_iso(), id.as_str()],
        )?;
        Ok(())
    }

    /// Upsert one turn-region log row.
    pub fn upsert_turn_region(
        conn: &Connection,
        turn_id: &TurnId,
        region_id: &RegionId,
        action: TurnRegionAction,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO turn_regions (turn_id, region_id, action) VALUES (?1, ?2, ?3)
             ON CONFLICT(turn_id, region_id) DO UPDATE SET action = excluded.action",
            params![turn_id.as_str(), region_id.as_str(), action.as_str()],
        )?;
        Ok(())
    }

    /// `(region_path, action)` rows for one turn, ordered for display.
    pub fn turn_regions(
        conn: &Connection,
        turn_id: &TurnId,
    ) -> Result<Vec<(String, TurnRegionAction)>> {
        let mut stmt = conn.prepare(
            "SELECT r.path, tr.action
             FROM turn_regions tr
             JOIN regions r ON r.id = tr.region_id
             WHERE tr.turn_id = ?1
             ORDER BY tr.action, r.path",
        )?;
        let rows = stmt
            .query_map(params![turn_id.as_str()], |row| {
                let action: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, TurnRegionAction::parse(&action)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Region-scoped memory: completed turns that touched an ancestor or
    /// descendant of `region_path`, newest completion first.
    pub fn region_scoped_memory(
        conn: &Connection,
        region_path: &str,
        limit: u32,
    ) -> Result<Vec<MemoryEntry>> {
        let sql = format!(
            "SELECT DISTINCT t.scratchpad, t.id, t.scope_path, t.completed_at
             FROM turns t
             JOIN turn_regions tr ON tr.turn_id = t.id
             JOIN regions r ON r.id = tr.region_id
             WHERE ({} OR {})
               AND t.scratchpad IS NOT NULL AND t.status = 'COMPLETED'
             ORDER BY t.completed_at DESC
             LIMIT ?2",
            ancestor_of("r.path", "?1"),
            descendant_of("r.path", "?1")
        );
        Self::memory_query(conn, &sql, params![region_path, limit])
    }

    /// Concept-scoped memory: completed turns that touched any region
    /// assigned to one of `concept_names`.
    pub fn concept_scoped_memory(
        conn: &Connection,
        concept_names: &[String],
        limit: u32,
    ) -> Result<Vec<MemoryEntry>> {
        if concept_names.is_empty() {
            return Ok(Vec::new());
        }
        // Dynamic IN list; names are bound, not interpolated.
        let placeholders: Vec<String> =
            (0..concept_names.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT DISTINCT t.scratchpad, t.id, t.scope_path, t.completed_at
             FROM turns t
             JOIN turn_regions tr ON tr.turn_id = t.id
             JOIN concept_region_assignments cra ON cra.region_id = tr.region_id
             JOIN concepts c ON c.id = cra.concept_id
             WHERE c.name IN ({}) AND t.scratchpad IS NOT NULL AND t.status = 'COMPLETED'
             ORDER BY t.completed_at DESC
             LIMIT ?{}",
            placeholders.join(", "),
            concept_names.len() + 1,
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = concept_names
            .iter()
            .map(|n| Box::new(n.clone()) as Box<dyn rusqlite::types::ToSql>)
            .collect();
        values.push(Box::new(limit));
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();
        Self::memory_query(conn, &sql, refs.as_slice())
    }

    fn memory_query<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<MemoryEntry>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                let completed: Option<String> = row.get(3)?;
                Ok(MemoryEntry {
                    scratchpad: row.get(0)?,
                    turn_id: TurnId::from(row.get::<_, String>(1)?),
                    scope_path: row.get(2)?,
                    completed_at: completed.as_deref().map(parse_iso),
                    similarity: None,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Similarity-ranked memory across all scratchpads, scored by the
    /// store's `similarity` function against `query`.
    pub fn similar_scratchpads(
        conn: &Connection,
        query: &str,
        min_similarity: f64,
        limit: u32,
    ) -> Result<Vec<MemoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT t.id, t.scope_path, t.scratchpad, t.completed_at,
                    similarity(t.scratchpad, ?1) AS sim
             FROM turns t
             WHERE t.scratchpad IS NOT NULL AND similarity(t.scratchpad, ?1) > ?2
             ORDER BY sim DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![query, min_similarity, limit], |row| {
                let completed: Option<String> = row.get(3)?;
                Ok(MemoryEntry {
                    turn_id: TurnId::from(row.get::<_, String>(0)?),
                    scope_path: row.get(1)?,
                    scratchpad: row.get(2)?,
                    completed_at: completed.as_deref().map(parse_iso),
                    similarity: Some(row.get(4)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Completed turns older than `cutoff` whose scratchpad still says
    /// TODO, with no later turn touching a descendant of their scope.
    pub fn stale_todo_turns(
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(TurnId, String, String)>> {
        let sql = format!(
            "SELECT t.id, t.scratchpad, t.scope_path
             FROM turns t
             WHERE t.scratchpad LIKE '%TODO%'
               AND t.status = 'COMPLETED'
               AND t.completed_at < ?1
               AND NOT EXISTS (
                   SELECT 1 FROM turns t2
                   JOIN turn_regions tr2 ON tr2.turn_id = t2.id
                   JOIN regions r2 ON r2.id = tr2.region_id
                   WHERE {}
                     AND t2.created_at > t.completed_at
               )
             ORDER BY t.completed_at",
            descendant_of("r2.path", "t.scope_path")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![to_iso(cutoff)], |row| {
                Ok((
                    TurnId::from(row.get::<_, String>(0)?),
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn turn_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Turn>> {
    let role: String = row.get(1)?;
    let task: String = row.get(4)?;
    let status: String = row.get(6)?;
    let before_json: Option<String> = row.get(7)?;
    let after_json: Option<String> = row.get(8)?;
    let created: String = row.get(9)?;
    let completed: Option<String> = row.get(10)?;

    let build = || -> Result<Turn> {
        Ok(Turn {
            id: TurnId::from(row.get::<_, String>(0)?),
            agent_role: AgentRole::parse(&role),
            scope_path: row.get(2)?,
            plan_id: row.get::<_, Option<String>>(3)?.map(PlanId::from),
            task_kind: TaskKind::parse(&task),
            scratchpad: row.get(5)?,
            status: TurnStatus::parse(&status),
            tree_before: before_json.as_deref().map(serde_json::from_str).transpose()?,
            tree_after: after_json.as_deref().map(serde_json::from_str).transpose()?,
            created_at: parse_iso(&created),
            completed_at: completed.as_deref().map(parse_iso),
        })
    };
    Ok(build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repositories::testutil::setup_conn;
    use crate::repositories::{ConceptRepository, RegionRepository};
    use gam_core::concept::{AssignmentRole, ConceptSpec, StateMachine};

    pub(crate) fn new_turn(id: &str, scope: &str) -> Turn {
        Turn {
            id: TurnId::from(id),
            agent_role: AgentRole::Researcher,
            scope_path: scope.to_owned(),
            plan_id: None,
            task_kind: TaskKind::Implement,
            status: TurnStatus::Active,
            scratchpad: None,
            tree_before: None,
            tree_after: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn complete_with(conn: &Connection, id: &str, scope: &str, scratchpad: &str, region: &str) {
        let turn = new_turn(id, scope);
        TurnRepository::insert(conn, &turn).unwrap();
        TurnRepository::complete(conn, &turn.id, scratchpad, &TreeSnapshot::new()).unwrap();
        let region = RegionRepository::get_by_path(conn, region).unwrap().unwrap();
        TurnRepository::upsert_turn_region(conn, &turn.id, &region.id, TurnRegionAction::Modified)
            .unwrap();
    }

    #[test]
    fn insert_and_complete_roundtrip() {
        let conn = setup_conn();
        let mut turn = new_turn("T_20260101_000000_aaaaaa", "app");
        turn.tree_before = Some(TreeSnapshot::from([(
            "app".to_owned(),
            vec!["a.rs:1-2".to_owned()],
        )]));
        TurnRepository::insert(&conn, &turn).unwrap();

        let after = TreeSnapshot::from([("app".to_owned(), vec!["a.rs:1-4".to_owned()])]);
        TurnRepository::complete(&conn, &turn.id, "did things", &after).unwrap();

        let back = TurnRepository::get(&conn, &turn.id).unwrap().unwrap();
        assert_eq!(back.status, TurnStatus::Completed);
        assert_eq!(back.scratchpad.as_deref(), Some("did things"));
        assert_eq!(back.tree_before.unwrap()["app"], vec!["a.rs:1-2"]);
        assert_eq!(back.tree_after.unwrap()["app"], vec!["a.rs:1-4"]);
        assert!(back.completed_at.is_some());
    }

    #[test]
    fn latest_active_prefers_newest() {
        let conn = setup_conn();
        TurnRepository::insert(&conn, &new_turn("T_20260101_000000_aaaaaa", "app")).unwrap();
        TurnRepository::insert(&conn, &new_turn("T_20260101_000001_bbbbbb", "app.x")).unwrap();
        // Same stored second; id tiebreak picks the later insert.
        let latest = TurnRepository::latest_active(&conn).unwrap().unwrap();
        assert_eq!(latest.scope_path, "app.x");
    }

    #[test]
    fn turn_region_upsert_overwrites_action() {
        let conn = setup_conn();
        RegionRepository::insert_if_absent(&conn, "app").unwrap();
        let region = RegionRepository::get_by_path(&conn, "app").unwrap().unwrap();
        let turn = new_turn("T_20260101_000000_cccccc", "app");
        TurnRepository::insert(&conn, &turn).unwrap();

        TurnRepository::upsert_turn_region(&conn, &turn.id, &region.id, TurnRegionAction::Created)
            .unwrap();
        TurnRepository::upsert_turn_region(&conn, &turn.id, &region.id, TurnRegionAction::Deleted)
            .unwrap();

        let rows = TurnRepository::turn_regions(&conn, &turn.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, TurnRegionAction::Deleted);
    }

    #[test]
    fn region_memory_spans_ancestors_and_descendants() {
        let conn = setup_conn();
        for path in ["app", "app.search", "app.search.deep", "web"] {
            RegionRepository::insert_if_absent(&conn, path).unwrap();
        }
        complete_with(&conn, "T_20260101_000000_aaaaaa", "app", "touched ancestor", "app");
        complete_with(
            &conn,
            "T_20260101_000001_bbbbbb",
            "app.search.deep",
            "touched descendant",
            "app.search.deep",
        );
        complete_with(&conn, "T_20260101_000002_cccccc", "web", "unrelated", "web");

        let memory = TurnRepository::region_scoped_memory(&conn, "app.search", 10).unwrap();
        let pads: Vec<&str> = memory.iter().map(|m| m.scratchpad.as_str()).collect();
        assert!(pads.contains(&"touched ancestor"));
        assert!(pads.contains(&"touched descendant"));
        assert!(!pads.contains(&"unrelated"));
    }

    #[test]
    fn concept_memory_follows_assignments() {
        let conn = setup_conn();
        RegionRepository::insert_if_absent(&conn, "app").unwrap();
        RegionRepository::insert_if_absent(&conn, "web").unwrap();
        ConceptRepository::upsert(&conn, "Search", "", &ConceptSpec::default(), &StateMachine::default(), &[])
            .unwrap();
        ConceptRepository::assign(&conn, "Search", "app", AssignmentRole::Implementation).unwrap();

        complete_with(&conn, "T_20260101_000000_aaaaaa", "app", "search work", "app");
        complete_with(&conn, "T_20260101_000001_bbbbbb", "web", "web work", "web");

        let memory =
            TurnRepository::concept_scoped_memory(&conn, &["Search".to_owned()], 10).unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].scratchpad, "search work");
    }

    #[test]
    fn similarity_memory_ranks_and_thresholds() {
        let conn = setup_conn();
        RegionRepository::insert_if_absent(&conn, "app").unwrap();
        complete_with(
            &conn,
            "T_20260101_000000_aaaaaa",
            "app",
            "implemented retry logic for search sources",
            "app",
        );
        complete_with(&conn, "T_20260101_000001_bbbbbb", "app", "styled the dashboard", "app");

        let memory =
            TurnRepository::similar_scratchpads(&conn, "retry logic for search", 0.1, 5).unwrap();
        assert_eq!(memory.len(), 1);
        assert!(memory[0].scratchpad.contains("retry"));
        assert!(memory[0].similarity.unwrap() > 0.1);
    }

    #[test]
    fn stale_todos_skip_scopes_with_later_activity() {
        let conn = setup_conn();
        RegionRepository::insert_if_absent(&conn, "app").unwrap();
        RegionRepository::insert_if_absent(&conn, "web").unwrap();

        // Old turn with TODO in a scope nobody revisited.
        let old = new_turn("T_20250101_000000_aaaaaa", "app");
        TurnRepository::insert(&conn, &old).unwrap();
        conn.execute(
            "UPDATE turns SET status='COMPLETED', scratchpad='TODO finish pagination',
             completed_at='2025-01-01T00:00:00Z' WHERE id = ?1",
            params![old.id.as_str()],
        )
        .unwrap();

        // Old TODO turn whose scope was revisited later.
        let revisited = new_turn("T_20250101_000001_bbbbbb", "web");
        TurnRepository::insert(&conn, &revisited).unwrap();
        conn.execute(
            "UPDATE turns SET status='COMPLETED', scratchpad='TODO cleanup',
             completed_at='2025-01-01T00:00:00Z' WHERE id = ?1",
            params![revisited.id.as_str()],
        )
        .unwrap();
        complete_with(&conn, "T_20260101_000002_cccccc", "web", "cleaned up", "web");

        let stale = TurnRepository::stale_todo_turns(&conn, Utc::now()).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].2, "app");
    }
}
