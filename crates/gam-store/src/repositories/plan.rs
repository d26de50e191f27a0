//! Execution plans and plan-turn rows.

use rusqlite::{params, Connection, OptionalExtension};

use gam_core::ids::{PlanId, TurnId};
use gam_core::plan::{Decision, ExecutionPlan, PlanStatus, PlanTurn, PlanTurnStatus};

use crate::errors::Result;
use crate::repositories::{now_iso, parse_iso, to_iso};

/// Execution-plan repository.
pub struct PlanRepository;

impl PlanRepository {
    /// Persist a new plan shell.
    pub fn insert(conn: &Connection, plan: &ExecutionPlan) -> Result<()> {
        conn.execute(
            "INSERT INTO execution_plans (id, name, goal, status, decisions, quality_grade, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                plan.id.as_str(),
                plan.name,
                plan.goal,
                plan.status.as_str(),
                serde_json::to_string(&plan.decisions)?,
                plan.quality_grade,
                to_iso(plan.created_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch a plan by id.
    pub fn get(conn: &Connection, id: &PlanId) -> Result<Option<ExecutionPlan>> {
        let row = conn
            .query_row(
                "SELECT id, name, goal, status, decisions, quality_grade, created_at, completed_at
                 FROM execution_plans WHERE id = ?1",
                params![id.as_str()],
                plan_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// All plans, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<ExecutionPlan>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, goal, status, decisions, quality_grade, created_at, completed_at
             FROM execution_plans ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], plan_from_row)?;
        let mut plans = Vec::new();
        for row in rows {
            plans.push(row??);
        }
        Ok(plans)
    }

    /// Insert one plan-turn row.
    pub fn insert_plan_turn(conn: &Connection, plan_turn: &PlanTurn) -> Result<()> {
        conn.execute(
            "INSERT INTO plan_turns (plan_id, turn_id, region_path, ordering, depends_on, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                plan_turn.plan_id.as_str(),
                plan_turn.turn_id.as_str(),
                plan_turn.region_path,
                plan_turn.ordering,
                serde_json::to_string(&plan_turn.depends_on)?,
                plan_turn.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// All plan-turns for a plan, in declared order.
    pub fn plan_turns(conn: &Connection, plan_id: &PlanId) -> Result<Vec<PlanTurn>> {
        let mut stmt = conn.prepare(
            "SELECT plan_id, turn_id, region_path, ordering, depends_on, status
             FROM plan_turns WHERE plan_id = ?1 ORDER BY ordering",
        )?;
        let rows = stmt.query_map(params![plan_id.as_str()], plan_turn_from_row)?;
        let mut turns = Vec::new();
        for row in rows {
            turns.push(row??);
        }
        Ok(turns)
    }

    /// Set one plan-turn's status.
    pub fn set_plan_turn_status(
        conn: &Connection,
        plan_id: &PlanId,
        turn_id: &TurnId,
        status: PlanTurnStatus,
    ) -> Result<()> {
        conn.execute(
            "UPDATE plan_turns SET status = ?1 WHERE plan_id = ?2 AND turn_id = ?3",
            params![status.as_str(), plan_id.as_str(), turn_id.as_str()],
        )?;
        Ok(())
    }

    /// Count of plan-turns not yet completed.
    pub fn incomplete_count(conn: &Connection, plan_id: &PlanId) -> Result<u32> {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM plan_turns WHERE plan_id = ?1 AND status != 'completed'",
            params![plan_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark a plan completed.
    pub fn complete_plan(conn: &Connection, plan_id: &PlanId) -> Result<()> {
        conn.execute(
            "UPDATE execution_plans SET status = 'COMPLETED', completed_at = ?1 WHERE id = ?2",
            params![now_iso(), plan_id.as_str()],
        )?;
        Ok(())
    }

    /// Mark a plan abandoned.
    pub fn abandon_plan(conn: &Connection, plan_id: &PlanId) -> Result<()> {
        conn.execute(
            "UPDATE execution_plans SET status = 'ABANDONED', completed_at = ?1 WHERE id = ?2",
            params![now_iso(), plan_id.as_str()],
        )?;
        Ok(())
    }

    /// Append a decision to an `ACTIVE` plan. Returns false when the plan
    /// is not active (decisions on closed plans are forbidden).
    pub fn record_decision(conn: &Connection, plan_id: &PlanId, decision: &Decision) -> Result<bool> {
        let decisions_json: Option<String> = conn
            .query_row(
                "SELECT decisions FROM execution_plans WHERE id = ?1 AND status = 'ACTIVE'",
                params![plan_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(json) = decisions_json else {
            return Ok(false);
        };
        let mut decisions: Vec<Decision> = serde_json::from_str(&json)?;
        decisions.push(decision.clone());
        conn.execute(
            "UPDATE execution_plans SET decisions = ?1 WHERE id = ?2",
            params![serde_json::to_string(&decisions)?, plan_id.as_str()],
        )?;
        Ok(true)
    }

    /// The plan a turn belongs to, if any.
    pub fn plan_for_turn(conn: &Connection, turn_id: &TurnId) -> Result<Option<PlanId>> {
        let id: Option<String> = conn
            .query_row(
                "SELECT plan_id FROM plan_turns WHERE turn_id = ?1",
                params![turn_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(PlanId::from))
    }
}

fn plan_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ExecutionPlan>> {
    let status: String = row.get(3)?;
    let decisions_json: String = row.get(4)?;
    let created: String = row.get(6)?;
    let completed: Option<String> = row.get(7)?;

    let build = || -> Result<ExecutionPlan> {
        Ok(ExecutionPlan {
            id: PlanId::from(row.get::<_, String>(0)?),
            name: row.get(1)?,
            goal: row.get(2)?,
            status: PlanStatus::parse(&status),
            decisions: serde_json::from_str(&decisions_json)?,
            quality_grade: row.get(5)?,
            created_at: parse_iso(&created),
            completed_at: completed.as_deref().map(parse_iso),
        })
    };
    Ok(build())
}

fn plan_turn_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<PlanTurn>> {
    let depends_json: String = row.get(4)?;
    let status: String = row.get(5)?;

    let build = || -> Result<PlanTurn> {
        Ok(PlanTurn {
            plan_id: PlanId::from(row.get::<_, String>(0)?),
            turn_id: TurnId::from(row.get::<_, String>(1)?),
            region_path: row.get(2)?,
            ordering: row.get(3)?,
            depends_on: serde_json::from_str(&depends_json)?,
            status: PlanTurnStatus::parse(&status),
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
    use crate::repositories::turn::tests::new_turn;
    use crate::repositories::TurnRepository;
    use chrono::Utc;

    fn seed_plan(conn: &Connection) -> ExecutionPlan {
        let plan = ExecutionPlan {
            id: PlanId::new(),
            name: "search-revamp".to_owned(),
            goal: "rework search sources".to_owned(),
            status: PlanStatus::Active,
            decisions: Vec::new(),
            quality_grade: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        PlanRepository::insert(conn, &plan).unwrap();
        plan
    }

    #[test]
    fn plan_and_turns_roundtrip() {
        let conn = setup_conn();
        let plan = seed_plan(&conn);
        let t1 = new_turn("T_20260101_000000_aaaaaa", "app.a");
        let t2 = new_turn("T_20260101_000001_bbbbbb", "app.b");
        TurnRepository::insert(&conn, &t1).unwrap();
        TurnRepository::insert(&conn, &t2).unwrap();

        PlanRepository::insert_plan_turn(
            &conn,
            &PlanTurn {
                plan_id: plan.id.clone(),
                turn_id: t1.id.clone(),
                region_path: "app.a".into(),
                ordering: 0,
                depends_on: vec![],
                status: PlanTurnStatus::Pending,
            },
        )
        .unwrap();
        PlanRepository::insert_plan_turn(
            &conn,
            &PlanTurn {
                plan_id: plan.id.clone(),
                turn_id: t2.id.clone(),
                region_path: "app.b".into(),
                ordering: 1,
                depends_on: vec![t1.id.clone()],
                status: PlanTurnStatus::Pending,
            },
        )
        .unwrap();

        let turns = PlanRepository::plan_turns(&conn, &plan.id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].depends_on, vec![t1.id.clone()]);
        assert_eq!(PlanRepository::plan_for_turn(&conn, &t2.id).unwrap(), Some(plan.id.clone()));
        assert_eq!(PlanRepository::incomplete_count(&conn, &plan.id).unwrap(), 2);
    }

    #[test]
    fn decisions_only_on_active_plans() {
        let conn = setup_conn();
        let plan = seed_plan(&conn);
        let decision = Decision {
            description: "use trigram ranking".into(),
            rationale: "store already provides it".into(),
            alternatives: vec!["embeddings".into()],
            turn_id: None,
            decided_at: Utc::now(),
        };
        assert!(PlanRepository::record_decision(&conn, &plan.id, &decision).unwrap());

        PlanRepository::complete_plan(&conn, &plan.id).unwrap();
        assert!(!PlanRepository::record_decision(&conn, &plan.id, &decision).unwrap());

        let back = PlanRepository::get(&conn, &plan.id).unwrap().unwrap();
        assert_eq!(back.status, PlanStatus::Completed);
        assert_eq!(back.decisions.len(), 1);
        assert!(back.completed_at.is_some());
    }
}
