//! The execution-plan scheduler: dependency-ordered multi-turn DAGs with
//! automatic release of unblocked work.
//!
//! Cycles are impossible by construction: a plan turn may only depend on
//! turns declared earlier in the same plan's ordering, checked at
//! creation time.

use chrono::Utc;
use tracing::info;

use gam_core::ids::{PlanId, TurnId};
use gam_core::plan::{
    Decision, ExecutionPlan, PlanStatus, PlanTurn, PlanTurnRequest, PlanTurnStatus,
};
use gam_core::turn::{AgentRole, TaskKind, Turn, TurnStatus};
use gam_store::queue::{Queue, TaskMessage};
use gam_store::repositories::{PlanRepository, TurnRepository};
use gam_store::Store;

use crate::errors::EngineError;

/// The plan scheduler.
pub struct PlanScheduler {
    store: Store,
    queue: Queue,
}

impl PlanScheduler {
    /// Create a scheduler over the given store and queue.
    #[must_use]
    pub fn new(store: Store, queue: Queue) -> Self {
        Self { store, queue }
    }

    /// Create a plan: insert the plan, allocate a turn per request,
    /// insert plan-turn rows, then enqueue the already-unblocked turns.
    ///
    /// Each request's `depends_on` indexes earlier requests by position;
    /// a forward or self reference is rejected.
    pub fn create_plan(
        &self,
        name: &str,
        goal: &str,
        requests: &[PlanTurnRequest],
    ) -> Result<ExecutionPlan, EngineError> {
        for (idx, request) in requests.iter().enumerate() {
            for &dep in &request.depends_on {
                if dep >= idx {
                    return Err(EngineError::InvalidPlan(format!(
                        "turn {idx} ({}) depends on {dep}, which is not declared earlier",
                        request.region_path
                    )));
                }
            }
        }

        let plan = ExecutionPlan {
            id: PlanId::new(),
            name: name.to_owned(),
            goal: goal.to_owned(),
            status: PlanStatus::Active,
            decisions: Vec::new(),
            quality_grade: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        let turn_ids: Vec<TurnId> = requests.iter().map(|_| TurnId::generate()).collect();

        let mut conn = self.store.conn()?;
        let tx = conn.transaction()?;
        PlanRepository::insert(&tx, &plan)?;
        for (idx, request) in requests.iter().enumerate() {
            TurnRepository::insert(
                &tx,
                &Turn {
                    id: turn_ids[idx].clone(),
                    agent_role: AgentRole::Researcher,
                    scope_path: request.region_path.clone(),
                    plan_id: Some(plan.id.clone()),
                    task_kind: TaskKind::Implement,
                    status: TurnStatus::Active,
                    scratchpad: None,
                    tree_before: None,
                    tree_after: None,
                    created_at: Utc::now(),
                    completed_at: None,
                },
            )?;
            PlanRepository::insert_plan_turn(
                &tx,
                &PlanTurn {
                    plan_id: plan.id.clone(),
                    turn_id: turn_ids[idx].clone(),
                    region_path: request.region_path.clone(),
                    ordering: idx as i64,
                    depends_on: request.depends_on.iter().map(|&d| turn_ids[d].clone()).collect(),
                    status: PlanTurnStatus::Pending,
                },
            )?;
        }
        tx.commit()?;

        info!(plan = %plan.id, turns = requests.len(), "plan created");
        self.enqueue_ready(&plan.id)?;
        Ok(plan)
    }

    /// Append a decision to an `ACTIVE` plan.
    pub fn record_decision(&self, plan_id: &PlanId, decision: &Decision) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        if !PlanRepository::record_decision(&conn, plan_id, decision)? {
            return Err(EngineError::PlanNotActive(plan_id.to_string()));
        }
        Ok(())
    }

    /// Mark `turn_id` completed within its plan; complete the plan when
    /// nothing remains; release newly unblocked turns.
    pub fn update_progress(&self, plan_id: &PlanId, turn_id: &TurnId) -> Result<(), EngineError> {
        {
            let conn = self.store.conn()?;
            PlanRepository::set_plan_turn_status(&conn, plan_id, turn_id, PlanTurnStatus::Completed)?;
            if PlanRepository::incomplete_count(&conn, plan_id)? == 0 {
                PlanRepository::complete_plan(&conn, plan_id)?;
                info!(plan = %plan_id, "plan completed");
            }
        }
        self.enqueue_ready(plan_id)
    }

    /// Abandon a plan. Its unreleased turns stay pending and are never
    /// enqueued.
    pub fn abandon(&self, plan_id: &PlanId) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        PlanRepository::abandon_plan(&conn, plan_id)?;
        info!(plan = %plan_id, "plan abandoned");
        Ok(())
    }

    /// Flip every pending plan-turn whose dependencies have all completed
    /// to `active`, and push its task.
    pub fn enqueue_ready(&self, plan_id: &PlanId) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        let turns = PlanRepository::plan_turns(&conn, plan_id)?;
        let completed: std::collections::HashSet<&TurnId> = turns
            .iter()
            .filter(|t| t.status == PlanTurnStatus::Completed)
            .map(|t| &t.turn_id)
            .collect();

        for turn in &turns {
            if turn.status != PlanTurnStatus::Pending {
                continue;
            }
            if !turn.depends_on.iter().all(|dep| completed.contains(dep)) {
                continue;
            }
            PlanRepository::set_plan_turn_status(&conn, plan_id, &turn.turn_id, PlanTurnStatus::Active)?;
            self.queue.push_task(&TaskMessage {
                turn_id: turn.turn_id.clone(),
                region_path: turn.region_path.clone(),
                context_ref: None,
                task_kind: TaskKind::Implement,
                prompt: None,
                review: None,
            })?;
            info!(plan = %plan_id, turn = %turn.turn_id, "plan turn released");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
