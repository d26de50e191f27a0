//! The proposal processor: consume the proposal queue, serialize per
//! region, validate, then approve atomically or reject with an
//! agent-actionable briefing.
//!
//! Infrastructure errors abort the current message without ack, leaving
//! it re-deliverable. Validation failures persist the rejection and then
//! ack. Approval applies the lifecycle transition and sync mutations in
//! one transaction; deferred tasks and plan release happen post-commit,
//! where the queue's delivery semantics own idempotency.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gam_core::ids::{ProposalId, TurnId};
use gam_core::proposal::{Proposal, ProposalStatus, ReviewComment, ReviewSeverity};
use gam_core::turn::{AgentRole, TaskKind, Turn, TurnStatus};
use gam_core::validation::ValidationResult;
use gam_store::locks::acquire_region_lock;
use gam_store::queue::{ProposalMessage, Queue, TaskMessage};
use gam_store::repositories::{
    PlanRepository, ProposalRepository, RegionRepository, SyncRepository, TurnRepository,
};
use gam_store::Store;
use gam_validator::{
    AuditPolicy, AuditVerdict, HighRiskPolicy, IntegrationRunner, RuntimeProbe, Validator,
};

use crate::errors::EngineError;
use crate::planner::PlanScheduler;

/// Iteration cap for the Tier 3 feedback loop.
pub const MAX_REVIEW_ITERATIONS: u32 = 3;

/// What happened to one proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Approved,
    Rejected,
    /// A review task was pushed; the revision will arrive as a new
    /// proposal-queue message for the same proposal id.
    AwaitingRevision,
    /// The audit loop exhausted its iterations; a human owns it now.
    Escalated,
    /// Cancellation fired before the region lock was taken; the message
    /// must not be acked.
    Interrupted,
}

/// Optional tier hooks and toggles.
pub struct ProcessorConfig {
    pub run_integration: bool,
    pub run_runtime: bool,
    pub audit_high_risk: bool,
    pub risk: HighRiskPolicy,
    pub integration: Option<Box<dyn IntegrationRunner>>,
    pub runtime: Option<Box<dyn RuntimeProbe>>,
    pub audit: Option<Box<dyn AuditPolicy>>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            run_integration: false,
            run_runtime: false,
            audit_high_risk: true,
            risk: HighRiskPolicy::default(),
            integration: None,
            runtime: None,
            audit: None,
        }
    }
}

/// The memorizer-side proposal consumer.
pub struct ProposalProcessor {
    store: Store,
    queue: Queue,
    validator: Validator,
    config: ProcessorConfig,
    consumer: String,
}

impl ProposalProcessor {
    /// Create a processor identified as `consumer` within the memorizer
    /// consumer group.
    #[must_use]
    pub fn new(
        store: Store,
        queue: Queue,
        project_root: PathBuf,
        config: ProcessorConfig,
        consumer: impl Into<String>,
    ) -> Self {
        let validator = Validator::new(store.clone(), project_root);
        Self {
            store,
            queue,
            validator,
            config,
            consumer: consumer.into(),
        }
    }

    /// Block on the proposal queue until cancelled, processing each
    /// message under the region's advisory mutex.
    pub fn run(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        info!(consumer = %self.consumer, "proposal processor running");
        loop {
            let Some((msg, delivery)) = self.queue.read_proposal(&self.consumer, cancel)? else {
                info!(consumer = %self.consumer, "proposal processor stopping");
                return Ok(());
            };
            match self.process(&msg, cancel) {
                Ok(Outcome::Interrupted) => {
                    info!(proposal = %msg.proposal_id, "interrupted before processing");
                    return Ok(());
                }
                Ok(outcome) => {
                    info!(proposal = %msg.proposal_id, ?outcome, "proposal processed");
                    self.queue.ack_proposal(delivery)?;
                }
                Err(err) => {
                    // No ack: the message stays re-deliverable.
                    error!(proposal = %msg.proposal_id, %err, "proposal processing failed");
                }
            }
        }
    }

    /// Process one proposal message end to end.
    pub fn process(
        &self,
        msg: &ProposalMessage,
        cancel: &CancellationToken,
    ) -> Result<Outcome, EngineError> {
        let Some(_lock) = acquire_region_lock(self.store.pool(), &msg.region_path, cancel)? else {
            return Ok(Outcome::Interrupted);
        };

        let proposal = {
            let conn = self.store.conn()?;
            ProposalRepository::set_status(&conn, &msg.proposal_id, ProposalStatus::Validating)?;
            ProposalRepository::get(&conn, &msg.proposal_id)?
                .ok_or_else(|| EngineError::ProposalNotFound(msg.proposal_id.to_string()))?
        };

        let result = self.validator.validate(&proposal)?;
        if !result.passed {
            self.reject(&proposal.id, &result)?;
            return Ok(Outcome::Rejected);
        }

        if self.config.run_integration {
            if let Some(runner) = &self.config.integration {
                let t2 = runner.run(&proposal.region_path, &proposal)?;
                if !t2.passed {
                    self.reject(&proposal.id, &t2)?;
                    return Ok(Outcome::Rejected);
                }
            }
        }

        if self.config.audit_high_risk && self.config.risk.is_high_risk(&proposal) {
            if let Some(policy) = &self.config.audit {
                match self.audit(policy.as_ref(), &proposal)? {
                    AuditStep::Satisfied => {}
                    AuditStep::AwaitingRevision => return Ok(Outcome::AwaitingRevision),
                    AuditStep::Escalated => return Ok(Outcome::Escalated),
                }
            }
        }

        if self.config.run_runtime {
            if let Some(probe) = &self.config.runtime {
                let t4 = probe.run(&proposal)?;
                if !t4.passed {
                    self.reject(&proposal.id, &t4)?;
                    return Ok(Outcome::Rejected);
                }
            }
        }

        self.approve(&proposal)?;
        Ok(Outcome::Approved)
    }

    /// One pass of the Tier 3 loop for a high-risk proposal.
    fn audit(&self, policy: &dyn AuditPolicy, proposal: &Proposal) -> Result<AuditStep, EngineError> {
        match policy.review(proposal)? {
            AuditVerdict::Satisfied => Ok(AuditStep::Satisfied),
            AuditVerdict::Concern {
                concern,
                remediation,
            } => {
                let conn = self.store.conn()?;
                let iterations = ProposalRepository::append_review(
                    &conn,
                    &proposal.id,
                    &ReviewComment {
                        proposal_id: proposal.id.clone(),
                        iteration: proposal.review_iterations + 1,
                        concern: concern.clone(),
                        remediation: remediation.clone(),
                        severity: if proposal.review_iterations + 1 >= MAX_REVIEW_ITERATIONS {
                            ReviewSeverity::EscalateHuman
                        } else {
                            ReviewSeverity::RequestChanges
                        },
                    },
                )?;

                if iterations >= MAX_REVIEW_ITERATIONS {
                    let briefing = format!(
                        "ESCALATED TO HUMAN after {iterations} review iterations.\n\
                         Concern: {concern}\nSuggested remediation: {remediation}"
                    );
                    ProposalRepository::record_escalation(
                        &conn,
                        &proposal.id,
                        gam_core::validation::code::AUDIT_EXHAUSTED,
                        &briefing,
                    )?;
                    warn!(proposal = %proposal.id, "audit loop exhausted, escalated to human");
                    return Ok(AuditStep::Escalated);
                }

                // Back to PENDING while the revision is authored; the
                // revised proposal arrives as a new queue message keyed
                // on the same proposal id.
                ProposalRepository::set_status(&conn, &proposal.id, ProposalStatus::Pending)?;
                drop(conn);
                self.queue.push_task(&TaskMessage {
                    turn_id: proposal.turn_id.clone(),
                    region_path: proposal.region_path.clone(),
                    context_ref: None,
                    task_kind: TaskKind::ReviewResponse,
                    prompt: None,
                    review: Some(format!("Concern: {concern}\nRemediation: {remediation}")),
                })?;
                Ok(AuditStep::AwaitingRevision)
            }
        }
    }

    /// Atomic approval: proposal status, region lifecycle, sync mutations
    /// and their refs, all in one transaction. Deferred tasks and plan
    /// progress run after commit.
    fn approve(&self, proposal: &Proposal) -> Result<(), EngineError> {
        let mut conn = self.store.conn()?;
        let tx = conn.transaction()?;

        ProposalRepository::set_status(&tx, &proposal.id, ProposalStatus::Approved)?;

        if let Some(proposed) = proposal.proposed_state.as_deref() {
            RegionRepository::set_lifecycle_state(
                &tx,
                &proposal.region_path,
                gam_core::region::LifecycleState::parse(proposed),
            )?;
        }

        if let Some(changes) = &proposal.sync_changes {
            for sync in changes.added.iter().chain(&changes.modified) {
                let _ = SyncRepository::upsert(&tx, sync)?;
            }
            for name in &changes.deleted {
                let _ = SyncRepository::delete(&tx, name)?;
            }
        }

        tx.commit()?;

        for deferred in &proposal.deferred_actions {
            self.enqueue_task(deferred.task_kind, &deferred.target_region, &deferred.reason)?;
        }

        let plan_id = {
            let conn = self.store.conn()?;
            PlanRepository::plan_for_turn(&conn, &proposal.turn_id)?
        };
        if let Some(plan_id) = plan_id {
            let scheduler = PlanScheduler::new(self.store.clone(), self.queue.clone());
            scheduler.update_progress(&plan_id, &proposal.turn_id)?;
        }

        Ok(())
    }

    /// Persist the rejection with its briefing.
    fn reject(&self, id: &ProposalId, result: &ValidationResult) -> Result<(), EngineError> {
        let briefing = result.briefing();
        let conn = self.store.conn()?;
        ProposalRepository::record_rejection(&conn, id, result.code, &result.details, &briefing)?;
        Ok(())
    }

    /// Allocate a researcher turn for follow-up work and push its task.
    fn enqueue_task(
        &self,
        task_kind: TaskKind,
        region_path: &str,
        prompt: &str,
    ) -> Result<TurnId, EngineError> {
        let turn_id = TurnId::generate();
        {
            let conn = self.store.conn()?;
            TurnRepository::insert(
                &conn,
                &Turn {
                    id: turn_id.clone(),
                    agent_role: AgentRole::Researcher,
                    scope_path: region_path.to_owned(),
                    plan_id: None,
                    task_kind,
                    status: TurnStatus::Active,
                    scratchpad: None,
                    tree_before: None,
                    tree_after: None,
                    created_at: Utc::now(),
                    completed_at: None,
                },
            )?;
        }
        self.queue.push_task(&TaskMessage {
            turn_id: turn_id.clone(),
            region_path: region_path.to_owned(),
            context_ref: None,
            task_kind,
            prompt: Some(prompt.to_owned()),
            review: None,
        })?;
        Ok(turn_id)
    }
}

enum AuditStep {
    Satisfied,
    AwaitingRevision,
    Escalated,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_concept, seed_proposal_for, seed_region, seed_turn};
    use gam_core::proposal::SyncChanges;
    use gam_core::sync::{Synchronization, ThenAction, WhenPattern};
    use gam_core::ids::SyncId;
    use gam_validator::ValidatorError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn processor(store: &Store, queue: &Queue, config: ProcessorConfig) -> ProposalProcessor {
        ProposalProcessor::new(
            store.clone(),
            queue.clone(),
            std::env::temp_dir(),
            config,
            "memorizer_1",
        )
    }

    fn message(proposal: &Proposal) -> ProposalMessage {
        ProposalMessage {
            turn_id: proposal.turn_id.clone(),
            proposal_id: proposal.id.clone(),
            region_path: proposal.region_path.clone(),
        }
    }

    #[test]
    fn approval_applies_lifecycle_and_sync_mutations_atomically() {
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_concept(&store, "Search", "app", &["query"]);
        seed_turn(&store, "T_20260101_000000_aaaaaa", "app");

        let sync = Synchronization {
            id: SyncId::new(),
            name: "FanOut".into(),
            when_clause: vec![WhenPattern {
                concept: "Search".into(),
                action: "query".into(),
                input_match: BTreeMap::new(),
                output_match: BTreeMap::new(),
            }],
            where_clause: vec![],
            then_clause: vec![ThenAction {
                concept: "Search".into(),
                action: "query".into(),
                args: BTreeMap::new(),
            }],
            description: String::new(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut proposal = seed_proposal_for(&store, "app", "T_20260101_000000_aaaaaa");
        proposal.proposed_state = Some("implementation".into());
        proposal.current_state = None;
        proposal.sync_changes = Some(SyncChanges {
            added: vec![sync],
            ..SyncChanges::default()
        });
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE proposals SET proposed_state = 'implementation', sync_changes = ?1 WHERE id = ?2",
                rusqlite::params![
                    serde_json::to_string(proposal.sync_changes.as_ref().unwrap()).unwrap(),
                    proposal.id.as_str()
                ],
            )
            .unwrap();
        }

        let p = processor(&store, &queue, ProcessorConfig { audit_high_risk: false, ..ProcessorConfig::default() });
        let outcome = p.process(&message(&proposal), &CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Approved);

        let conn = store.conn().unwrap();
        let back = ProposalRepository::get(&conn, &proposal.id).unwrap().unwrap();
        assert_eq!(back.status, ProposalStatus::Approved);

        let region = RegionRepository::get_by_path(&conn, "app").unwrap().unwrap();
        assert_eq!(
            region.lifecycle_state,
            gam_core::region::LifecycleState::Implementation
        );

        let stored = SyncRepository::get_by_name(&conn, "FanOut").unwrap().unwrap();
        let refs = SyncRepository::refs_for_sync(&conn, &stored.id).unwrap();
        assert_eq!(refs.len(), 2, "when + then refs rebuilt");
    }

    #[test]
    fn rejection_persists_briefing_with_fix_lines() {
        // Out-of-scope proposal: tier 0 code 2, briefing acked with a fix.
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_turn(&store, "T_20260101_000000_aaaaaa", "web");
        let proposal = seed_proposal_for(&store, "app", "T_20260101_000000_aaaaaa");

        let p = processor(&store, &queue, ProcessorConfig::default());
        let outcome = p.process(&message(&proposal), &CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Rejected);

        let conn = store.conn().unwrap();
        let back = ProposalRepository::get(&conn, &proposal.id).unwrap().unwrap();
        assert_eq!(back.status, ProposalStatus::Rejected);
        assert_eq!(back.validation_error_code, Some(2));
        let briefing = back.rejection_reason.unwrap();
        assert!(briefing.starts_with("REJECTION (Tier 0, Code 2)"));
        assert!(briefing.contains("Fix:"));
    }

    struct AlwaysConcerned(Arc<AtomicU32>);
    impl AuditPolicy for AlwaysConcerned {
        fn review(&self, _proposal: &Proposal) -> Result<AuditVerdict, ValidatorError> {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(AuditVerdict::Concern {
                concern: "needs a rollback plan".into(),
                remediation: "document the rollback".into(),
            })
        }
    }

    #[test]
    fn audit_loop_escalates_after_three_iterations() {
        // S4: three audit concerns in a row end in PENDING with an
        // ESCALATED TO HUMAN briefing and no fourth review task.
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_turn(&store, "T_20260101_000000_aaaaaa", "app");
        let proposal = seed_proposal_for(&store, "app", "T_20260101_000000_aaaaaa");
        {
            // Make it high-risk via a stable transition; no governing
            // concepts means tier 1 passes vacuously.
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE proposals SET proposed_state = 'stable', current_state = NULL WHERE id = ?1",
                rusqlite::params![proposal.id.as_str()],
            )
            .unwrap();
        }

        let calls = Arc::new(AtomicU32::new(0));
        let config = ProcessorConfig {
            audit: Some(Box::new(AlwaysConcerned(calls.clone()))),
            ..ProcessorConfig::default()
        };
        let p = processor(&store, &queue, config);
        let cancel = CancellationToken::new();

        for expected_tasks in [1u64, 2] {
            let outcome = p.process(&message(&proposal), &cancel).unwrap();
            assert_eq!(outcome, Outcome::AwaitingRevision);
            assert_eq!(queue.status().unwrap().tasks, expected_tasks);
        }

        let outcome = p.process(&message(&proposal), &cancel).unwrap();
        assert_eq!(outcome, Outcome::Escalated);
        // No third review task was pushed.
        assert_eq!(queue.status().unwrap().tasks, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let conn = store.conn().unwrap();
        let back = ProposalRepository::get(&conn, &proposal.id).unwrap().unwrap();
        assert_eq!(back.status, ProposalStatus::Pending);
        assert!(back.rejection_reason.unwrap().starts_with("ESCALATED TO HUMAN"));
        assert_eq!(back.review_iterations, 3);
        assert_eq!(ProposalRepository::escalated(&conn, MAX_REVIEW_ITERATIONS).unwrap().len(), 1);
    }

    struct Satisfied;
    impl AuditPolicy for Satisfied {
        fn review(&self, _proposal: &Proposal) -> Result<AuditVerdict, ValidatorError> {
            Ok(AuditVerdict::Satisfied)
        }
    }

    #[test]
    fn satisfied_audit_approves_high_risk_proposal() {
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_turn(&store, "T_20260101_000000_aaaaaa", "app");
        let proposal = seed_proposal_for(&store, "app", "T_20260101_000000_aaaaaa");
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE proposals SET proposed_state = 'stable', current_state = NULL WHERE id = ?1",
                rusqlite::params![proposal.id.as_str()],
            )
            .unwrap();
        }

        let config = ProcessorConfig {
            audit: Some(Box::new(Satisfied)),
            ..ProcessorConfig::default()
        };
        let p = processor(&store, &queue, config);
        let outcome = p.process(&message(&proposal), &CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Approved);
    }

    #[test]
    fn deferred_actions_enqueue_even_for_unknown_regions() {
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_turn(&store, "T_20260101_000000_aaaaaa", "app");
        let proposal = seed_proposal_for(&store, "app", "T_20260101_000000_aaaaaa");
        {
            let conn = store.conn().unwrap();
            let deferred = serde_json::json!([{
                "task_type": "fix",
                "reason": "tighten error handling",
                "target_region": "app.not.yet.real"
            }]);
            conn.execute(
                "UPDATE proposals SET deferred_actions = ?1 WHERE id = ?2",
                rusqlite::params![deferred.to_string(), proposal.id.as_str()],
            )
            .unwrap();
        }

        let p = processor(&store, &queue, ProcessorConfig { audit_high_risk: false, ..ProcessorConfig::default() });
        let outcome = p.process(&message(&proposal), &CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::Approved);

        let (task, _) = queue.try_read_task("r1").unwrap().unwrap();
        assert_eq!(task.task_kind, TaskKind::Fix);
        assert_eq!(task.region_path, "app.not.yet.real");
        assert_eq!(task.prompt.as_deref(), Some("tighten error handling"));
    }
}
