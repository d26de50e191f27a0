//! Tier 1 — state machine legality, invariants against evidence, and
//! sync reference integrity.
//!
//! Governing concepts come from the ancestor walk: every concept assigned
//! to the proposal's region or any of its ancestors has a say.

use gam_core::concept::{Invariant, InvariantKind};
use gam_core::proposal::{Evidence, Proposal};
use gam_core::sync::Synchronization;
use gam_core::validation::{code, ValidationDetail, ValidationResult};
use gam_store::repositories::{ConceptRepository, SyncRepository};
use gam_store::Store;

use crate::ValidatorError;

/// Run the Tier 1 checks in order: transition legality, invariant rules,
/// sync reference integrity, orphan prevention on removal.
pub fn tier1(store: &Store, proposal: &Proposal) -> Result<ValidationResult, ValidatorError> {
    let conn = store.conn()?;
    let concepts = ConceptRepository::governing(&conn, &proposal.region_path)?;

    let mut result = ValidationResult::pass(1);

    // 1. Transition legality: the declared tuple must exist in at least
    // one governing state machine.
    if let (Some(current), Some(proposed)) =
        (proposal.current_state.as_deref(), proposal.proposed_state.as_deref())
    {
        if !concepts.is_empty()
            && !concepts
                .iter()
                .any(|c| c.state_machine.is_legal(current, proposed, &proposal.action_taken))
        {
            let legal: Vec<String> = concepts
                .iter()
                .map(|c| format!("{}: {}", c.name, c.state_machine.transitions_from(current)))
                .collect();
            return Ok(ValidationResult::fail(
                1,
                code::ILLEGAL_TRANSITION,
                format!(
                    "Illegal transition: {current} -> {proposed} via {}",
                    proposal.action_taken
                ),
                ValidationDetail::fail(
                    "state_transition",
                    format!("legal transition from {current} via {}", proposal.action_taken),
                    format!("proposed {current} -> {proposed}"),
                    format!(
                        "Check the governing state machines. Legal transitions from {current}: {}",
                        legal.join("; ")
                    ),
                ),
            ));
        }
    }

    // 2. Invariant rules against evidence. Passing details are recorded
    // too, so approvals carry the full audit trail.
    for concept in &concepts {
        for invariant in &concept.invariants {
            let detail = check_invariant(invariant, &proposal.evidence);
            let passed = detail.passed;
            result.details.push(detail);
            if !passed {
                result.passed = false;
                result.code = code::INVARIANT_VIOLATION;
                result.message = format!(
                    "Invariant violation: {} in concept {}",
                    invariant.name, concept.name
                );
                return Ok(result);
            }
        }
    }

    // 3. Sync reference integrity for added and modified syncs.
    if let Some(changes) = &proposal.sync_changes {
        for sync in changes.added.iter().chain(&changes.modified) {
            if let Some(detail) = broken_sync_ref(&conn, sync)? {
                result.passed = false;
                result.code = code::BROKEN_SYNC_REF;
                result.message =
                    format!("Sync {} references invalid action or state field", sync.name);
                result.details.push(detail);
                return Ok(result);
            }
        }
    }

    // 4. Orphan prevention: removed actions must not strand enabled syncs.
    if let Some(api) = &proposal.evidence.api_analysis {
        for removed in &api.removals {
            let affected = SyncRepository::enabled_syncs_referencing_action(&conn, removed)?;
            if !affected.is_empty() {
                result.passed = false;
                result.code = code::ORPHANED_SYNC;
                result.message = format!(
                    "Removing action {removed} would break {} sync(s): {}",
                    affected.len(),
                    affected.join(", ")
                );
                result.details.push(ValidationDetail::fail(
                    "action_removal",
                    "no enabled syncs reference removed action",
                    format!("{} sync(s) reference {removed}", affected.len()),
                    format!(
                        "Update sync(s) {} or restore action {removed} before this proposal.",
                        affected.join(", ")
                    ),
                ));
                return Ok(result);
            }
        }
    }

    result.message = "Tier 1 passed".to_owned();
    Ok(result)
}

/// Evaluate one invariant against the declared evidence.
fn check_invariant(invariant: &Invariant, evidence: &Evidence) -> ValidationDetail {
    match invariant.kind {
        InvariantKind::Api => {
            let Some(api) = &evidence.api_analysis else {
                return ValidationDetail::fail(
                    &invariant.name,
                    "api_analysis block required by api invariant",
                    "missing",
                    "Add api_analysis to proposal evidence with exports_before, exports_after, \
                     additions, and removals fields.",
                );
            };
            if config_flag(invariant, "no_removals") && !api.removals.is_empty() {
                return ValidationDetail::fail(
                    &invariant.name,
                    "no API removals (no_removals invariant)",
                    format!("removed: {}", api.removals.join(", ")),
                    "Restore the removed exports or update the concept's api invariant to allow \
                     removals.",
                );
            }
            ValidationDetail::pass(&invariant.name)
        }

        InvariantKind::Migration => {
            let Some(migration) = &evidence.migration_analysis else {
                return ValidationDetail::fail(
                    &invariant.name,
                    "migration_analysis block required by migration invariant",
                    "missing",
                    "Add migration_analysis to proposal evidence with operations, reversible, \
                     and data_loss fields.",
                );
            };
            let forbidden = config_strings(invariant, "forbidden");
            for op in &migration.operations {
                if forbidden.iter().any(|f| f == op) {
                    return ValidationDetail::fail(
                        &invariant.name,
                        format!("operation {op} forbidden by migration invariant"),
                        op.clone(),
                        format!(
                            "Use a non-destructive migration strategy instead of {op}. Consider \
                             ADD_COLUMN plus a backfill."
                        ),
                    );
                }
            }
            ValidationDetail::pass(&invariant.name)
        }

        InvariantKind::Dependency => {
            if config_flag(invariant, "required") && evidence.dependency_analysis.is_none() {
                return ValidationDetail::fail(
                    &invariant.name,
                    "dependency_analysis block required by dependency invariant",
                    "missing",
                    "Add dependency_analysis to proposal evidence with added, removed, and \
                     changed fields.",
                );
            }
            ValidationDetail::pass(&invariant.name)
        }

        // Evaluated by a rule engine outside this core; presence-only here.
        InvariantKind::Representation | InvariantKind::Abstract => {
            ValidationDetail::pass(&invariant.name)
        }
    }
}

fn config_flag(invariant: &Invariant, key: &str) -> bool {
    invariant
        .config
        .as_ref()
        .and_then(|c| c.get(key))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn config_strings(invariant: &Invariant, key: &str) -> Vec<String> {
    invariant
        .config
        .as_ref()
        .and_then(|c| c.get(key))
        .and_then(serde_json::Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// First broken reference in a sync's clauses, if any: when/then name
/// `(concept, action)` pairs, where names `(concept, state_field)` pairs.
fn broken_sync_ref(
    conn: &rusqlite::Connection,
    sync: &Synchronization,
) -> Result<Option<ValidationDetail>, ValidatorError> {
    for w in &sync.when_clause {
        if !ConceptRepository::action_exists(conn, &w.concept, &w.action)? {
            return Ok(Some(missing_action_detail(sync, &w.concept, &w.action, "when")));
        }
    }
    for t in &sync.then_clause {
        if !ConceptRepository::action_exists(conn, &t.concept, &t.action)? {
            return Ok(Some(missing_action_detail(sync, &t.concept, &t.action, "then")));
        }
    }
    for w in &sync.where_clause {
        for field in w.state_fields() {
            if !ConceptRepository::state_field_exists(conn, &w.concept, field)? {
                return Ok(Some(ValidationDetail::fail(
                    format!("sync_refs_{}", sync.name),
                    format!("state field {}.{field} exists", w.concept),
                    "not found",
                    format!(
                        "Add state field '{field}' to concept '{}' spec, or fix the sync's \
                         where clause.",
                        w.concept
                    ),
                )));
            }
        }
    }
    Ok(None)
}

fn missing_action_detail(
    sync: &Synchronization,
    concept: &str,
    action: &str,
    clause: &str,
) -> ValidationDetail {
    ValidationDetail::fail(
        format!("sync_refs_{}", sync.name),
        format!("action {concept}/{action} exists"),
        "not found",
        format!(
            "Define action '{action}' in concept '{concept}' spec, or fix the sync's {clause} \
             clause reference."
        ),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use gam_core::concept::{
        ActionCase, ActionSpec, AssignmentRole, ConceptSpec, StateMachine, Transition,
    };
    use gam_core::ids::{ProposalId, RegionId, SyncId, TurnId};
    use gam_core::proposal::{ApiAnalysis, ProposalStatus, SyncChanges};
    use gam_core::sync::{MatchValue, ThenAction, WhenPattern};
    use gam_core::turn::{AgentRole, TaskKind, Turn, TurnStatus};
    use gam_store::repositories::{RegionRepository, TurnRepository};

    pub(crate) fn pending_proposal(region_path: &str, turn_id: &str) -> Proposal {
        Proposal {
            id: ProposalId::new(),
            turn_id: TurnId::from(turn_id),
            region_id: RegionId::from("rgn-test"),
            region_path: region_path.to_owned(),
            action_taken: "implement".to_owned(),
            current_state: None,
            proposed_state: None,
            sync_changes: None,
            evidence: Evidence::default(),
            deferred_actions: Vec::new(),
            status: ProposalStatus::Pending,
            review_iterations: 0,
            review_history: Vec::new(),
            validation_error_code: None,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn seed_region_and_turn(
        store: &Store,
        region_path: &str,
        turn_id: &str,
        scope: &str,
    ) {
        let conn = store.conn().unwrap();
        for ancestor in gam_core::region::ancestor_paths(region_path) {
            RegionRepository::insert_if_absent(&conn, ancestor).unwrap();
        }
        TurnRepository::insert(
            &conn,
            &Turn {
                id: TurnId::from(turn_id),
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
            },
        )
        .unwrap();
    }

    fn concept_with(
        store: &Store,
        name: &str,
        region: &str,
        actions: &[&str],
        invariants: Vec<Invariant>,
        transitions: Vec<Transition>,
    ) {
        let conn = store.conn().unwrap();
        let mut action_map = BTreeMap::new();
        for action in actions {
            action_map.insert(
                (*action).to_owned(),
                ActionSpec {
                    cases: vec![ActionCase::default()],
                },
            );
        }
        let spec = ConceptSpec {
            actions: action_map,
            ..ConceptSpec::default()
        };
        let sm = StateMachine {
            states: vec!["draft".into(), "implementation".into(), "stable".into()],
            transitions,
        };
        ConceptRepository::upsert(&conn, name, "", &spec, &sm, &invariants).unwrap();
        ConceptRepository::assign(&conn, name, region, AssignmentRole::Implementation).unwrap();
    }

    fn implement_transition() -> Vec<Transition> {
        vec![Transition {
            from: "draft".into(),
            to: "implementation".into(),
            action: "implement".into(),
        }]
    }

    #[test]
    fn legal_transition_passes() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app.search", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "Search", "app.search", &["query"], vec![], implement_transition());

        let mut proposal = pending_proposal("app.search", "T_20260101_000000_aaaaaa");
        proposal.current_state = Some("draft".into());
        proposal.proposed_state = Some("implementation".into());

        let result = tier1(&store, &proposal).unwrap();
        assert!(result.passed, "{result:?}");
    }

    #[test]
    fn illegal_transition_fails_with_legal_list() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app.search", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "Search", "app.search", &["query"], vec![], implement_transition());

        let mut proposal = pending_proposal("app.search", "T_20260101_000000_aaaaaa");
        proposal.current_state = Some("draft".into());
        proposal.proposed_state = Some("stable".into());

        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert_eq!(result.code, code::ILLEGAL_TRANSITION);
        assert!(result.details[0].fix.contains("draft->implementation via implement"));
    }

    #[test]
    fn ancestor_concepts_all_govern() {
        // Concept A on app carries an api no-removals invariant; concept B
        // on app.x is also collected for a proposal on app.x.y.
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app.x.y", "T_20260101_000000_aaaaaa", "app");
        concept_with(
            &store,
            "A",
            "app",
            &["export"],
            vec![Invariant {
                name: "api_stability".into(),
                kind: InvariantKind::Api,
                rule: None,
                config: Some(BTreeMap::from([(
                    "no_removals".to_owned(),
                    serde_json::Value::Bool(true),
                )])),
            }],
            vec![],
        );
        concept_with(&store, "B", "app.x", &["build"], vec![], vec![]);

        let mut proposal = pending_proposal("app.x.y", "T_20260101_000000_aaaaaa");
        proposal.evidence.api_analysis = Some(ApiAnalysis {
            removals: vec!["Export".into()],
            ..ApiAnalysis::default()
        });

        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert_eq!(result.code, code::INVARIANT_VIOLATION);
        assert!(result.message.contains("concept A"));
    }

    #[test]
    fn api_invariant_requires_evidence_block() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(
            &store,
            "A",
            "app",
            &[],
            vec![Invariant {
                name: "api_stability".into(),
                kind: InvariantKind::Api,
                rule: None,
                config: None,
            }],
            vec![],
        );

        let proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert_eq!(result.code, code::INVARIANT_VIOLATION);
        assert!(result.details.last().unwrap().fix.contains("api_analysis"));
    }

    #[test]
    fn no_evidence_passes_when_no_invariant_demands_it() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "A", "app", &["build"], vec![], vec![]);

        let proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        assert!(tier1(&store, &proposal).unwrap().passed);
    }

    #[test]
    fn forbidden_migration_operation_fails() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(
            &store,
            "A",
            "app",
            &[],
            vec![Invariant {
                name: "safe_migrations".into(),
                kind: InvariantKind::Migration,
                rule: None,
                config: Some(BTreeMap::from([(
                    "forbidden".to_owned(),
                    serde_json::json!(["DROP_COLUMN"]),
                )])),
            }],
            vec![],
        );

        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.evidence.migration_analysis = Some(gam_core::proposal::MigrationAnalysis {
            operations: vec!["ADD_COLUMN".into(), "DROP_COLUMN".into()],
            reversible: false,
            data_loss: true,
        });

        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert!(result.details.last().unwrap().fix.contains("ADD_COLUMN"));
    }

    fn sync_referencing(concept: &str, action: &str) -> Synchronization {
        Synchronization {
            id: SyncId::new(),
            name: "ComputeTier".into(),
            when_clause: vec![WhenPattern {
                concept: concept.to_owned(),
                action: action.to_owned(),
                input_match: BTreeMap::new(),
                output_match: BTreeMap::new(),
            }],
            where_clause: vec![],
            then_clause: vec![ThenAction {
                concept: concept.to_owned(),
                action: action.to_owned(),
                args: BTreeMap::from([("q".to_owned(), MatchValue::parse("?q"))]),
            }],
            description: String::new(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn broken_sync_reference_fails_code_minus_3() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "Subscription", "app", &["query"], vec![], vec![]);

        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.sync_changes = Some(SyncChanges {
            added: vec![sync_referencing("Subscription", "vanish")],
            ..SyncChanges::default()
        });

        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert_eq!(result.code, code::BROKEN_SYNC_REF);
        assert!(result.details.last().unwrap().fix.contains("'vanish'"));
    }

    #[test]
    fn orphan_prevention_fails_code_minus_4() {
        // S2: removing Subscription/query while ComputeTier references it.
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "Subscription", "app", &["query"], vec![], vec![]);
        {
            let conn = store.conn().unwrap();
            SyncRepository::upsert(&conn, &sync_referencing("Subscription", "query")).unwrap();
        }

        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.evidence.api_analysis = Some(ApiAnalysis {
            removals: vec!["query".into()],
            ..ApiAnalysis::default()
        });

        let result = tier1(&store, &proposal).unwrap();
        assert!(!result.passed);
        assert_eq!(result.code, code::ORPHANED_SYNC);
        assert!(result.message.contains("ComputeTier"));
        let detail = result.details.last().unwrap();
        assert!(detail.fix.contains("ComputeTier"));
        assert!(detail.fix.contains("query"));
    }

    #[test]
    fn disabled_syncs_do_not_block_removal() {
        let store = Store::open_in_memory().unwrap();
        seed_region_and_turn(&store, "app", "T_20260101_000000_aaaaaa", "app");
        concept_with(&store, "Subscription", "app", &["query"], vec![], vec![]);
        {
            let conn = store.conn().unwrap();
            let mut sync = sync_referencing("Subscription", "query");
            sync.enabled = false;
            SyncRepository::upsert(&conn, &sync).unwrap();
        }

        let mut proposal = pending_proposal("app", "T_20260101_000000_aaaaaa");
        proposal.evidence.api_analysis = Some(ApiAnalysis {
            removals: vec!["query".into()],
            ..ApiAnalysis::default()
        });

        assert!(tier1(&store, &proposal).unwrap().passed);
    }
}
