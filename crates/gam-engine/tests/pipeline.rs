//! End-to-end pipeline: plan creation releases a turn, the researcher's
//! proposal flows through the queue into the processor, approval advances
//! the plan, and the dependent turn is released.

use std::collections::BTreeMap;
use std::fs;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use gam_core::concept::{ActionCase, ActionSpec, AssignmentRole, ConceptSpec, StateMachine};
use gam_core::ids::ProposalId;
use gam_core::plan::{PlanTurnRequest, PlanTurnStatus};
use gam_core::proposal::{Evidence, ModifiedRegion, Proposal, ProposalStatus};
use gam_core::turn::TaskKind;
use gam_engine::{
    ContextCompiler, EndOptions, Outcome, ProcessorConfig, ProposalProcessor, TurnEngine,
};
use gam_store::queue::{ProposalMessage, Queue};
use gam_store::repositories::{
    ConceptRepository, PlanRepository, ProposalRepository, RegionRepository, TurnRepository,
};
use gam_store::Store;

fn write_manifest(dir: &std::path::Path, paths: &[&str]) {
    let mut content = String::new();
    for p in paths {
        content.push_str(&format!("# @region:{p}\n# @endregion:{p}\n"));
    }
    fs::write(dir.join("arch.md"), content).unwrap();
}

fn seed_world(store: &Store, dir: &std::path::Path) {
    write_manifest(dir, &["app", "app.search"]);
    fs::write(
        dir.join("search.rs"),
        "// @region:app.search\nfn search() {}\n// @endregion:app.search\n",
    )
    .unwrap();

    let conn = store.conn().unwrap();
    RegionRepository::insert_if_absent(&conn, "app").unwrap();
    RegionRepository::insert_if_absent(&conn, "app.search").unwrap();

    let mut actions = BTreeMap::new();
    actions.insert(
        "query".to_owned(),
        ActionSpec {
            cases: vec![ActionCase::default()],
        },
    );
    let spec = ConceptSpec {
        actions,
        ..ConceptSpec::default()
    };
    ConceptRepository::upsert(
        &conn,
        "Search",
        "find things",
        &spec,
        &StateMachine::default(),
        &[],
    )
    .unwrap();
    ConceptRepository::assign(&conn, "Search", "app.search", AssignmentRole::Implementation)
        .unwrap();
}

#[test]
fn plan_turn_proposal_approval_releases_dependent_work() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().unwrap();
    let queue = Queue::open_in_memory().unwrap();
    seed_world(&store, dir.path());

    // A two-turn plan: app.search first, then app.
    let scheduler = gam_engine::PlanScheduler::new(store.clone(), queue.clone());
    let plan = scheduler
        .create_plan(
            "search-first",
            "land the search layer",
            &[
                PlanTurnRequest {
                    region_path: "app.search".into(),
                    depends_on: vec![],
                    prompt: None,
                },
                PlanTurnRequest {
                    region_path: "app".into(),
                    depends_on: vec![0],
                    prompt: None,
                },
            ],
        )
        .unwrap();

    // The researcher pool sees exactly the unblocked turn.
    let (task, delivery) = queue.try_read_task("researcher_1").unwrap().unwrap();
    assert_eq!(task.region_path, "app.search");
    assert_eq!(task.task_kind, TaskKind::Implement);
    queue.ack_task(delivery).unwrap();

    // The researcher finishes and submits a proposal for that turn.
    let proposal = {
        let conn = store.conn().unwrap();
        let region = RegionRepository::get_by_path(&conn, "app.search").unwrap().unwrap();
        let proposal = Proposal {
            id: ProposalId::new(),
            turn_id: task.turn_id.clone(),
            region_id: region.id,
            region_path: "app.search".into(),
            action_taken: "implement".into(),
            current_state: None,
            proposed_state: Some("implementation".into()),
            sync_changes: None,
            evidence: Evidence {
                modified_regions: vec![ModifiedRegion {
                    path: "app.search".into(),
                    file: "search.rs".into(),
                    description: String::new(),
                }],
                summary: "implemented the search entry point".into(),
                ..Evidence::default()
            },
            deferred_actions: vec![],
            status: ProposalStatus::Pending,
            review_iterations: 0,
            review_history: vec![],
            validation_error_code: None,
            rejection_reason: None,
            created_at: Utc::now(),
        };
        ProposalRepository::insert(&conn, &proposal).unwrap();
        proposal
    };
    queue
        .push_proposal(&ProposalMessage {
            turn_id: proposal.turn_id.clone(),
            proposal_id: proposal.id.clone(),
            region_path: proposal.region_path.clone(),
        })
        .unwrap();

    // The memorizer consumes and approves it.
    let processor = ProposalProcessor::new(
        store.clone(),
        queue.clone(),
        dir.path().to_path_buf(),
        ProcessorConfig {
            audit_high_risk: false,
            ..ProcessorConfig::default()
        },
        "memorizer_1",
    );
    let (msg, delivery) = queue.try_read_proposal("memorizer_1").unwrap().unwrap();
    let outcome = processor.process(&msg, &CancellationToken::new()).unwrap();
    assert_eq!(outcome, Outcome::Approved);
    queue.ack_proposal(delivery).unwrap();

    // Approval advanced the region lifecycle and the plan.
    let conn = store.conn().unwrap();
    let region = RegionRepository::get_by_path(&conn, "app.search").unwrap().unwrap();
    assert_eq!(
        region.lifecycle_state,
        gam_core::region::LifecycleState::Implementation
    );
    let turns = PlanRepository::plan_turns(&conn, &plan.id).unwrap();
    assert_eq!(turns[0].status, PlanTurnStatus::Completed);
    assert_eq!(turns[1].status, PlanTurnStatus::Active);
    drop(conn);

    // The dependent turn is now on the task queue.
    let (next, _) = queue.try_read_task("researcher_1").unwrap().unwrap();
    assert_eq!(next.region_path, "app");
}

#[test]
fn turn_bracketing_feeds_memory_into_the_next_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().unwrap();
    let queue = Queue::open_in_memory().unwrap();
    seed_world(&store, dir.path());

    let engine = TurnEngine::new(
        store.clone(),
        queue.clone(),
        dir.path().to_path_buf(),
        ContextCompiler::new(store.clone(), dir.path().join("ctx")),
    );

    // First turn modifies the search region and leaves a scratchpad.
    let first = engine.start("app.search", None).unwrap();
    fs::write(
        dir.path().join("search.rs"),
        "// @region:app.search\nfn search() {}\nfn paginate() {}\n// @endregion:app.search\n",
    )
    .unwrap();
    engine
        .end("added pagination to the search entry point", &EndOptions::default())
        .unwrap();

    {
        let conn = store.conn().unwrap();
        let rows = TurnRepository::turn_regions(&conn, &first.turn_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "app.search");
    }

    // The next turn's bundle carries that scratchpad as region memory.
    let second = engine.start("app.search", None).unwrap();
    let bundle = fs::read_to_string(&second.context_ref).unwrap();
    assert!(bundle.contains("## Turn Memory (region-scoped)"));
    assert!(bundle.contains("added pagination to the search entry point"));
    assert!(bundle.contains("### Search"), "governing concept spec included");
}
