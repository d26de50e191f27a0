//! The turn engine: start/end lifecycle bracketing each unit of agent
//! work.
//!
//! Start snapshots the region tree and hands the researcher a compiled
//! context bundle; End re-scans, runs the validation gate, diffs the
//! snapshots into turn-region rows, and persists the scratchpad. The gate
//! is what makes the architecture manifest the source of truth: any
//! divergence is blocked at the point of authorship.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use gam_core::ids::TurnId;
use gam_core::turn::{diff_snapshots, AgentRole, TaskKind, Turn, TurnStatus};
use gam_region::{parse_gamignore, scan_directory, snapshot_tree, validate_arch_hierarchy};
use gam_region::manifest::parse_arch_paths;
use gam_store::queue::{Queue, TaskMessage};
use gam_store::repositories::{RegionRepository, TurnRepository};
use gam_store::Store;

use crate::context::ContextCompiler;
use crate::errors::EngineError;

/// Outcome of starting a turn.
#[derive(Clone, Debug)]
pub struct StartedTurn {
    pub turn_id: TurnId,
    /// Path of the compiled context bundle.
    pub context_ref: PathBuf,
}

/// Options for ending a turn.
#[derive(Clone, Debug, Default)]
pub struct EndOptions {
    /// Specific turn to end; latest `ACTIVE` otherwise.
    pub turn_id: Option<TurnId>,
    /// Bypass the validation gate. Strongly discouraged; its use is
    /// always visible in the audit log.
    pub skip_validation: bool,
}

/// The turn engine.
pub struct TurnEngine {
    store: Store,
    queue: Queue,
    project_root: PathBuf,
    context: ContextCompiler,
}

impl TurnEngine {
    /// Create a turn engine rooted at `project_root`.
    #[must_use]
    pub fn new(store: Store, queue: Queue, project_root: PathBuf, context: ContextCompiler) -> Self {
        Self {
            store,
            queue,
            project_root,
            context,
        }
    }

    /// Start a researcher turn on `scope`: snapshot the tree, persist the
    /// turn, compile the context bundle, enqueue the task.
    pub fn start(&self, scope: &str, prompt: Option<&str>) -> Result<StartedTurn, EngineError> {
        let turn_id = TurnId::generate();
        let ignore = parse_gamignore(&self.project_root);
        let tree_before = snapshot_tree(&self.project_root, &ignore)?;

        let turn = Turn {
            id: turn_id.clone(),
            agent_role: AgentRole::Researcher,
            scope_path: scope.to_owned(),
            plan_id: None,
            task_kind: TaskKind::Implement,
            status: TurnStatus::Active,
            scratchpad: None,
            tree_before: Some(tree_before),
            tree_after: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        {
            let conn = self.store.conn()?;
            TurnRepository::insert(&conn, &turn)?;
        }

        let context_ref = self.context.compile(scope, prompt)?;
        self.queue.push_task(&TaskMessage {
            turn_id: turn_id.clone(),
            region_path: scope.to_owned(),
            context_ref: Some(context_ref.display().to_string()),
            task_kind: TaskKind::Implement,
            prompt: prompt.map(str::to_owned),
            review: None,
        })?;

        info!(turn = %turn_id, scope, "turn started");
        Ok(StartedTurn {
            turn_id,
            context_ref,
        })
    }

    /// End a turn. Runs the validation gate (unless skipped), records the
    /// structural diff, and completes the turn. On gate failure the turn
    /// stays `ACTIVE` and the prioritized issue list is returned as
    /// [`EngineError::GateFailed`].
    pub fn end(&self, scratchpad: &str, options: &EndOptions) -> Result<TurnId, EngineError> {
        let conn = self.store.conn()?;

        let turn = match &options.turn_id {
            Some(id) => TurnRepository::get(&conn, id)?
                .ok_or_else(|| EngineError::TurnNotFound(id.to_string()))?,
            None => TurnRepository::latest_active(&conn)?.ok_or(EngineError::NoActiveTurn)?,
        };

        let ignore = parse_gamignore(&self.project_root);
        let tree_after = snapshot_tree(&self.project_root, &ignore)?;

        if options.skip_validation {
            warn!(turn = %turn.id, "validation gate SKIPPED by explicit override");
        } else {
            let issues = self.gate_issues(&tree_after)?;
            if !issues.is_empty() {
                return Err(EngineError::GateFailed { issues });
            }
        }

        // Structural diff into turn-region rows. Regions unknown to the
        // store are skipped; the gate has already ensured manifest
        // alignment on the non-skip path.
        let before = turn.tree_before.clone().unwrap_or_default();
        for (path, action) in diff_snapshots(&before, &tree_after) {
            if let Some(region) = RegionRepository::get_by_path(&conn, &path)? {
                TurnRepository::upsert_turn_region(&conn, &turn.id, &region.id, action)?;
            }
        }

        TurnRepository::complete(&conn, &turn.id, scratchpad, &tree_after)?;
        info!(turn = %turn.id, "turn completed");
        Ok(turn.id)
    }

    /// The pre-commit gate, in priority order: manifest hierarchy issues,
    /// marker pairing warnings, source regions missing from the manifest.
    fn gate_issues(
        &self,
        tree_after: &gam_core::turn::TreeSnapshot,
    ) -> Result<Vec<String>, EngineError> {
        let mut issues = validate_arch_hierarchy(&self.project_root)?;

        let ignore = parse_gamignore(&self.project_root);
        let outcome = scan_directory(&self.project_root, &ignore)?;
        issues.extend(outcome.warnings);

        let declared: HashSet<String> = parse_arch_paths(&self.project_root)?.into_iter().collect();
        for path in tree_after.keys() {
            if !declared.contains(path) {
                issues.push(format!(
                    "region {path} found in source but not in arch.md — add it to arch.md"
                ));
            }
        }
        Ok(issues)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
