//! The gardener: a scheduled, read-only entropy sweep over the store.
//!
//! Findings are categorized and remediable. In non-dry mode, mechanical
//! findings become `gardener` fix-up tasks on the queue; judgment calls
//! are persisted for human review. Dry mode returns findings with no
//! side effects at all.

use chrono::{Duration, Utc};
use tracing::info;

use gam_core::ids::TurnId;
use gam_core::quality::{FindingCategory, GardenFinding};
use gam_core::turn::{AgentRole, TaskKind, Turn, TurnStatus};
use gam_region::{parse_gamignore, scan_directory};
use gam_store::queue::{Queue, TaskMessage};
use gam_store::repositories::{
    FlowRepository, QualityRepository, RegionRepository, SyncRepository, TurnRepository,
};
use gam_store::Store;

use crate::errors::EngineError;

/// Window for stale-TODO and sync-drift detection.
const SWEEP_WINDOW_DAYS: i64 = 7;

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// The gardener sweep.
pub struct Gardener {
    store: Store,
    queue: Queue,
    project_root: std::path::PathBuf,
}

impl Gardener {
    /// Create a gardener rooted at `project_root`.
    #[must_use]
    pub fn new(store: Store, queue: Queue, project_root: std::path::PathBuf) -> Self {
        Self {
            store,
            queue,
            project_root,
        }
    }

    /// Run the full sweep. With `dry_run`, findings are returned and
    /// nothing else happens; otherwise mechanical findings are enqueued
    /// and judgment findings persisted.
    pub fn sweep(&self, dry_run: bool) -> Result<Vec<GardenFinding>, EngineError> {
        let mut findings = Vec::new();
        findings.extend(self.stale_todos()?);
        findings.extend(self.orphaned_regions()?);
        findings.extend(self.sync_drift()?);
        findings.extend(self.quality_degradation()?);

        if !dry_run {
            let conn = self.store.conn()?;
            for finding in &findings {
                if finding.mechanical {
                    self.enqueue_fixup(finding)?;
                } else {
                    QualityRepository::insert_finding(&conn, finding)?;
                }
            }
        }

        info!(count = findings.len(), dry_run, "gardener sweep complete");
        Ok(findings)
    }

    /// Completed turns older than the window whose scratchpad still says
    /// TODO, with no later activity under their scope.
    fn stale_todos(&self) -> Result<Vec<GardenFinding>, EngineError> {
        let conn = self.store.conn()?;
        let cutoff = Utc::now() - Duration::days(SWEEP_WINDOW_DAYS);
        let stale = TurnRepository::stale_todo_turns(&conn, cutoff)?;
        Ok(stale
            .into_iter()
            .map(|(turn_id, scratchpad, scope)| GardenFinding {
                region_path: scope,
                category: FindingCategory::StaleTodo,
                description: format!(
                    "Turn {turn_id} has an unaddressed TODO in its scratchpad: {}",
                    truncate(&scratchpad, 100)
                ),
                mechanical: false,
            })
            .collect())
    }

    /// Store regions (not deprecated) with no markers anywhere in source.
    /// The symmetric direction — markers without a declared region — is
    /// the turn-end gate's job, not the gardener's.
    fn orphaned_regions(&self) -> Result<Vec<GardenFinding>, EngineError> {
        let ignore = parse_gamignore(&self.project_root);
        let outcome = scan_directory(&self.project_root, &ignore)?;
        let in_source: std::collections::HashSet<&str> =
            outcome.markers.iter().map(|m| m.path.as_str()).collect();

        let conn = self.store.conn()?;
        Ok(RegionRepository::live_paths(&conn)?
            .into_iter()
            .filter(|path| !in_source.contains(path.as_str()))
            .map(|path| GardenFinding {
                description: format!(
                    "Region {path} exists in the store but has no @region markers in source. \
                     Either add source markers or deprecate it and remove it from arch.md."
                ),
                region_path: path,
                category: FindingCategory::OrphanedRegion,
                mechanical: false,
            })
            .collect())
    }

    /// Enabled syncs whose when-action completed inside the window while
    /// the sync itself never fired. Usually a state-representation
    /// mismatch in the where clause.
    fn sync_drift(&self) -> Result<Vec<GardenFinding>, EngineError> {
        let conn = self.store.conn()?;
        let cutoff = Utc::now() - Duration::days(SWEEP_WINDOW_DAYS);

        let mut findings = Vec::new();
        for (sync_name, concept, action) in SyncRepository::enabled_when_refs(&conn)? {
            let completions =
                FlowRepository::action_completions_since(&conn, &concept, &action, cutoff)?;
            if completions == 0 {
                continue;
            }
            let firings = FlowRepository::sync_firings_since(&conn, &sync_name, cutoff)?;
            if firings == 0 {
                findings.push(GardenFinding {
                    region_path: String::new(),
                    category: FindingCategory::SyncDrift,
                    description: format!(
                        "Sync {sync_name}: action {concept}/{action} completed {completions} \
                         time(s) in the last {SWEEP_WINDOW_DAYS} days but the sync never fired. \
                         Likely a state representation mismatch in its where clause."
                    ),
                    mechanical: false,
                });
            }
        }
        Ok(findings)
    }

    /// Regions carrying a failing quality grade.
    fn quality_degradation(&self) -> Result<Vec<GardenFinding>, EngineError> {
        let conn = self.store.conn()?;
        Ok(QualityRepository::regions_graded(&conn, &["D", "F"])?
            .into_iter()
            .map(|(path, category, grade)| GardenFinding {
                description: format!("Region {path} is graded {grade} in {category}."),
                region_path: path,
                category: FindingCategory::QualityDegradation,
                mechanical: false,
            })
            .collect())
    }

    /// Allocate a `gardener` turn and push the fix-up task.
    fn enqueue_fixup(&self, finding: &GardenFinding) -> Result<(), EngineError> {
        let turn_id = TurnId::generate();
        {
            let conn = self.store.conn()?;
            TurnRepository::insert(
                &conn,
                &Turn {
                    id: turn_id.clone(),
                    agent_role: AgentRole::Researcher,
                    scope_path: finding.region_path.clone(),
                    plan_id: None,
                    task_kind: TaskKind::Gardener,
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
            turn_id,
            region_path: finding.region_path.clone(),
            context_ref: None,
            task_kind: TaskKind::Gardener,
            prompt: Some(finding.description.clone()),
            review: None,
        })?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::seed_region;
    use gam_core::flow::FlowEntry;
    use gam_core::ids::{FlowEntryId, SyncId};
    use gam_core::sync::{Synchronization, ThenAction, WhenPattern};
    use std::collections::BTreeMap;

    fn gardener_in(dir: &std::path::Path) -> (Gardener, Store, Queue) {
        let store = Store::open_in_memory().unwrap();
        let queue = Queue::open_in_memory().unwrap();
        (
            Gardener::new(store.clone(), queue.clone(), dir.to_path_buf()),
            store,
            queue,
        )
    }

    fn flow(conn: &rusqlite::Connection, concept: &str, action: &str, sync: Option<&str>) {
        FlowRepository::insert(
            conn,
            &FlowEntry {
                id: FlowEntryId::new(),
                flow_token: "flow-t".into(),
                concept_name: concept.to_owned(),
                action_name: action.to_owned(),
                input_args: serde_json::Value::Null,
                output_args: serde_json::Value::Null,
                sync_name: sync.map(str::to_owned),
                parent_id: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
    }

    fn when_sync(name: &str, concept: &str, action: &str) -> Synchronization {
        Synchronization {
            id: SyncId::new(),
            name: name.to_owned(),
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
                args: BTreeMap::new(),
            }],
            description: String::new(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sync_drift_detected_and_persisted_not_enqueued() {
        // S6: Web/request completes repeatedly, sync Fan never fires.
        let dir = tempfile::tempdir().unwrap();
        let (gardener, store, queue) = gardener_in(dir.path());
        {
            let conn = store.conn().unwrap();
            SyncRepository::upsert(&conn, &when_sync("Fan", "Web", "request")).unwrap();
            for _ in 0..20 {
                flow(&conn, "Web", "request", None);
            }
        }

        let findings = gardener.sweep(true).unwrap();
        let drift: Vec<_> = findings
            .iter()
            .filter(|f| f.category == FindingCategory::SyncDrift)
            .collect();
        assert_eq!(drift.len(), 1);
        assert!(!drift[0].mechanical);
        assert!(drift[0].description.contains("Fan"));

        // Dry mode had no side effects.
        {
            let conn = store.conn().unwrap();
            assert!(QualityRepository::list_findings(&conn, 10).unwrap().is_empty());
        }
        assert_eq!(queue.status().unwrap().tasks, 0);

        // Wet mode persists the judgment finding but still enqueues nothing.
        let _ = gardener.sweep(false).unwrap();
        {
            let conn = store.conn().unwrap();
            let persisted = QualityRepository::list_findings(&conn, 10).unwrap();
            assert!(persisted.iter().any(|f| f.category == FindingCategory::SyncDrift));
        }
        assert_eq!(queue.status().unwrap().tasks, 0);
    }

    #[test]
    fn firing_sync_is_not_drift() {
        let dir = tempfile::tempdir().unwrap();
        let (gardener, store, _) = gardener_in(dir.path());
        {
            let conn = store.conn().unwrap();
            SyncRepository::upsert(&conn, &when_sync("Fan", "Web", "request")).unwrap();
            flow(&conn, "Web", "request", None);
            flow(&conn, "Search", "query", Some("Fan"));
        }
        let findings = gardener.sweep(true).unwrap();
        assert!(findings.iter().all(|f| f.category != FindingCategory::SyncDrift));
    }

    #[test]
    fn orphaned_region_requires_missing_markers_and_live_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.rs"),
            "// @region:app\n// @endregion:app\n",
        )
        .unwrap();

        let (gardener, store, _) = gardener_in(dir.path());
        seed_region(&store, "app");
        seed_region(&store, "app.ghost");
        seed_region(&store, "app.retired");
        {
            let conn = store.conn().unwrap();
            RegionRepository::set_lifecycle_state(
                &conn,
                "app.retired",
                gam_core::region::LifecycleState::Deprecated,
            )
            .unwrap();
        }

        let findings = gardener.sweep(true).unwrap();
        let orphans: Vec<&str> = findings
            .iter()
            .filter(|f| f.category == FindingCategory::OrphanedRegion)
            .map(|f| f.region_path.as_str())
            .collect();
        assert_eq!(orphans, vec!["app.ghost"]);
    }

    #[test]
    fn stale_todo_and_quality_findings_surface() {
        let dir = tempfile::tempdir().unwrap();
        let (gardener, store, _) = gardener_in(dir.path());
        seed_region(&store, "app");
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO turns (id, agent_role, scope_path, task_type, scratchpad, status, created_at, completed_at)
                 VALUES ('T_20250101_000000_aaaaaa', 'researcher', 'app', 'implement',
                         'TODO wire the cache', 'COMPLETED', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
            QualityRepository::upsert_grade(&conn, "app", "tests", "F", &serde_json::Value::Null, "m")
                .unwrap();
        }

        let findings = gardener.sweep(true).unwrap();
        assert!(findings.iter().any(|f| f.category == FindingCategory::StaleTodo
            && f.description.contains("TODO wire the cache")));
        assert!(findings
            .iter()
            .any(|f| f.category == FindingCategory::QualityDegradation && f.region_path == "app"));
    }
}
