//! Markdown projection of the persistent state into a `docs/` tree.
//!
//! Concepts, syncs, execution plans (active vs completed), quality
//! grades, and golden principles each get their own corner, with index
//! files for the catalogs. Import remains declared-but-refused; the
//! direction of truth under bulk import is still undefined.

use std::fs;
use std::path::PathBuf;

use gam_core::concept::StateComponent;
use gam_core::plan::PlanTurnStatus;
use gam_store::repositories::{
    ConceptRepository, PlanRepository, QualityRepository, SyncRepository,
};
use gam_store::Store;

use crate::errors::EngineError;

/// Projects store state into `docs/`.
pub struct DocsExporter {
    store: Store,
    project_root: PathBuf,
}

impl DocsExporter {
    /// Create an exporter rooted at `project_root`.
    #[must_use]
    pub fn new(store: Store, project_root: PathBuf) -> Self {
        Self {
            store,
            project_root,
        }
    }

    fn docs_dir(&self) -> PathBuf {
        self.project_root.join("docs")
    }

    /// Regenerate the entire docs tree.
    pub fn export_all(&self) -> Result<(), EngineError> {
        for sub in [
            "concepts",
            "syncs",
            "exec-plans/active",
            "exec-plans/completed",
            "quality",
        ] {
            fs::create_dir_all(self.docs_dir().join(sub))?;
        }
        self.export_concepts()?;
        self.export_syncs()?;
        self.export_plans()?;
        self.export_quality()
    }

    /// Write one file per concept plus an index.
    pub fn export_concepts(&self) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        let dir = self.docs_dir().join("concepts");
        fs::create_dir_all(&dir)?;

        let mut index = String::from("# Concept Catalog\n\n");
        for concept in ConceptRepository::list(&conn)? {
            index.push_str(&format!("- **{}**: {}\n", concept.name, concept.purpose));

            let mut content = format!("# {}\n\n**Purpose**: {}\n\n", concept.name, concept.purpose);
            if !concept.spec.type_params.is_empty() {
                content.push_str(&format!(
                    "**Type Parameters**: {}\n\n",
                    concept.spec.type_params.join(", ")
                ));
            }
            if !concept.spec.state.is_empty() {
                content.push_str("## State\n\n");
                for (field, component) in &concept.spec.state {
                    match component {
                        StateComponent::Set { of } => {
                            content.push_str(&format!("- `{field}`: set {of}\n"));
                        }
                        StateComponent::Map { from, to } => {
                            content.push_str(&format!("- `{field}`: {from} -> {to}\n"));
                        }
                    }
                }
                content.push('\n');
            }
            if !concept.spec.actions.is_empty() {
                content.push_str("## Actions\n\n");
                for (action, spec) in &concept.spec.actions {
                    for case in &spec.cases {
                        let input: Vec<String> =
                            case.input.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                        let output: Vec<String> =
                            case.output.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                        content.push_str(&format!(
                            "- `{action} [{}] => [{}]`\n",
                            input.join("; "),
                            output.join("; ")
                        ));
                        if !case.description.is_empty() {
                            content.push_str(&format!("  {}\n", case.description));
                        }
                    }
                }
                content.push('\n');
            }
            if !concept.invariants.is_empty() {
                content.push_str("## Invariants\n\n");
                for invariant in &concept.invariants {
                    content.push_str(&format!(
                        "- **{}** ({}): {}\n",
                        invariant.name,
                        invariant.kind.as_str(),
                        invariant.rule.as_deref().unwrap_or("")
                    ));
                }
                content.push('\n');
            }
            if !concept.spec.operational_principle.is_empty() {
                content.push_str(&format!(
                    "## Operational Principle\n\n```\n{}\n```\n",
                    concept.spec.operational_principle
                ));
            }

            fs::write(dir.join(format!("{}.md", slug(&concept.name))), content)?;
        }
        fs::write(dir.join("index.md"), index)?;
        Ok(())
    }

    /// Write one file per sync plus an index.
    pub fn export_syncs(&self) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        let dir = self.docs_dir().join("syncs");
        fs::create_dir_all(&dir)?;

        let mut index = String::from("# Synchronization Catalog\n\n");
        for sync in SyncRepository::list(&conn, false)? {
            let status = if sync.enabled { "enabled" } else { "disabled" };
            index.push_str(&format!("- **{}** ({status}): {}\n", sync.name, sync.description));

            let mut content = format!("# sync {}\n\n", sync.name);
            if !sync.description.is_empty() {
                content.push_str(&format!("{}\n\n", sync.description));
            }
            content.push_str(&format!("Status: {status}\n\n"));
            content.push_str(&format!(
                "## When\n```json\n{}\n```\n\n",
                serde_json::to_string_pretty(&sync.when_clause)?
            ));
            if !sync.where_clause.is_empty() {
                content.push_str(&format!(
                    "## Where\n```json\n{}\n```\n\n",
                    serde_json::to_string_pretty(&sync.where_clause)?
                ));
            }
            content.push_str(&format!(
                "## Then\n```json\n{}\n```\n",
                serde_json::to_string_pretty(&sync.then_clause)?
            ));

            fs::write(dir.join(format!("{}.md", slug(&sync.name))), content)?;
        }
        fs::write(dir.join("index.md"), index)?;
        Ok(())
    }

    /// Write each plan under `exec-plans/active` or `exec-plans/completed`.
    pub fn export_plans(&self) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        for sub in ["exec-plans/active", "exec-plans/completed"] {
            fs::create_dir_all(self.docs_dir().join(sub))?;
        }

        for plan in PlanRepository::list(&conn)? {
            let mut content = format!("# {}\n\n**Goal**: {}\n\n", plan.name, plan.goal);
            content.push_str(&format!("**Status**: {}\n\n", plan.status.as_str()));
            if let Some(grade) = &plan.quality_grade {
                content.push_str(&format!("**Quality Grade**: {grade}\n\n"));
            }

            let turns = PlanRepository::plan_turns(&conn, &plan.id)?;
            if !turns.is_empty() {
                content.push_str("## Progress\n\n");
                for turn in &turns {
                    let marker = match turn.status {
                        PlanTurnStatus::Completed => "[x]",
                        PlanTurnStatus::Active => "[>]",
                        PlanTurnStatus::Pending | PlanTurnStatus::Blocked => "[ ]",
                    };
                    content.push_str(&format!(
                        "{marker} {} — {} ({})\n",
                        turn.turn_id,
                        turn.region_path,
                        turn.status.as_str()
                    ));
                }
                content.push('\n');
            }

            if !plan.decisions.is_empty() {
                content.push_str("## Decisions\n\n");
                for decision in &plan.decisions {
                    content.push_str(&format!(
                        "- **{}**: {}\n",
                        decision.description, decision.rationale
                    ));
                }
                content.push('\n');
            }

            let sub = if plan.status == gam_core::plan::PlanStatus::Completed {
                "completed"
            } else {
                "active"
            };
            fs::write(
                self.docs_dir().join("exec-plans").join(sub).join(format!("{}.md", slug(&plan.name))),
                content,
            )?;
        }
        Ok(())
    }

    /// Write quality grades and golden principles.
    pub fn export_quality(&self) -> Result<(), EngineError> {
        let conn = self.store.conn()?;
        let dir = self.docs_dir().join("quality");
        fs::create_dir_all(&dir)?;

        let mut grades = String::from("# Quality Grades\n\n");
        let mut current_region = String::new();
        for (path, grade) in QualityRepository::all_grades(&conn)? {
            if path != current_region {
                grades.push_str(&format!("\n## {path}\n\n"));
                current_region = path;
            }
            grades.push_str(&format!("- {}: **{}**\n", grade.category, grade.grade));
        }
        fs::write(dir.join("grades.md"), grades)?;

        let mut principles = String::from("# Golden Principles\n\n");
        for principle in QualityRepository::list_principles(&conn, false)? {
            let status = if principle.enabled { "enabled" } else { "disabled" };
            principles.push_str(&format!("## {} ({status})\n\n", principle.name));
            principles.push_str(&format!("**Rule**: {}\n\n", principle.rule));
            principles.push_str(&format!("**Remediation**: {}\n\n", principle.remediation));
        }
        fs::write(dir.join("golden-principles.md"), principles)?;
        Ok(())
    }

    /// Bulk import from `docs/` back into the store. Declared but
    /// refused; use the granular add commands instead.
    pub fn import_docs(&self) -> Result<(), EngineError> {
        Err(EngineError::Unsupported(
            "docs import is not implemented — use 'gam concept add' and 'gam sync add' for \
             individual imports"
                .to_owned(),
        ))
    }

    /// Counts of exported files per subdirectory, for `docs status`.
    pub fn status(&self) -> Result<Vec<(String, usize)>, EngineError> {
        let mut out = Vec::new();
        for sub in ["concepts", "syncs", "exec-plans/active", "exec-plans/completed", "quality"] {
            let dir = self.docs_dir().join(sub);
            let count = match fs::read_dir(&dir) {
                Ok(entries) => entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|x| x == "md"))
                    .count(),
                Err(_) => 0,
            };
            out.push((sub.to_owned(), count));
        }
        Ok(out)
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_concept, seed_region};
    use gam_core::quality::GoldenPrinciple;
    use std::path::Path;

    fn exporter_in(dir: &Path) -> (DocsExporter, Store) {
        let store = Store::open_in_memory().unwrap();
        (DocsExporter::new(store.clone(), dir.to_path_buf()), store)
    }

    #[test]
    fn export_all_writes_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let (exporter, store) = exporter_in(dir.path());
        seed_region(&store, "app");
        seed_concept(&store, "Search", "app", &["query"]);
        {
            let conn = store.conn().unwrap();
            QualityRepository::upsert_grade(&conn, "app", "tests", "A", &serde_json::Value::Null, "m")
                .unwrap();
            QualityRepository::upsert_principle(
                &conn,
                &GoldenPrinciple {
                    name: "small-regions".into(),
                    rule: "regions stay under one screen".into(),
                    lint_check: None,
                    remediation: "split the region".into(),
                    enabled: true,
                },
            )
            .unwrap();
        }

        exporter.export_all().unwrap();

        let concept_doc =
            fs::read_to_string(dir.path().join("docs/concepts/search.md")).unwrap();
        assert!(concept_doc.contains("# Search"));
        assert!(concept_doc.contains("## Actions"));

        let index = fs::read_to_string(dir.path().join("docs/concepts/index.md")).unwrap();
        assert!(index.contains("**Search**"));

        let grades = fs::read_to_string(dir.path().join("docs/quality/grades.md")).unwrap();
        assert!(grades.contains("## app"));
        assert!(grades.contains("tests: **A**"));

        let principles =
            fs::read_to_string(dir.path().join("docs/quality/golden-principles.md")).unwrap();
        assert!(principles.contains("## small-regions (enabled)"));

        let status = exporter.status().unwrap();
        let concepts = status.iter().find(|(s, _)| s == "concepts").unwrap();
        assert_eq!(concepts.1, 2, "concept file plus index");
    }

    #[test]
    fn import_is_refused_with_remediation() {
        let dir = tempfile::tempdir().unwrap();
        let (exporter, _) = exporter_in(dir.path());
        let err = exporter.import_docs().unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
        assert!(err.to_string().contains("gam concept add"));
    }
}
