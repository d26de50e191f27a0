//! The context compiler: assemble the memory bundle an agent receives at
//! turn start.
//!
//! Progressive disclosure, spec-first and implementation-blind: concept
//! specs and sync names go in; other concepts' implementation code never
//! does. The bundle is written to a shared artifact location named by
//! region path — the reference is a content pointer, not an identity, so
//! overwrites are safe.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use gam_store::repositories::{
    ConceptRepository, QualityRepository, SyncRepository, TurnRepository,
};
use gam_store::Store;

use crate::errors::EngineError;

/// Similarity floor for prompt-relevant memory.
pub const SIMILARITY_THRESHOLD: f64 = 0.1;
/// Limit for region-scoped memory entries.
pub const REGION_MEMORY_LIMIT: u32 = 10;
/// Limit for concept-scoped memory entries.
pub const CONCEPT_MEMORY_LIMIT: u32 = 10;
/// Limit for prompt-relevant memory entries.
pub const PROMPT_MEMORY_LIMIT: u32 = 5;

/// Compiles context bundles for turn starts.
pub struct ContextCompiler {
    store: Store,
    context_dir: PathBuf,
}

impl ContextCompiler {
    /// Create a compiler writing bundles under `context_dir`.
    #[must_use]
    pub fn new(store: Store, context_dir: PathBuf) -> Self {
        Self { store, context_dir }
    }

    /// Build the bundle and write it to the artifact location. Returns
    /// the bundle path.
    pub fn compile(&self, region_path: &str, prompt: Option<&str>) -> Result<PathBuf, EngineError> {
        let content = self.build(region_path, prompt)?;
        std::fs::create_dir_all(&self.context_dir)?;
        let file = self.artifact_path(region_path);
        std::fs::write(&file, content)?;
        debug!(region = region_path, bundle = %file.display(), "context bundle written");
        Ok(file)
    }

    /// Where the bundle for `region_path` lives.
    #[must_use]
    pub fn artifact_path(&self, region_path: &str) -> PathBuf {
        self.context_dir.join(format!("gam_context_{region_path}.md"))
    }

    /// Assemble the bundle in its fixed order: header, governing concept
    /// specs, referencing sync names, three memory strategies deduplicated
    /// by turn id, quality grades.
    pub fn build(&self, region_path: &str, prompt: Option<&str>) -> Result<String, EngineError> {
        let conn = self.store.conn()?;
        let mut out = format!("# Turn Context: {region_path}\n\n");

        let concepts = ConceptRepository::governing(&conn, region_path)?;
        if !concepts.is_empty() {
            out.push_str("## Concepts\n\n");
            for concept in &concepts {
                out.push_str(&format!("### {}\nPurpose: {}\n", concept.name, concept.purpose));
                out.push_str(&format!(
                    "Spec:\n```json\n{}\n```\n\n",
                    serde_json::to_string_pretty(&concept.spec)?
                ));
            }
        }

        let mut sync_names: Vec<String> = Vec::new();
        for concept in &concepts {
            for name in SyncRepository::enabled_syncs_referencing_concept(&conn, &concept.name)? {
                if !sync_names.contains(&name) {
                    sync_names.push(name);
                }
            }
        }
        if !sync_names.is_empty() {
            out.push_str("## Synchronizations\n\n");
            for name in &sync_names {
                out.push_str(&format!("- {name}\n"));
            }
            out.push('\n');
        }

        let mut seen: HashSet<String> = HashSet::new();

        let region_memory =
            TurnRepository::region_scoped_memory(&conn, region_path, REGION_MEMORY_LIMIT)?;
        if !region_memory.is_empty() {
            out.push_str("## Turn Memory (region-scoped)\n\n");
            for entry in region_memory {
                if seen.insert(entry.turn_id.to_string()) {
                    out.push_str(&format!(
                        "[{}] scope={}\n{}\n\n",
                        entry.turn_id, entry.scope_path, entry.scratchpad
                    ));
                }
            }
        }

        let concept_names: Vec<String> = concepts.iter().map(|c| c.name.clone()).collect();
        let concept_memory =
            TurnRepository::concept_scoped_memory(&conn, &concept_names, CONCEPT_MEMORY_LIMIT)?;
        let fresh: Vec<_> = concept_memory
            .into_iter()
            .filter(|e| !seen.contains(e.turn_id.as_str()))
            .collect();
        if !fresh.is_empty() {
            out.push_str("## Turn Memory (concept-scoped)\n\n");
            for entry in fresh {
                let _ = seen.insert(entry.turn_id.to_string());
                out.push_str(&format!(
                    "[{}] scope={}\n{}\n\n",
                    entry.turn_id, entry.scope_path, entry.scratchpad
                ));
            }
        }

        if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
            let relevant = TurnRepository::similar_scratchpads(
                &conn,
                prompt,
                SIMILARITY_THRESHOLD,
                PROMPT_MEMORY_LIMIT,
            )?;
            let fresh: Vec<_> = relevant
                .into_iter()
                .filter(|e| !seen.contains(e.turn_id.as_str()))
                .collect();
            if !fresh.is_empty() {
                out.push_str("## Turn Memory (prompt-relevant)\n\n");
                for entry in fresh {
                    let relevance = (entry.similarity.unwrap_or_default() * 100.0).round();
                    let _ = seen.insert(entry.turn_id.to_string());
                    out.push_str(&format!(
                        "[{}] scope={} (relevance={relevance:.0}%)\n{}\n\n",
                        entry.turn_id, entry.scope_path, entry.scratchpad
                    ));
                }
            }
        }

        let grades = QualityRepository::grades_for_region(&conn, region_path)?;
        if !grades.is_empty() {
            out.push_str("## Quality Grades\n\n");
            for grade in grades {
                out.push_str(&format!("  {}: {}\n", grade.category, grade.grade));
            }
        }

        Ok(out)
    }
}

/// Build a bundle without touching disk — exposed for `turn start`
/// display and tests.
pub fn compile_to_string(
    store: &Store,
    region_path: &str,
    prompt: Option<&str>,
) -> Result<String, EngineError> {
    ContextCompiler::new(store.clone(), Path::new(".").to_path_buf()).build(region_path, prompt)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{complete_turn_touching, seed_concept, seed_region};

    #[test]
    fn bundle_order_and_dedup() {
        let store = Store::open_in_memory().unwrap();
        seed_region(&store, "app");
        seed_region(&store, "app.search");
        seed_concept(&store, "Search", "app", &["query"]);
        {
            let conn = store.conn().unwrap();
            QualityRepository::upsert_grade(
                &conn,
                "app.search",
                "tests",
                "B",
                &serde_json::Value::Null,
                "memorizer",
            )
            .unwrap();
        }

        // One completed turn touching app.search: eligible for both the
        // region strategy and (via the Search assignment) the concept
        // strategy — it must appear once.
        complete_turn_touching(
            &store,
            "T_20260101_000000_aaaaaa",
            "app.search",
            "implemented query fan-out",
        );

        let bundle = compile_to_string(&store, "app.search", None).unwrap();

        let header = bundle.find("# Turn Context: app.search").unwrap();
        let concepts = bundle.find("## Concepts").unwrap();
        let memory = bundle.find("## Turn Memory (region-scoped)").unwrap();
        let grades = bundle.find("## Quality Grades").unwrap();
        assert!(header < concepts && concepts < memory && memory < grades);

        assert_eq!(bundle.matches("T_20260101_000000_aaaaaa").count(), 1, "deduplicated");
        assert!(!bundle.contains("concept-scoped"), "empty sections are omitted");
        assert!(bundle.contains("Purpose:"));
        assert!(bundle.contains("tests: B"));
    }

    #[test]
    fn prompt_strategy_needs_a_prompt() {
        let store = Store::open_in_memory().unwrap();
        seed_region(&store, "app");
        complete_turn_touching(
            &store,
            "T_20260101_000000_bbbbbb",
            "app",
            "rewrote the retry backoff for queue consumers",
        );

        let without = compile_to_string(&store, "app", None).unwrap();
        assert!(!without.contains("prompt-relevant"));

        // An unrelated region still surfaces prompt-relevant memory.
        seed_region(&store, "web");
        let with = compile_to_string(&store, "web", Some("queue consumer retry backoff")).unwrap();
        assert!(with.contains("## Turn Memory (prompt-relevant)"));
        assert!(with.contains("relevance="));
    }

    #[test]
    fn compile_writes_artifact_named_by_region() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        seed_region(&store, "app.search");

        let compiler = ContextCompiler::new(store, dir.path().to_path_buf());
        let path = compiler.compile("app.search", None).unwrap();
        assert!(path.ends_with("gam_context_app.search.md"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("# Turn Context: app.search"));

        // Overwrite is safe: the ref is a content pointer.
        let again = compiler.compile("app.search", None).unwrap();
        assert_eq!(again, compiler.artifact_path("app.search"));
    }
}
