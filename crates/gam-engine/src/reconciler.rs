//! The architecture reconciler: keep the manifest's namespace set and the
//! store's region set aligned.
//!
//! `sync` is additive in both directions and never rewrites existing
//! manifest content. `export` overwrites the manifest from store state
//! and destroys manual descriptions — callers must treat it as the
//! destructive direction. `import` treats the manifest as canonical for
//! additions only; nothing is ever deleted from the store.

use std::path::PathBuf;

use tracing::info;

use gam_region::manifest::{append_arch_paths, parse_arch_paths, write_manifest};
use gam_store::repositories::RegionRepository;
use gam_store::Store;

use crate::errors::EngineError;

/// What one `sync` pass changed.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// Paths inserted into the store (found only in the manifest).
    pub added_to_store: Vec<String>,
    /// Paths appended to the manifest (found only in the store).
    pub added_to_manifest: Vec<String>,
}

/// The reconciler.
pub struct ArchReconciler {
    store: Store,
    project_root: PathBuf,
}

impl ArchReconciler {
    /// Create a reconciler rooted at `project_root`.
    #[must_use]
    pub fn new(store: Store, project_root: PathBuf) -> Self {
        Self {
            store,
            project_root,
        }
    }

    /// Bidirectional additive reconciliation.
    pub fn sync(&self) -> Result<SyncReport, EngineError> {
        let manifest_paths = parse_arch_paths(&self.project_root)?;
        let conn = self.store.conn()?;
        let store_paths = RegionRepository::paths(&conn)?;

        let mut report = SyncReport::default();

        for path in &manifest_paths {
            if RegionRepository::insert_if_absent(&conn, path)? {
                report.added_to_store.push(path.clone());
            }
        }

        let manifest_set: std::collections::HashSet<&str> =
            manifest_paths.iter().map(String::as_str).collect();
        for path in store_paths {
            if !manifest_set.contains(path.as_str()) {
                report.added_to_manifest.push(path);
            }
        }
        append_arch_paths(&self.project_root, &report.added_to_manifest)?;

        info!(
            to_store = report.added_to_store.len(),
            to_manifest = report.added_to_manifest.len(),
            "arch sync complete"
        );
        Ok(report)
    }

    /// Overwrite the manifest from store state. Destroys manual content.
    pub fn export(&self) -> Result<usize, EngineError> {
        let conn = self.store.conn()?;
        let entries: Vec<(String, Option<String>)> = RegionRepository::list(&conn)?
            .into_iter()
            .map(|r| (r.path, r.description))
            .collect();
        write_manifest(&self.project_root, &entries)?;
        Ok(entries.len())
    }

    /// Insert missing manifest paths into the store. The manifest is
    /// canonical; nothing is written back to it.
    pub fn import(&self) -> Result<usize, EngineError> {
        let conn = self.store.conn()?;
        let mut imported = 0;
        for path in parse_arch_paths(&self.project_root)? {
            if RegionRepository::insert_if_absent(&conn, &path)? {
                imported += 1;
            }
        }
        Ok(imported)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
