//! Tier 0 — structural checks.
//!
//! Everything here is recoverable by editing source or the manifest, so
//! each fix names the exact edit and the reconcile command to run after.

use std::path::Path;

use gam_core::proposal::Proposal;
use gam_core::validation::{code, ValidationDetail, ValidationResult};
use gam_region::file_has_region_markers;
use gam_store::repositories::{RegionRepository, TurnRepository};
use gam_store::Store;

use crate::ValidatorError;

/// Run the Tier 0 checks in order: region exists, scope containment,
/// markers present for every claimed modification.
pub fn tier0(
    store: &Store,
    project_root: &Path,
    proposal: &Proposal,
) -> Result<ValidationResult, ValidatorError> {
    let conn = store.conn()?;

    if !RegionRepository::exists(&conn, &proposal.region_path)? {
        return Ok(ValidationResult::fail(
            0,
            code::REGION_MISSING,
            format!("Region {} not found in arch.md", proposal.region_path),
            ValidationDetail::fail(
                "region_exists",
                format!("region {} exists", proposal.region_path),
                "not found",
                format!(
                    "Add '{path}' to arch.md and add @region:{path} / @endregion:{path} markers \
                     to source code. Then run: gam arch sync",
                    path = proposal.region_path
                ),
            ),
        ));
    }

    if let Some(turn) = TurnRepository::get(&conn, &proposal.turn_id)? {
        if !in_scope(&proposal.region_path, &turn.scope_path) {
            return Ok(ValidationResult::fail(
                0,
                code::OUT_OF_SCOPE,
                format!("Region {} is outside turn scope", proposal.region_path),
                ValidationDetail::fail(
                    "scope_check",
                    format!("region within turn scope {}", turn.scope_path),
                    format!("region {} outside scope", proposal.region_path),
                    format!(
                        "Start a new turn with scope including {}, or widen the current turn's scope.",
                        proposal.region_path
                    ),
                ),
            ));
        }
    }

    for modified in &proposal.evidence.modified_regions {
        let file = resolve(project_root, &modified.file);
        if !file_has_region_markers(&file, &modified.path) {
            return Ok(ValidationResult::fail(
                0,
                code::MARKERS_MISSING,
                format!("File {} missing region markers for {}", modified.file, modified.path),
                ValidationDetail::fail(
                    "region_markers",
                    format!("@region:{} in {}", modified.path, modified.file),
                    "missing",
                    format!(
                        "Add @region:{path} / @endregion:{path} markers to {file}",
                        path = modified.path,
                        file = modified.file
                    ),
                ),
            ));
        }
    }

    Ok(ValidationResult::pass(0))
}

/// `region` is `scope` itself or a dotted descendant of it.
fn in_scope(region: &str, scope: &str) -> bool {
    region == scope || region.starts_with(&format!("{scope}."))
}

fn resolve(project_root: &Path, file: &str) -> std::path::PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
