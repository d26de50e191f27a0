//! The architecture manifest: `arch.md` at the project root.
//!
//! Lines of interest are marker pairs in any comment syntax, with an
//! optional one-line description after the opening path. Non-marker lines
//! are ignored, so the manifest stays human-editable.

use std::fs;
use std::path::Path;

use crate::markers::{extract_description, extract_region_path};
use crate::RegionError;

/// Conventional manifest file name.
pub const ARCH_FILE: &str = "arch.md";

/// A namespace entry declared in the manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchEntry {
    pub path: String,
    pub description: String,
    /// 1-based manifest line number of the opening marker.
    pub line: usize,
}

/// Parse manifest entries with descriptions. A missing manifest yields an
/// empty list; duplicate paths keep the first occurrence.
pub fn parse_arch_entries(project_root: &Path) -> Result<Vec<ArchEntry>, RegionError> {
    let path = project_root.join(ARCH_FILE);
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegionError::io(path.display().to_string(), e)),
    };

    let mut entries: Vec<ArchEntry> = Vec::new();
    for (idx, raw_line) in data.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        // @endregion lines carry the same paths, no new information.
        if let Some(region_path) = extract_region_path(line, "region") {
            if entries.iter().any(|e| e.path == region_path) {
                continue;
            }
            let description = extract_description(line, &region_path);
            entries.push(ArchEntry {
                path: region_path,
                description,
                line: idx + 1,
            });
        }
    }
    Ok(entries)
}

/// Parse just the declared paths, in manifest order.
pub fn parse_arch_paths(project_root: &Path) -> Result<Vec<String>, RegionError> {
    Ok(parse_arch_entries(project_root)?
        .into_iter()
        .map(|e| e.path)
        .collect())
}

/// Verify hierarchy consistency: every multi-segment path must have its
/// parent declared. Returns one finding per violation.
pub fn validate_arch_hierarchy(project_root: &Path) -> Result<Vec<String>, RegionError> {
    let entries = parse_arch_entries(project_root)?;
    let declared: std::collections::HashSet<&str> =
        entries.iter().map(|e| e.path.as_str()).collect();

    let mut issues = Vec::new();
    for entry in &entries {
        let Some(parent) = gam_core::region::parent_path(&entry.path) else {
            continue;
        };
        if !declared.contains(parent) {
            issues.push(format!(
                "{ARCH_FILE}:{}: namespace {} has no parent {} defined",
                entry.line, entry.path, parent
            ));
        }
    }
    Ok(issues)
}

/// Append marker pairs for `paths` to the manifest without rewriting
/// existing content. Creates the file when absent.
pub fn append_arch_paths(project_root: &Path, paths: &[String]) -> Result<(), RegionError> {
    if paths.is_empty() {
        return Ok(());
    }
    let file = project_root.join(ARCH_FILE);
    let mut content = match fs::read_to_string(&file) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(RegionError::io(file.display().to_string(), e)),
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for path in paths {
        content.push_str(&format!("# @region:{path}\n# @endregion:{path}\n"));
    }
    fs::write(&file, content).map_err(|e| RegionError::io(file.display().to_string(), e))
}

/// Overwrite the manifest from `(path, description)` pairs. Destroys
/// manual content; callers must treat this as the destructive export.
pub fn write_manifest(
    project_root: &Path,
    entries: &[(String, Option<String>)],
) -> Result<(), RegionError> {
    let mut content = String::from(
        "# Architecture\n# Region markers define the namespace tree for this project.\n\n",
    );
    for (path, description) in entries {
        match description.as_deref().filter(|d| !d.is_empty()) {
            Some(desc) => content.push_str(&format!("# @region:{path} {desc}\n")),
            None => content.push_str(&format!("# @region:{path}\n")),
        }
        content.push_str(&format!("# @endregion:{path}\n"));
    }
    let file = project_root.join(ARCH_FILE);
    fs::write(&file, content).map_err(|e| RegionError::io(file.display().to_string(), e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
