//! Source scanning: marker extraction from files and directory trees,
//! `.gamignore` handling, unregioned-file discovery, and tree snapshots.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use tracing::trace;

use gam_core::turn::TreeSnapshot;

use crate::markers::{extract_region_path, known_extension};
use crate::RegionError;

/// Directory names always skipped during scans.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "vendor", "target"];

/// A parsed region marker in a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionMarker {
    /// Namespace path, e.g. `app.search.sources.btv2`.
    pub path: String,
    /// Source file the marker lives in.
    pub file: PathBuf,
    /// Line of the `@region` marker (1-based).
    pub start_line: usize,
    /// Line of the `@endregion` marker; 0 while unclosed.
    pub end_line: usize,
}

/// Markers plus completeness warnings from a scan.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    pub markers: Vec<RegionMarker>,
    pub warnings: Vec<String>,
}

/// Compiled `.gamignore` patterns.
///
/// A relative path is ignored when it glob-matches a pattern, falls under a
/// directory pattern (trailing `/`), or starts with a pattern as a raw
/// prefix.
#[derive(Clone, Debug, Default)]
pub struct IgnorePatterns {
    raw: Vec<String>,
    globs: Vec<GlobMatcher>,
}

impl IgnorePatterns {
    /// Compile a pattern list. Patterns that fail to compile as globs are
    /// kept for prefix matching only.
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self {
        let globs = patterns
            .iter()
            .filter_map(|p| Glob::new(p).ok().map(|g| g.compile_matcher()))
            .collect();
        Self { raw: patterns, globs }
    }

    /// Whether `rel_path` matches any pattern.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.globs.iter().any(|g| g.is_match(rel_path)) {
            return true;
        }
        self.raw.iter().any(|pattern| {
            if let Some(dir) = pattern.strip_suffix('/') {
                if rel_path.starts_with(dir) {
                    return true;
                }
            }
            rel_path.starts_with(pattern.as_str())
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Read `.gamignore` from the project root. Blank lines and `#` comments
/// are skipped; a missing file yields no patterns.
#[must_use]
pub fn parse_gamignore(project_root: &Path) -> IgnorePatterns {
    let path = project_root.join(".gamignore");
    let Ok(data) = fs::read_to_string(&path) else {
        return IgnorePatterns::default();
    };
    let patterns = data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect();
    IgnorePatterns::new(patterns)
}

/// Scan one file for region markers.
///
/// Linear pass: `@region:X` opens, `@endregion:X` must close a matching
/// open. Warnings cover every `@endregion` without an open and every
/// region still open at EOF. Malformed lines are ignored.
pub fn scan_file(file: &Path) -> Result<ScanOutcome, RegionError> {
    let data =
        fs::read_to_string(file).map_err(|e| RegionError::io(file.display().to_string(), e))?;

    let mut outcome = ScanOutcome::default();
    let mut open: HashMap<String, usize> = HashMap::new();

    for (idx, raw_line) in data.lines().enumerate() {
        let line_num = idx + 1;
        let line = raw_line.trim();

        if let Some(path) = extract_region_path(line, "region") {
            let marker = RegionMarker {
                path: path.clone(),
                file: file.to_path_buf(),
                start_line: line_num,
                end_line: 0,
            };
            open.insert(path, outcome.markers.len());
            outcome.markers.push(marker);
        }

        if let Some(path) = extract_region_path(line, "endregion") {
            match open.remove(&path) {
                Some(marker_idx) => outcome.markers[marker_idx].end_line = line_num,
                None => outcome.warnings.push(format!(
                    "{}:{}: @endregion:{} without matching @region",
                    file.display(),
                    line_num,
                    path
                )),
            }
        }
    }

    for (path, marker_idx) in open {
        outcome.warnings.push(format!(
            "{}:{}: @region:{} never closed",
            file.display(),
            outcome.markers[marker_idx].start_line,
            path
        ));
    }

    Ok(outcome)
}

/// Walk a directory tree collecting markers from every file with a known
/// extension, skipping `.git`-like directories and ignored paths.
/// Unreadable files are skipped; an unreadable root is fatal.
pub fn scan_directory(root: &Path, ignore: &IgnorePatterns) -> Result<ScanOutcome, RegionError> {
    if !root.is_dir() {
        return Err(RegionError::io(
            root.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "scan root is not a directory"),
        ));
    }

    let mut outcome = ScanOutcome::default();
    for_each_source_file(root, ignore, |file| {
        match scan_file(file) {
            Ok(file_outcome) => {
                outcome.markers.extend(file_outcome.markers);
                outcome.warnings.extend(file_outcome.warnings);
            }
            Err(err) => trace!(file = %file.display(), %err, "skipping unreadable file"),
        }
    });
    Ok(outcome)
}

/// Files of known extension, not ignored, containing no markers at all.
pub fn find_unregioned(root: &Path, ignore: &IgnorePatterns) -> Result<Vec<PathBuf>, RegionError> {
    if !root.is_dir() {
        return Err(RegionError::io(
            root.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "scan root is not a directory"),
        ));
    }

    let mut unregioned = Vec::new();
    for_each_source_file(root, ignore, |file| {
        if let Ok(outcome) = scan_file(file) {
            if outcome.markers.is_empty() {
                let rel = file.strip_prefix(root).unwrap_or(file);
                unregioned.push(rel.to_path_buf());
            }
        }
    });
    unregioned.sort();
    Ok(unregioned)
}

/// Whether `file` contains markers for exactly `region_path`.
#[must_use]
pub fn file_has_region_markers(file: &Path, region_path: &str) -> bool {
    scan_file(file)
        .map(|o| o.markers.iter().any(|m| m.path == region_path))
        .unwrap_or(false)
}

/// Capture the region tree as a snapshot: path to sorted
/// `file:start-end` locations, with files relative to `root`.
pub fn snapshot_tree(root: &Path, ignore: &IgnorePatterns) -> Result<TreeSnapshot, RegionError> {
    let outcome = scan_directory(root, ignore)?;
    let mut snapshot = TreeSnapshot::new();
    for marker in &outcome.markers {
        let rel = marker.file.strip_prefix(root).unwrap_or(&marker.file);
        snapshot
            .entry(marker.path.clone())
            .or_default()
            .push(format!("{}:{}-{}", rel.display(), marker.start_line, marker.end_line));
    }
    for locations in snapshot.values_mut() {
        locations.sort();
    }
    Ok(snapshot)
}

fn for_each_source_file(root: &Path, ignore: &IgnorePatterns, mut visit: impl FnMut(&Path)) {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if is_dir {
                let name = entry.file_name().to_string_lossy();
                return !SKIPPED_DIRS.contains(&name.as_ref());
            }
            true
        })
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !known_extension(path) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        if ignore.is_ignored(&rel.to_string_lossy()) {
            continue;
        }
        visit(path);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
