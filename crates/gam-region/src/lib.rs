//! # gam-region
//!
//! Region marker discovery and the architecture manifest.
//!
//! Source files are tagged with `@region:<path>` / `@endregion:<path>`
//! markers in the comment syntax native to each file extension. The same
//! markers in `arch.md` form the skeletal architecture manifest. This crate
//! parses both, builds the region tree, captures snapshots for turn
//! diffing, and validates manifest hierarchy.
//!
//! The scanner is permissive on input and strict on completeness:
//! malformed marker lines are ignored, unreadable files are skipped with a
//! trace, but every unpaired marker produces a warning.

#![deny(unsafe_code)]

pub mod manifest;
pub mod markers;
pub mod scanner;
pub mod tree;

pub use manifest::{ArchEntry, parse_arch_entries, parse_arch_paths, validate_arch_hierarchy};
pub use markers::{comment_prefix, end_region_tag, region_tag, scaffold_region};
pub use scanner::{
    IgnorePatterns, RegionMarker, ScanOutcome, file_has_region_markers, find_unregioned,
    parse_gamignore, scan_directory, scan_file, snapshot_tree,
};
pub use tree::{TreeNode, build_tree, format_tree};

use thiserror::Error;

/// Errors from scanning and manifest handling. Per-file read failures are
/// skipped, not raised; these cover unreadable roots and manifest writes.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The scan root or manifest could not be read/written.
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A `.gamignore` pattern failed to compile as a glob.
    #[error("invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl RegionError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
