//! Marker lexical forms: comment styles per extension, tag rendering, and
//! scaffolding markers into files.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::scanner::file_has_region_markers;
use crate::RegionError;

/// Line-comment prefixes by file extension.
const LINE_COMMENT: &[(&str, &str)] = &[
    ("rs", "//"),
    ("go", "//"),
    ("c", "//"),
    ("h", "//"),
    ("java", "//"),
    ("js", "//"),
    ("ts", "//"),
    ("tsx", "//"),
    ("jsx", "//"),
    ("swift", "//"),
    ("py", "#"),
    ("rb", "#"),
    ("sh", "#"),
    ("bash", "#"),
    ("yaml", "#"),
    ("yml", "#"),
    ("toml", "#"),
    ("sql", "--"),
    ("lua", "--"),
    ("hs", "--"),
    ("css", "/*"),
    ("scss", "/*"),
];

/// Extensions using `<!-- -->` comment syntax.
const HTML_STYLE: &[&str] = &["html", "xml", "vue", "svelte"];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Whether the scanner understands this file's comment syntax.
#[must_use]
pub fn known_extension(path: &Path) -> bool {
    let ext = extension(path);
    HTML_STYLE.contains(&ext.as_str()) || LINE_COMMENT.iter().any(|(e, _)| *e == ext)
}

/// The comment prefix for a file, defaulting to `//`.
#[must_use]
pub fn comment_prefix(path: &Path) -> &'static str {
    let ext = extension(path);
    if HTML_STYLE.contains(&ext.as_str()) {
        return "<!--";
    }
    LINE_COMMENT
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or("//", |(_, p)| p)
}

/// The opening marker line for `region_path` in `file`'s comment syntax.
#[must_use]
pub fn region_tag(region_path: &str, file: &Path) -> String {
    tag("region", region_path, file)
}

/// The closing marker line for `region_path` in `file`'s comment syntax.
#[must_use]
pub fn end_region_tag(region_path: &str, file: &Path) -> String {
    tag("endregion", region_path, file)
}

fn tag(kind: &str, region_path: &str, file: &Path) -> String {
    let ext = extension(file);
    if HTML_STYLE.contains(&ext.as_str()) {
        return format!("<!-- @{kind}:{region_path} -->");
    }
    let prefix = comment_prefix(file);
    if prefix == "/*" {
        return format!("/* @{kind}:{region_path} */");
    }
    format!("{prefix} @{kind}:{region_path}")
}

/// Extract the region path from a marker line, tolerating any of the five
/// comment styles. `kind` is `region` or `endregion`. Trailing comment
/// closers are stripped; the first whitespace-delimited word is the path.
#[must_use]
pub fn extract_region_path(line: &str, kind: &str) -> Option<String> {
    let marker = format!("@{kind}:");
    let idx = line.find(&marker)?;
    let rest = line[idx + marker.len()..]
        .trim_end()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim();
    let path = rest.split_whitespace().next()?;
    Some(path.to_owned())
}

/// Everything after the path on an opening marker line; the manifest uses
/// this as a one-line description.
#[must_use]
pub fn extract_description(line: &str, region_path: &str) -> String {
    let marker = format!("@region:{region_path}");
    let Some(idx) = line.find(&marker) else {
        return String::new();
    };
    line[idx + marker.len()..]
        .trim_end()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim()
        .to_owned()
}

/// Create or append region markers in `file`.
///
/// Creates the file (and parent directories) with a marker pair when it
/// does not exist; appends a marker pair otherwise. Idempotent: a file
/// already carrying markers for `region_path` is left untouched.
pub fn scaffold_region(file: &Path, region_path: &str) -> Result<(), RegionError> {
    let start = region_tag(region_path, file);
    let end = end_region_tag(region_path, file);

    if !file.exists() {
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir).map_err(|e| RegionError::io(dir.display().to_string(), e))?;
        }
        let content = format!("{start}\n\n{end}\n");
        return fs::write(file, content).map_err(|e| RegionError::io(file.display().to_string(), e));
    }

    if file_has_region_markers(file, region_path) {
        return Ok(());
    }

    let mut f = fs::OpenOptions::new()
        .append(true)
        .open(file)
        .map_err(|e| RegionError::io(file.display().to_string(), e))?;
    write!(f, "\n{start}\n\n{end}\n").map_err(|e| RegionError::io(file.display().to_string(), e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
