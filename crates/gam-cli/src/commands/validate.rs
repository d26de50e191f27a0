//! `gam validate` — the manifest/source alignment checks, standalone.

use anyhow::{bail, Result};
use clap::Args;

use gam_region::{
    find_unregioned, parse_arch_paths, parse_gamignore, scan_directory, validate_arch_hierarchy,
};

use super::AppContext;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also report unregioned files and manifest entries without source.
    #[arg(long)]
    pub all: bool,
}

impl ValidateArgs {
    pub fn run(&self) -> Result<()> {
        let ctx = AppContext::load()?;
        let root = &ctx.config.project_root;
        let ignore = parse_gamignore(root);

        let mut issues = validate_arch_hierarchy(root)?;

        let outcome = scan_directory(root, &ignore)?;
        issues.extend(outcome.warnings.clone());

        let declared: std::collections::HashSet<String> =
            parse_arch_paths(root)?.into_iter().collect();
        let mut in_source: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for marker in &outcome.markers {
            let _ = in_source.insert(&marker.path);
            if !declared.contains(&marker.path) {
                issues.push(format!(
                    "region {} found in source ({}:{}) but not in arch.md — add it to arch.md",
                    marker.path,
                    marker.file.display(),
                    marker.start_line
                ));
            }
        }

        if self.all {
            for path in &declared {
                if !in_source.contains(path.as_str()) {
                    issues.push(format!(
                        "arch.md declares {path} but no source region markers found — add \
                         @region:{path} markers or remove it from arch.md"
                    ));
                }
            }
            for file in find_unregioned(root, &ignore)? {
                issues.push(format!("unregioned file: {}", file.display()));
            }
        }

        if issues.is_empty() {
            println!("Validation passed.");
            return Ok(());
        }
        for issue in &issues {
            println!("{issue}");
        }
        bail!("validation failed: {} issue(s)", issues.len());
    }
}
