//! `gam region` — scaffolding and inspection.

use anyhow::{bail, Result};
use clap::Subcommand;

use gam_region::{build_tree, format_tree, parse_gamignore, scaffold_region, scan_directory};
use gam_store::repositories::RegionRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum RegionCommand {
    /// Scaffold region markers into a file and register the region.
    Touch {
        /// Region path, e.g. app.search.sources.
        path: String,
        /// File to scaffold markers into.
        #[arg(long)]
        file: String,
    },
    /// List registered regions with lifecycle states.
    List,
    /// Show one region: store row plus marker locations.
    Show { path: String },
    /// Render the scanned region tree.
    Tree,
}

pub fn run(command: RegionCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    match command {
        RegionCommand::Touch { path, file } => {
            if !gam_core::region::is_valid_namespace(&path) {
                bail!("'{path}' is not a valid dotted namespace");
            }
            let target = ctx.config.project_root.join(&file);
            scaffold_region(&target, &path)?;
            let conn = ctx.store.conn()?;
            let inserted = RegionRepository::insert_if_absent(&conn, &path)?;
            println!(
                "Markers for {path} in {file}{}",
                if inserted { " (region registered)" } else { "" }
            );
            println!("Remember to declare {path} in arch.md.");
            Ok(())
        }

        RegionCommand::List => {
            let conn = ctx.store.conn()?;
            for region in RegionRepository::list(&conn)? {
                println!(
                    "{}  [{}]{}",
                    region.path,
                    region.lifecycle_state,
                    region
                        .description
                        .as_deref()
                        .map(|d| format!("  {d}"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }

        RegionCommand::Show { path } => {
            let conn = ctx.store.conn()?;
            let Some(region) = RegionRepository::get_by_path(&conn, &path)? else {
                bail!("region not found: {path}");
            };
            println!("Path: {}", region.path);
            println!("State: {}", region.lifecycle_state);
            if let Some(description) = &region.description {
                println!("Description: {description}");
            }

            let ignore = parse_gamignore(&ctx.config.project_root);
            let outcome = scan_directory(&ctx.config.project_root, &ignore)?;
            for marker in outcome.markers.iter().filter(|m| m.path == path) {
                println!(
                    "  {}:{}-{}",
                    marker.file.display(),
                    marker.start_line,
                    marker.end_line
                );
            }
            Ok(())
        }

        RegionCommand::Tree => {
            let ignore = parse_gamignore(&ctx.config.project_root);
            let outcome = scan_directory(&ctx.config.project_root, &ignore)?;
            print!("{}", format_tree(&build_tree(&outcome.markers)));
            for warning in &outcome.warnings {
                println!("warning: {warning}");
            }
            Ok(())
        }
    }
}
