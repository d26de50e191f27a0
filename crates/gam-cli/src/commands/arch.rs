//! `gam arch` — reconcile arch.md with the store.

use anyhow::Result;
use clap::Subcommand;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum ArchCommand {
    /// Bidirectional, additive reconciliation.
    Sync,
    /// Overwrite arch.md from store state (destroys manual descriptions).
    Export,
    /// Insert missing arch.md paths into the store.
    Import,
}

pub fn run(command: ArchCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let reconciler = ctx.reconciler();
    match command {
        ArchCommand::Sync => {
            let report = reconciler.sync()?;
            for path in &report.added_to_store {
                println!("  store <- arch.md: added {path}");
            }
            for path in &report.added_to_manifest {
                println!("  arch.md <- store: added {path}");
            }
            println!(
                "Sync complete: {} added to store, {} added to arch.md",
                report.added_to_store.len(),
                report.added_to_manifest.len()
            );
            Ok(())
        }
        ArchCommand::Export => {
            let count = reconciler.export()?;
            println!("arch.md exported from store ({count} region(s)).");
            Ok(())
        }
        ArchCommand::Import => {
            let count = reconciler.import()?;
            println!("Imported {count} region(s) from arch.md.");
            Ok(())
        }
    }
}
