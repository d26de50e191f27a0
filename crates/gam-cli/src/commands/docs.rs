//! `gam docs` — markdown projection of the store.

use anyhow::Result;
use clap::Subcommand;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum DocsCommand {
    /// Regenerate the docs/ tree from store state.
    Export,
    /// Import docs/ back into the store (not implemented).
    Import,
    /// Show exported file counts per section.
    Status,
}

pub fn run(command: DocsCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let docs = ctx.docs();
    match command {
        DocsCommand::Export => {
            docs.export_all()?;
            println!("docs/ exported.");
            Ok(())
        }
        DocsCommand::Import => {
            docs.import_docs()?;
            Ok(())
        }
        DocsCommand::Status => {
            for (section, count) in docs.status()? {
                println!("{section}: {count} file(s)");
            }
            Ok(())
        }
    }
}
