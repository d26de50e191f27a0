//! `gam flow` — provenance queries over the flow log.

use anyhow::Result;
use clap::Subcommand;

use gam_store::repositories::FlowRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum FlowCommand {
    /// Show the causal chain for one flow token.
    Trace { token: String },
    /// List recent flow entries.
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

pub fn run(command: FlowCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let conn = ctx.store.conn()?;
    match command {
        FlowCommand::Trace { token } => {
            println!("Flow {token}:");
            for entry in FlowRepository::trace(&conn, &token)? {
                let via = entry
                    .sync_name
                    .as_deref()
                    .map(|s| format!("  via sync {s}"))
                    .unwrap_or_default();
                let parent = entry
                    .parent_id
                    .as_ref()
                    .map(|p| format!("  parent={p}"))
                    .unwrap_or_default();
                println!(
                    "  {} {}/{}{via}{parent}",
                    entry.created_at.to_rfc3339(),
                    entry.concept_name,
                    entry.action_name
                );
            }
            Ok(())
        }
        FlowCommand::List { limit } => {
            for entry in FlowRepository::list_recent(&conn, limit)? {
                println!(
                    "{}  {}  {}/{}",
                    entry.created_at.to_rfc3339(),
                    entry.flow_token,
                    entry.concept_name,
                    entry.action_name
                );
            }
            Ok(())
        }
    }
}
