//! `gam turn` — lifecycle, memory, and structural diff.

use anyhow::{bail, Result};
use clap::Subcommand;

use gam_core::ids::TurnId;
use gam_engine::{EndOptions, EngineError};
use gam_store::repositories::{PlanRepository, TurnRepository};

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum TurnCommand {
    /// Start a turn: snapshot the tree, compile context, enqueue the task.
    Start {
        /// Target region path.
        #[arg(long)]
        region: String,
        /// Task description for relevance-based memory search.
        #[arg(long)]
        prompt: Option<String>,
    },
    /// End the active turn: validate (blocks on failure), diff, persist.
    End {
        /// What you did and what's next.
        #[arg(long)]
        scratchpad: String,
        /// Bypass the validation gate (not recommended).
        #[arg(long)]
        skip_validation: bool,
        /// End a specific turn instead of the latest active one.
        #[arg(long)]
        turn: Option<String>,
    },
    /// Show active turns.
    Status,
    /// Scratchpads from turns that touched a region.
    Memory { region: String },
    /// Similarity search across all scratchpads.
    Search { text: String },
    /// Structural diff for a turn.
    Diff { turn_id: String },
}

pub fn run(command: TurnCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    match command {
        TurnCommand::Start { region, prompt } => {
            let started = ctx.turn_engine().start(&region, prompt.as_deref())?;
            println!("Turn started: {}", started.turn_id);
            println!("Region: {region}");
            println!("Context: {}", started.context_ref.display());
            Ok(())
        }

        TurnCommand::End {
            scratchpad,
            skip_validation,
            turn,
        } => {
            let options = EndOptions {
                turn_id: turn.map(TurnId::from),
                skip_validation,
            };
            match ctx.turn_engine().end(&scratchpad, &options) {
                Ok(turn_id) => {
                    println!("Turn ended: {turn_id}");
                    println!("Scratchpad saved.");
                    Ok(())
                }
                Err(EngineError::GateFailed { issues }) => {
                    println!("VALIDATION FAILED:");
                    for issue in &issues {
                        println!("  {issue}");
                    }
                    println!("\nTurn end blocked. Fix the issues above and retry.");
                    println!("Use --skip-validation to bypass (not recommended).");
                    bail!("validation failed: {} issue(s)", issues.len());
                }
                Err(other) => Err(other.into()),
            }
        }

        TurnCommand::Status => {
            let conn = ctx.store.conn()?;
            let turns = TurnRepository::active(&conn)?;
            println!("Active Turns:");
            if turns.is_empty() {
                println!("  (none)");
            }
            for turn in turns {
                let plan = PlanRepository::plan_for_turn(&conn, &turn.id)?
                    .map(|p| format!("  plan={p}"))
                    .unwrap_or_default();
                println!(
                    "  {}  scope={}  type={}  role={}  started={}{plan}",
                    turn.id,
                    turn.scope_path,
                    turn.task_kind.as_str(),
                    turn.agent_role.as_str(),
                    turn.created_at.to_rfc3339(),
                );
            }
            Ok(())
        }

        TurnCommand::Memory { region } => {
            let conn = ctx.store.conn()?;
            println!("Turn memory for {region}:\n");
            for entry in TurnRepository::region_scoped_memory(&conn, &region, 10)? {
                let when = entry
                    .completed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "(active)".to_owned());
                println!("[{}] ({when})\n{}\n", entry.turn_id, entry.scratchpad);
            }
            Ok(())
        }

        TurnCommand::Search { text } => {
            let conn = ctx.store.conn()?;
            println!("Search results for \"{text}\":\n");
            for entry in TurnRepository::similar_scratchpads(&conn, &text, 0.0, 10)? {
                println!(
                    "[{}] scope={} (similarity={:.2})\n{}\n",
                    entry.turn_id,
                    entry.scope_path,
                    entry.similarity.unwrap_or_default(),
                    entry.scratchpad
                );
            }
            Ok(())
        }

        TurnCommand::Diff { turn_id } => {
            let conn = ctx.store.conn()?;
            println!("Structural diff for {turn_id}:\n");
            for (path, action) in TurnRepository::turn_regions(&conn, &TurnId::from(turn_id))? {
                let prefix = match action {
                    gam_core::turn::TurnRegionAction::Created => "+",
                    gam_core::turn::TurnRegionAction::Deleted => "-",
                    gam_core::turn::TurnRegionAction::Modified => "~",
                };
                println!("  {prefix} {path}");
            }
            Ok(())
        }
    }
}
