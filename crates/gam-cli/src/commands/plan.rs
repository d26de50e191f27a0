//! `gam plan` — execution plans.
//!
//! `create` takes a JSON array of plan-turn requests:
//! `[{ "region_path": "app.a" }, { "region_path": "app.b", "depends_on": [0] }]`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use gam_core::ids::PlanId;
use gam_core::plan::{Decision, PlanTurnRequest};
use gam_store::repositories::PlanRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// Create a plan from a JSON turn list and enqueue the ready turns.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        goal: String,
        /// JSON file with the ordered plan-turn requests.
        #[arg(long)]
        file: String,
    },
    /// Show a plan with per-turn progress.
    Show { plan_id: String },
    /// List plans.
    List,
    /// Record a design decision on an active plan.
    Decide {
        plan_id: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        rationale: String,
    },
    /// Abandon a plan.
    Close { plan_id: String },
}

pub fn run(command: PlanCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    match command {
        PlanCommand::Create { name, goal, file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("read {file}"))?;
            let requests: Vec<PlanTurnRequest> =
                serde_json::from_str(&text).with_context(|| format!("parse {file}"))?;
            let plan = ctx.scheduler().create_plan(&name, &goal, &requests)?;
            println!("Plan created: {} ({} turn(s))", plan.id, requests.len());
            Ok(())
        }

        PlanCommand::Show { plan_id } => {
            let conn = ctx.store.conn()?;
            let id = PlanId::from(plan_id);
            let Some(plan) = PlanRepository::get(&conn, &id)? else {
                bail!("plan not found: {id}");
            };
            println!("# {} [{}]", plan.name, plan.status.as_str());
            println!("Goal: {}", plan.goal);
            for turn in PlanRepository::plan_turns(&conn, &id)? {
                println!(
                    "  {}. {}  {}  [{}]",
                    turn.ordering,
                    turn.turn_id,
                    turn.region_path,
                    turn.status.as_str()
                );
            }
            for decision in &plan.decisions {
                println!("  decision: {} — {}", decision.description, decision.rationale);
            }
            Ok(())
        }

        PlanCommand::List => {
            let conn = ctx.store.conn()?;
            for plan in PlanRepository::list(&conn)? {
                println!("{}  {}  [{}]", plan.id, plan.name, plan.status.as_str());
            }
            Ok(())
        }

        PlanCommand::Decide {
            plan_id,
            description,
            rationale,
        } => {
            ctx.scheduler().record_decision(
                &PlanId::from(plan_id),
                &Decision {
                    description,
                    rationale,
                    alternatives: Vec::new(),
                    turn_id: None,
                    decided_at: chrono::Utc::now(),
                },
            )?;
            println!("Decision recorded.");
            Ok(())
        }

        PlanCommand::Close { plan_id } => {
            let id = PlanId::from(plan_id);
            {
                let conn = ctx.store.conn()?;
                if PlanRepository::get(&conn, &id)?.is_none() {
                    bail!("plan not found: {id}");
                }
            }
            ctx.scheduler().abandon(&id)?;
            println!("Plan {id} abandoned.");
            Ok(())
        }
    }
}
