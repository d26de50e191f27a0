//! `gam run`, `gam memorizer run`, and `gam queue` — the agent loops and
//! queue inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use gam_engine::{ProcessorConfig, ProposalProcessor};
use gam_store::repositories::ProposalRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum MemorizerCommand {
    /// Consume the proposal queue until interrupted.
    Run,
}

pub fn run_memorizer(command: MemorizerCommand) -> Result<()> {
    match command {
        MemorizerCommand::Run => {
            let ctx = AppContext::load()?;
            println!("Memorizer running. Consuming proposals...");
            consume(&ctx)
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Automated loop until interrupted.
    #[arg(long)]
    pub auto: bool,
    /// Run a gardener sweep first.
    #[arg(long)]
    pub gardener: bool,
}

impl RunArgs {
    pub fn run(&self) -> Result<()> {
        let ctx = AppContext::load()?;

        if self.gardener {
            println!("Running gardener sweep...");
            let findings = ctx.gardener().sweep(false)?;
            println!("Gardener found {} issue(s)", findings.len());
        }

        if self.auto {
            println!("Running automated memorizer loop. (Ctrl+C to stop)");
            return consume(&ctx);
        }

        println!("Sequential mode: run 'gam memorizer run' in one shell and your researcher in another.");
        println!("Or use 'gam run --auto' for the automated loop.");
        Ok(())
    }
}

fn consume(ctx: &AppContext) -> Result<()> {
    let config = ProcessorConfig {
        run_integration: ctx.config.run_integration,
        run_runtime: ctx.config.run_runtime,
        audit_high_risk: ctx.config.audit_high_risk,
        ..ProcessorConfig::default()
    };
    let processor = ProposalProcessor::new(
        ctx.store.clone(),
        ctx.queue.clone(),
        ctx.config.project_root.clone(),
        config,
        "memorizer_1",
    );

    // Ctrl+C flips the token; blocking queue reads unwind and locks
    // release on the way out.
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    processor.run(&cancel)?;
    Ok(())
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Pending message counts for both streams.
    Status,
    /// Proposals escalated to human review.
    Escalated,
}

pub fn run_queue(command: QueueCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    match command {
        QueueCommand::Status => {
            let status = ctx.queue.status()?;
            println!("agent_tasks: {} pending", status.tasks);
            println!("agent_proposals: {} pending", status.proposals);
            Ok(())
        }
        QueueCommand::Escalated => {
            let conn = ctx.store.conn()?;
            let escalated =
                ProposalRepository::escalated(&conn, gam_engine::processor::MAX_REVIEW_ITERATIONS)?;
            if escalated.is_empty() {
                println!("No escalated proposals.");
            }
            for proposal in escalated {
                println!("{}  region={}", proposal.id, proposal.region_path);
                if let Some(briefing) = &proposal.rejection_reason {
                    println!("{briefing}\n");
                }
            }
            Ok(())
        }
    }
}
