//! gam — coordinate LLM coding agents on a shared codebase.
//!
//! # Usage
//!
//! ```text
//! gam init
//! gam turn start --region <path> [--prompt <text>]
//! gam turn end --scratchpad <text> [--skip-validation]
//! gam turn status|memory <region>|search <text>|diff <turn-id>
//! gam region touch <path> --file <file> | list | show <path>
//! gam concept add --file <spec.json> | show <name> | list | assign <name> <region>
//! gam sync add --file <sync.json> | list | show <name> | check <name>
//! gam validate [--all]
//! gam plan create --name <n> --goal <g> --file <turns.json> | show | list | decide | close
//! gam flow trace <token> | list
//! gam docs export|import|status
//! gam quality grades <region> | principles [add]
//! gam gardener run [--dry]
//! gam arch sync|export|import
//! gam memorizer run
//! gam run [--auto] [--gardener]
//! gam queue status|escalated
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    arch::ArchCommand, concept::ConceptCommand, docs::DocsCommand, flow::FlowCommand,
    plan::PlanCommand, quality::QualityCommand, region::RegionCommand, run::RunArgs,
    sync::SyncCommand, turn::TurnCommand, validate::ValidateArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "gam",
    version,
    about = "Coordinate LLM coding agents with concepts, regions, and synchronizations",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the store, queue, and architecture manifest.
    Init,

    /// Turn lifecycle: start, end, status, memory, search, diff.
    Turn {
        #[command(subcommand)]
        command: TurnCommand,
    },

    /// Region scaffolding and inspection.
    Region {
        #[command(subcommand)]
        command: RegionCommand,
    },

    /// Concept definitions and region assignments.
    Concept {
        #[command(subcommand)]
        command: ConceptCommand,
    },

    /// Synchronization rules.
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },

    /// Check manifest/source alignment (the turn-end gate, standalone).
    Validate(ValidateArgs),

    /// Execution plans.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Flow-log provenance queries.
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },

    /// Markdown projection of the store.
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },

    /// Quality grades and golden principles.
    Quality {
        #[command(subcommand)]
        command: QualityCommand,
    },

    /// Entropy sweep.
    Gardener {
        #[command(subcommand)]
        command: commands::quality::GardenerCommand,
    },

    /// Architecture manifest reconciliation.
    Arch {
        #[command(subcommand)]
        command: ArchCommand,
    },

    /// Run the memorizer proposal consumer.
    Memorizer {
        #[command(subcommand)]
        command: commands::run::MemorizerCommand,
    },

    /// Run the coordination loop.
    Run(RunArgs),

    /// Queue status and escalated proposals.
    Queue {
        #[command(subcommand)]
        command: commands::run::QueueCommand,
    },
}

fn main() -> Result<()> {
    gam_core::logging::init_subscriber("warn");

    let cli = Cli::parse();
    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Turn { command } => commands::turn::run(command),
        Commands::Region { command } => commands::region::run(command),
        Commands::Concept { command } => commands::concept::run(command),
        Commands::Sync { command } => commands::sync::run(command),
        Commands::Validate(args) => args.run(),
        Commands::Plan { command } => commands::plan::run(command),
        Commands::Flow { command } => commands::flow::run(command),
        Commands::Docs { command } => commands::docs::run(command),
        Commands::Quality { command } => commands::quality::run(command),
        Commands::Gardener { command } => commands::quality::run_gardener(command),
        Commands::Arch { command } => commands::arch::run(command),
        Commands::Memorizer { command } => commands::run::run_memorizer(command),
        Commands::Run(args) => args.run(),
        Commands::Queue { command } => commands::run::run_queue(command),
    }
}
