//! `gam concept` — definitions and region assignments.
//!
//! `add` takes a JSON document:
//! `{ "name": ..., "purpose": ..., "spec": {...}, "state_machine": {...}, "invariants": [...] }`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::Value;

use gam_core::concept::{AssignmentRole, ConceptSpec, Invariant, StateMachine};
use gam_store::repositories::ConceptRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum ConceptCommand {
    /// Add or update a concept from a JSON definition file.
    Add {
        #[arg(long)]
        file: String,
    },
    /// Show one concept.
    Show { name: String },
    /// List concepts.
    List,
    /// Assign a concept to a region.
    Assign {
        name: String,
        region: String,
        /// implementation | integration | test | consumer
        #[arg(long, default_value = "implementation")]
        role: String,
    },
}

pub fn run(command: ConceptCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let conn = ctx.store.conn()?;
    match command {
        ConceptCommand::Add { file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("read {file}"))?;
            let doc: Value = serde_json::from_str(&text).with_context(|| format!("parse {file}"))?;

            let name = doc
                .get("name")
                .and_then(Value::as_str)
                .context("definition needs a 'name'")?;
            let purpose = doc.get("purpose").and_then(Value::as_str).unwrap_or_default();
            let spec: ConceptSpec = match doc.get("spec") {
                Some(v) => serde_json::from_value(v.clone()).context("parse 'spec'")?,
                None => ConceptSpec::default(),
            };
            let state_machine: StateMachine = match doc.get("state_machine") {
                Some(v) => serde_json::from_value(v.clone()).context("parse 'state_machine'")?,
                None => StateMachine::default(),
            };
            let invariants: Vec<Invariant> = match doc.get("invariants") {
                Some(v) => serde_json::from_value(v.clone()).context("parse 'invariants'")?,
                None => Vec::new(),
            };

            let concept =
                ConceptRepository::upsert(&conn, name, purpose, &spec, &state_machine, &invariants)?;
            println!("Concept {} saved ({} action(s))", concept.name, concept.spec.actions.len());
            Ok(())
        }

        ConceptCommand::Show { name } => {
            let Some(concept) = ConceptRepository::get_by_name(&conn, &name)? else {
                bail!("concept not found: {name}");
            };
            println!("# {}", concept.name);
            println!("Purpose: {}", concept.purpose);
            println!("Spec:\n{}", serde_json::to_string_pretty(&concept.spec)?);
            if !concept.state_machine.transitions.is_empty() {
                println!("Transitions:");
                for t in &concept.state_machine.transitions {
                    println!("  {} -> {} via {}", t.from, t.to, t.action);
                }
            }
            for invariant in &concept.invariants {
                println!("Invariant {} ({})", invariant.name, invariant.kind.as_str());
            }
            Ok(())
        }

        ConceptCommand::List => {
            for concept in ConceptRepository::list(&conn)? {
                println!("{}: {}", concept.name, concept.purpose);
            }
            Ok(())
        }

        ConceptCommand::Assign { name, region, role } => {
            let role = AssignmentRole::parse(&role);
            ConceptRepository::assign(&conn, &name, &region, role)?;
            println!("Assigned {name} to {region} as {}", role.as_str());
            Ok(())
        }
    }
}
