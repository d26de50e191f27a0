//! `gam quality` and `gam gardener` — grades, principles, and the sweep.

use anyhow::{Context, Result};
use clap::Subcommand;

use gam_core::quality::GoldenPrinciple;
use gam_store::repositories::QualityRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum QualityCommand {
    /// Show grades for one region.
    Grades { region: String },
    /// Record a grade for a region.
    Grade {
        region: String,
        category: String,
        grade: String,
        #[arg(long, default_value = "human")]
        assessed_by: String,
    },
    /// List golden principles, or add one from a JSON file.
    Principles {
        /// JSON file with `{name, rule, remediation, lint_check?, enabled?}`.
        #[arg(long)]
        add: Option<String>,
    },
}

pub fn run(command: QualityCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let conn = ctx.store.conn()?;
    match command {
        QualityCommand::Grades { region } => {
            for grade in QualityRepository::grades_for_region(&conn, &region)? {
                println!(
                    "{}: {}  (assessed {} by {})",
                    grade.category,
                    grade.grade,
                    grade.assessed_at.to_rfc3339(),
                    grade.assessed_by
                );
            }
            Ok(())
        }

        QualityCommand::Grade {
            region,
            category,
            grade,
            assessed_by,
        } => {
            QualityRepository::upsert_grade(
                &conn,
                &region,
                &category,
                &grade,
                &serde_json::Value::Null,
                &assessed_by,
            )?;
            println!("Graded {region} {category}: {grade}");
            Ok(())
        }

        QualityCommand::Principles { add } => {
            if let Some(file) = add {
                let text =
                    std::fs::read_to_string(&file).with_context(|| format!("read {file}"))?;
                let principle: GoldenPrinciple =
                    serde_json::from_str(&text).with_context(|| format!("parse {file}"))?;
                QualityRepository::upsert_principle(&conn, &principle)?;
                println!("Principle {} saved.", principle.name);
            } else {
                for principle in QualityRepository::list_principles(&conn, false)? {
                    let status = if principle.enabled { "enabled" } else { "disabled" };
                    println!("{} ({status}): {}", principle.name, principle.rule);
                }
            }
            Ok(())
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum GardenerCommand {
    /// Run the entropy sweep.
    Run {
        /// Report findings without enqueueing or persisting anything.
        #[arg(long)]
        dry: bool,
    },
}

pub fn run_gardener(command: GardenerCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    match command {
        GardenerCommand::Run { dry } => {
            let findings = ctx.gardener().sweep(dry)?;
            println!("Gardener found {} issue(s){}", findings.len(), if dry { " (dry run)" } else { "" });
            for finding in &findings {
                let kind = if finding.mechanical { "mechanical" } else { "judgment" };
                println!("  [{}] ({kind}) {}", finding.category.as_str(), finding.description);
            }
            Ok(())
        }
    }
}
