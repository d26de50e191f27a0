//! `gam sync` — synchronization rules.
//!
//! `add` takes a JSON document with `name`, `when_clause`, optional
//! `where_clause`, `then_clause`, `description`, `enabled`. Adding the
//! same body twice is an upsert on name.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use gam_core::ids::SyncId;
use gam_core::sync::{Synchronization, ThenAction, WhenPattern, WherePattern};
use gam_store::repositories::SyncRepository;

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    /// Add or update a sync from a JSON definition file.
    Add {
        #[arg(long)]
        file: String,
    },
    /// List syncs.
    List {
        /// Only enabled syncs.
        #[arg(long)]
        enabled: bool,
    },
    /// Show one sync with its clauses.
    Show { name: String },
    /// Check which concepts and actions a sync references.
    Check { name: String },
}

pub fn run(command: SyncCommand) -> Result<()> {
    let ctx = AppContext::load()?;
    let conn = ctx.store.conn()?;
    match command {
        SyncCommand::Add { file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("read {file}"))?;
            let doc: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("parse {file}"))?;

            let name = doc
                .get("name")
                .and_then(serde_json::Value::as_str)
                .context("definition needs a 'name'")?;
            let when_clause: Vec<WhenPattern> = serde_json::from_value(
                doc.get("when_clause").cloned().context("definition needs a 'when_clause'")?,
            )
            .context("parse 'when_clause'")?;
            let where_clause: Vec<WherePattern> = match doc.get("where_clause") {
                Some(v) => serde_json::from_value(v.clone()).context("parse 'where_clause'")?,
                None => Vec::new(),
            };
            let then_clause: Vec<ThenAction> = serde_json::from_value(
                doc.get("then_clause").cloned().context("definition needs a 'then_clause'")?,
            )
            .context("parse 'then_clause'")?;

            let sync = Synchronization {
                id: SyncId::new(),
                name: name.to_owned(),
                when_clause,
                where_clause,
                then_clause,
                description: doc
                    .get("description")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                enabled: doc
                    .get("enabled")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(true),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            let stored = SyncRepository::upsert(&conn, &sync)?;
            println!("Sync {} saved ({} ref(s) indexed)", stored.name, stored.extract_refs().len());
            Ok(())
        }

        SyncCommand::List { enabled } => {
            for sync in SyncRepository::list(&conn, enabled)? {
                let status = if sync.enabled { "enabled" } else { "disabled" };
                println!("{} ({status}): {}", sync.name, sync.description);
            }
            Ok(())
        }

        SyncCommand::Show { name } => {
            let Some(sync) = SyncRepository::get_by_name(&conn, &name)? else {
                bail!("sync not found: {name}");
            };
            println!("# sync {}", sync.name);
            println!("when:  {}", serde_json::to_string(&sync.when_clause)?);
            if !sync.where_clause.is_empty() {
                println!("where: {}", serde_json::to_string(&sync.where_clause)?);
            }
            println!("then:  {}", serde_json::to_string(&sync.then_clause)?);
            Ok(())
        }

        SyncCommand::Check { name } => {
            let Some(sync) = SyncRepository::get_by_name(&conn, &name)? else {
                bail!("sync not found: {name}");
            };
            println!("References of {}:", sync.name);
            for r in SyncRepository::refs_for_sync(&conn, &sync.id)? {
                match (&r.action_name, &r.state_field) {
                    (Some(action), _) => {
                        println!("  [{}] {}/{}", r.clause_kind.as_str(), r.concept_name, action);
                    }
                    (_, Some(field)) => {
                        println!("  [{}] {}.{}", r.clause_kind.as_str(), r.concept_name, field);
                    }
                    _ => {}
                }
            }
            Ok(())
        }
    }
}
