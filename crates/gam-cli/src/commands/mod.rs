//! Command groups for the `gam` binary.

pub mod arch;
pub mod concept;
pub mod docs;
pub mod flow;
pub mod init;
pub mod plan;
pub mod quality;
pub mod region;
pub mod run;
pub mod sync;
pub mod turn;
pub mod validate;

use anyhow::{Context, Result};

use gam_core::config::GamConfig;
use gam_engine::{
    ArchReconciler, ContextCompiler, DocsExporter, Gardener, PlanScheduler, TurnEngine,
};
use gam_store::queue::Queue;
use gam_store::Store;

/// Resolved configuration plus open store and queue handles, shared by
/// every command.
pub struct AppContext {
    pub config: GamConfig,
    pub store: Store,
    pub queue: Queue,
}

impl AppContext {
    /// Load configuration and open both substrates.
    pub fn load() -> Result<Self> {
        let config = GamConfig::load().context("resolve configuration")?;
        let store = Store::open(&config.store_path)
            .with_context(|| format!("open store at {}", config.store_path.display()))?;
        let queue = Queue::open(&config.queue_path)
            .with_context(|| format!("open queue at {}", config.queue_path.display()))?;
        Ok(Self {
            config,
            store,
            queue,
        })
    }

    pub fn turn_engine(&self) -> TurnEngine {
        let compiler =
            ContextCompiler::new(self.store.clone(), self.config.context_dir.clone());
        TurnEngine::new(
            self.store.clone(),
            self.queue.clone(),
            self.config.project_root.clone(),
            compiler,
        )
    }

    pub fn scheduler(&self) -> PlanScheduler {
        PlanScheduler::new(self.store.clone(), self.queue.clone())
    }

    pub fn gardener(&self) -> Gardener {
        Gardener::new(
            self.store.clone(),
            self.queue.clone(),
            self.config.project_root.clone(),
        )
    }

    pub fn reconciler(&self) -> ArchReconciler {
        ArchReconciler::new(self.store.clone(), self.config.project_root.clone())
    }

    pub fn docs(&self) -> DocsExporter {
        DocsExporter::new(self.store.clone(), self.config.project_root.clone())
    }
}
