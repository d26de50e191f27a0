//! Layered configuration: compiled defaults under `GAM_*` environment
//! variables, resolved with `figment`.

use std::path::PathBuf;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::GamError;

/// Resolved configuration for one process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GamConfig {
    /// SQLite file backing the relational store.
    pub store_path: PathBuf,
    /// SQLite file backing the durable queue (a separate substrate).
    pub queue_path: PathBuf,
    /// Root of the project tree being coordinated.
    pub project_root: PathBuf,
    /// Directory for compiled context bundles (one file per region).
    pub context_dir: PathBuf,
    /// Run Tier 2 integration checks in the proposal pipeline.
    pub run_integration: bool,
    /// Run Tier 4 runtime probes in the proposal pipeline.
    pub run_runtime: bool,
    /// Audit high-risk proposals through the Tier 3 loop.
    pub audit_high_risk: bool,
}

impl Default for GamConfig {
    fn default() -> Self {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            store_path: project_root.join(".gam").join("store.db"),
            queue_path: project_root.join(".gam").join("queue.db"),
            project_root,
            context_dir: std::env::temp_dir(),
            run_integration: false,
            run_runtime: false,
            audit_high_risk: true,
        }
    }
}

impl GamConfig {
    /// Load configuration: defaults merged under `GAM_*` env vars
    /// (`GAM_STORE_PATH`, `GAM_QUEUE_PATH`, `GAM_PROJECT_ROOT`, ...).
    pub fn load() -> Result<Self, GamError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("GAM_"))
            .extract()
            .map_err(|e| GamError::Config(e.to_string()))
    }

    /// In-memory variant for tests: both databases private to the process.
    #[must_use]
    pub fn for_tests(project_root: PathBuf) -> Self {
        Self {
            store_path: PathBuf::from(":memory:"),
            queue_path: PathBuf::from(":memory:"),
            context_dir: project_root.clone(),
            project_root,
            run_integration: false,
            run_runtime: false,
            audit_high_risk: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_nest_under_project_root() {
        let cfg = GamConfig::default();
        assert!(cfg.store_path.ends_with(".gam/store.db"));
        assert!(cfg.queue_path.ends_with(".gam/queue.db"));
        assert!(!cfg.run_integration);
        assert!(cfg.audit_high_risk);
    }

    #[test]
    fn load_applies_defaults() {
        // No GAM_* vars set in the test environment for these keys.
        let cfg = GamConfig::load().expect("config loads");
        assert!(cfg.store_path.to_string_lossy().ends_with("store.db"));
    }
}
