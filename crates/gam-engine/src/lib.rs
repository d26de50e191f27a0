//! # gam-engine
//!
//! The coordination engine: turn lifecycle, context compilation, proposal
//! processing, plan scheduling, the gardener sweep, the architecture
//! reconciler, and the docs projection.
//!
//! Mutation discipline (enforced by construction, not convention):
//! [`processor::ProposalProcessor`] alone mutates concept specs, sync
//! definitions, and sync-refs; [`turn::TurnEngine`] alone mutates turn
//! status and tree snapshots; [`planner::PlanScheduler`] alone mutates
//! plan and plan-turn status; [`reconciler::ArchReconciler`] may mutate
//! the manifest file and insert (never delete) region rows.

#![deny(unsafe_code)]

pub mod context;
pub mod docs;
pub mod errors;
pub mod gardener;
pub mod planner;
pub mod processor;
pub mod reconciler;
pub mod turn;

pub use context::ContextCompiler;
pub use docs::DocsExporter;
pub use errors::EngineError;
pub use gardener::Gardener;
pub use planner::PlanScheduler;
pub use processor::{Outcome, ProcessorConfig, ProposalProcessor};
pub use reconciler::ArchReconciler;
pub use turn::{EndOptions, StartedTurn, TurnEngine};
