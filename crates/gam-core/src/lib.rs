//! # gam-core
//!
//! Foundation types for the GAM+Sync coordination engine.
//!
//! This crate provides the shared vocabulary every other crate depends on:
//!
//! - **Branded IDs**: `TurnId`, `ProposalId`, `PlanId`, … as newtypes
//! - **Domain types**: concepts, synchronizations, proposals, turns, plans
//! - **Validation results**: tiered results with mandatory fix fields
//! - **Errors**: the `GamError` hierarchy via `thiserror`
//! - **Configuration**: layered env config via `figment`
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod concept;
pub mod config;
pub mod errors;
pub mod flow;
pub mod ids;
pub mod logging;
pub mod plan;
pub mod proposal;
pub mod quality;
pub mod region;
pub mod sync;
pub mod turn;
pub mod validation;
