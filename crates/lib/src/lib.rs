//! strata-lib: build orchestration engine for strata.
//!
//! This crate provides the core of the build orchestrator:
//! - `unit`: build units, their actions, and the registry they live in
//! - `graph`: dependency resolution, cycle detection, and execution levels
//! - `cache`: content signatures, artifact stores, and cascading invalidation
//! - `execute`: the level-by-level concurrent scheduler
//! - `strategy`: sequential / parallel / incremental selection
//! - `history`: persisted build history used as a scheduling hint
//! - `orchestrator`: the composition root that produces a `BuildReport`

pub mod cache;
pub mod consts;
pub mod execute;
pub mod graph;
pub mod history;
pub mod orchestrator;
pub mod strategy;
pub mod unit;
pub mod util;

pub use graph::{ExecutionPlan, GraphError, resolve};
pub use orchestrator::{BuildReport, OrchestrateError, Orchestrator};
pub use strategy::{Strategy, StrategyRequest};
pub use unit::{Action, BuildUnit, UnitId, UnitManifest, UnitRegistry};
