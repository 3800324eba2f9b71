//! Orchestration core for SkillFlow.
//!
//! This crate defines the reference language, the registry of skills and
//! flows, the executor contract that backends implement, and the flow engine
//! that interprets flows. It depends only on `skillflow-types` -- never on
//! `skillflow-infra` or any network/database crate.

pub mod context;
pub mod engine;
pub mod executor;
pub mod reference;
pub mod registry;

pub use context::ExecutionContext;
pub use engine::FlowEngine;
pub use executor::{BoxSkillExecutor, ExecutorTable, SkillExecutor};
pub use registry::{Registry, RegistryError, RegistryIndex};
