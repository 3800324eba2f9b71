//! Shared domain types for SkillFlow.
//!
//! This crate contains the declarative model the engine interprets: skill
//! manifests, flow definitions, execution results, configuration and the
//! error taxonomy shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, thiserror.

pub mod config;
pub mod error;
pub mod flow;
pub mod manifest;

/// Insertion-ordered JSON object used for requests, step inputs and outputs.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;
