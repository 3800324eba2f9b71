//! Flows with every expression parsed and every reference checked.
//!
//! The registry compiles each `FlowDefinition` once at load time. The engine
//! only ever sees `CompiledFlow`, so it never re-parses expression text.

use serde_json::Value;

use skillflow_types::flow::FlowDefinition;

use crate::reference::{Condition, Expr};

#[derive(Debug, Clone)]
pub struct CompiledFlow {
    pub definition: FlowDefinition,
    pub steps: Vec<CompiledStep>,
    pub response: Vec<CompiledResponseField>,
    /// Step indices grouped by reference depth. Every step in a wave only
    /// references steps in earlier waves.
    pub waves: Vec<Vec<usize>>,
}

impl CompiledFlow {
    pub fn flow_id(&self) -> &str {
        &self.definition.flow_id
    }
}

#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub id: String,
    pub skill_id: String,
    pub condition: Option<Condition>,
    pub inputs: Vec<CompiledInput>,
    /// Indices of the earlier steps this step references directly.
    pub depends_on: Vec<usize>,
}

impl CompiledStep {
    pub fn input(&self, field: &str) -> Option<&CompiledInput> {
        self.inputs.iter().find(|i| i.field == field)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledInput {
    pub field: String,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
pub struct CompiledResponseField {
    pub field: String,
    pub expr: Option<Expr>,
    pub default: Option<Value>,
}
