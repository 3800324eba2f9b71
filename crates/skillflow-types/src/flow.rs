//! Flow definition and execution result types.
//!
//! A flow is an ordered pipeline of skill invocations. Step inputs are wired
//! from the request and from earlier step outputs using `${...}` references;
//! the `response` section declares the shape returned to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValueMap;
use crate::manifest::FallbackKind;

// ---------------------------------------------------------------------------
// Flow Definition
// ---------------------------------------------------------------------------

/// Declarative definition of a multi-step pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub flow_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Informational trigger label (e.g. "POST /api/search/assistant").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Steps in declaration order. Declaration order is a valid topological
    /// order of the reference graph.
    #[serde(default)]
    pub steps: Vec<FlowStep>,
    #[serde(default)]
    pub response: Vec<ResponseMapping>,
    /// Opaque presentation hints passed through to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl FlowDefinition {
    pub fn step(&self, id: &str) -> Option<&FlowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}

/// A single step of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Unique within the flow; names the step's entry in the outputs map.
    pub id: String,
    /// `skill_id` of the manifest to invoke.
    pub skill: String,
    /// `<reference> ==|!= <literal-or-reference>`. Absent means always run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub inputs: Vec<StepInput>,
}

/// Binding of one skill input to a reference or a static value.
///
/// Exactly one of `reference` and `value` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub field: String,
    /// `${request.x}`, `${step.output.x}`, a template, or a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// One field of the flow's declared response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMapping {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Used when the reference resolves to Missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

// ---------------------------------------------------------------------------
// Execution Results
// ---------------------------------------------------------------------------

/// Terminal status of one step in an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Executor succeeded and its output passed schema validation.
    Executed,
    /// Condition was falsy, or the `skip` fallback was applied.
    Skipped,
    /// A fallback produced the step's output.
    Fallback,
    /// The step failed and no output was recorded.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Executed => "executed",
            StepStatus::Skipped => "skipped",
            StepStatus::Fallback => "fallback",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Trace entry for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    pub step_id: String,
    pub skill_id: String,
    pub status: StepStatus,
    /// Executor wall-clock time; zero for steps that never dispatched.
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Strategy applied when the step went through fallback handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackKind>,
}

/// Outcome of a successful flow invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Fields in the order the flow declares them.
    pub response: ValueMap,
    /// One entry per step, in declaration order.
    pub steps: Vec<StepTrace>,
    pub total_latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
}

impl FlowResult {
    pub fn trace(&self, step_id: &str) -> Option<&StepTrace> {
        self.steps.iter().find(|t| t.step_id == step_id)
    }
}
