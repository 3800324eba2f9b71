//! Per-invocation execution context.
//!
//! `ExecutionContext` holds the immutable request map and the outputs of
//! steps that produced one, keyed by step id in the order they were recorded.
//! It is owned by a single invocation and never shared.

use indexmap::IndexMap;
use serde::Serialize;

use skillflow_types::ValueMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    request: ValueMap,
    outputs: IndexMap<String, ValueMap>,
}

impl ExecutionContext {
    pub fn new(request: ValueMap) -> Self {
        Self {
            request,
            outputs: IndexMap::new(),
        }
    }

    pub fn request(&self) -> &ValueMap {
        &self.request
    }

    /// Output of a step, or `None` if the step was skipped, failed without a
    /// usable fallback, or has not run yet.
    pub fn output(&self, step_id: &str) -> Option<&ValueMap> {
        self.outputs.get(step_id)
    }

    pub fn has_output(&self, step_id: &str) -> bool {
        self.outputs.contains_key(step_id)
    }

    /// Record a step's output. Each step writes at most once per invocation;
    /// a second write for the same id is ignored.
    pub fn record(&mut self, step_id: &str, output: ValueMap) {
        if self.outputs.contains_key(step_id) {
            tracing::warn!(step_id, "step output already recorded, ignoring overwrite");
            return;
        }
        self.outputs.insert(step_id.to_string(), output);
    }

    /// Step ids with outputs, in the order they were recorded.
    pub fn output_ids(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}
