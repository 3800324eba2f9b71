//! Fallback strategies applied when a step cannot produce its own output.

use serde_json::Value;

use skillflow_types::ValueMap;
use skillflow_types::manifest::{FallbackStrategy, SkillManifest};

/// Result of applying a skill's fallback strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome {
    /// Record this map as the step output.
    Output(ValueMap),
    /// No output; the step is traced as skipped.
    Skipped,
    /// The strategy could not produce an output (e.g. the passthrough field
    /// has no value). The step is traced as failed and the flow continues.
    Unusable(String),
    /// Abort the invocation.
    Abort,
}

pub fn apply_fallback(manifest: &SkillManifest, inputs: &ValueMap) -> FallbackOutcome {
    match manifest.effective_fallback() {
        FallbackStrategy::Passthrough { passthrough_field } => {
            match inputs.get(&passthrough_field) {
                Some(value) if !value.is_null() => {
                    FallbackOutcome::Output(single(manifest.primary_output_field(), value.clone()))
                }
                _ => FallbackOutcome::Unusable(format!(
                    "passthrough field '{passthrough_field}' has no value"
                )),
            }
        }
        FallbackStrategy::DefaultValue { default_value } => match default_value {
            Value::Object(map) => FallbackOutcome::Output(map),
            other => FallbackOutcome::Output(single(manifest.primary_output_field(), other)),
        },
        FallbackStrategy::Skip => FallbackOutcome::Skipped,
        FallbackStrategy::FailFlow => FallbackOutcome::Abort,
    }
}

fn single(field: &str, value: Value) -> ValueMap {
    let mut map = ValueMap::new();
    map.insert(field.to_string(), value);
    map
}
