//! Load-time validation of manifests and flows.
//!
//! Manifest rules: non-empty `skill_id`, field names unique within each
//! schema. Unsupported `type` and `fallback.strategy` values are rejected
//! while parsing. Flow rules: non-empty `flow_id`, unique step ids, every
//! step names a known skill, every binding is a reference or a value, and
//! every expression parses and only addresses `request` or earlier steps.

use std::collections::{BTreeMap, HashMap, HashSet};

use skillflow_types::error::{ManifestValidationError, ReferenceResolutionError};
use skillflow_types::flow::FlowDefinition;
use skillflow_types::manifest::SkillManifest;

use super::compiled::{CompiledFlow, CompiledInput, CompiledResponseField, CompiledStep};
use crate::engine::plan::build_waves;
use crate::reference::{Expr, Reference, parse_condition, parse_expression};

pub fn validate_manifest(
    manifest: &SkillManifest,
    source_name: &str,
) -> Result<(), ManifestValidationError> {
    if manifest.skill_id.trim().is_empty() {
        return Err(ManifestValidationError::EmptySkillId {
            source_name: source_name.to_string(),
        });
    }

    let schemas = [
        ("input", manifest.input_schema.iter().map(|f| f.name.as_str()).collect::<Vec<_>>()),
        ("output", manifest.output_schema.iter().map(|f| f.name.as_str()).collect()),
    ];
    for (schema, names) in schemas {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(ManifestValidationError::DuplicateField {
                    skill_id: manifest.skill_id.clone(),
                    schema: schema.to_string(),
                    field: name.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Validate a flow against the loaded skills and compile its expressions.
pub fn compile_flow(
    flow: &FlowDefinition,
    skills: &BTreeMap<String, SkillManifest>,
    source_name: &str,
) -> Result<CompiledFlow, ManifestValidationError> {
    let flow_id = flow.flow_id.as_str();
    if flow_id.trim().is_empty() {
        return Err(ManifestValidationError::EmptyFlowId {
            source_name: source_name.to_string(),
        });
    }

    let declared: HashSet<&str> = flow.steps.iter().map(|s| s.id.as_str()).collect();
    let mut earlier: HashMap<&str, usize> = HashMap::new();
    let mut steps = Vec::with_capacity(flow.steps.len());

    for (index, step) in flow.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(ManifestValidationError::EmptyStepId {
                flow_id: flow_id.to_string(),
            });
        }
        if earlier.contains_key(step.id.as_str()) {
            return Err(ManifestValidationError::DuplicateStepId {
                flow_id: flow_id.to_string(),
                step_id: step.id.clone(),
            });
        }
        if !skills.contains_key(&step.skill) {
            return Err(ManifestValidationError::UnknownSkill {
                flow_id: flow_id.to_string(),
                step_id: step.id.clone(),
                skill: step.skill.clone(),
            });
        }

        let mut depends_on = Vec::new();
        let mut bound = HashSet::new();
        let mut inputs = Vec::with_capacity(step.inputs.len());
        for input in &step.inputs {
            let invalid = |reason: &str| ManifestValidationError::InvalidBinding {
                flow_id: flow_id.to_string(),
                step_id: step.id.clone(),
                field: input.field.clone(),
                reason: reason.to_string(),
            };
            if !bound.insert(input.field.as_str()) {
                return Err(invalid("bound more than once"));
            }
            let expr = match (&input.reference, &input.value) {
                (Some(reference), None) => {
                    let location = format!("step '{}' input '{}'", step.id, input.field);
                    let expr = parse_expression(reference)
                        .map_err(|source| reference_error(flow_id, &location, source))?;
                    check_order(&expr.references(), &earlier, &declared)
                        .map_err(|source| reference_error(flow_id, &location, source))?;
                    expr
                }
                (None, Some(value)) => Expr::Literal(value.clone()),
                (Some(_), Some(_)) => return Err(invalid("both 'reference' and 'value' are set")),
                (None, None) => return Err(invalid("one of 'reference' or 'value' is required")),
            };
            collect_dependencies(&expr.references(), &earlier, &mut depends_on);
            inputs.push(CompiledInput {
                field: input.field.clone(),
                expr,
            });
        }

        let condition = match &step.condition {
            Some(text) => {
                let location = format!("step '{}' condition", step.id);
                let condition = parse_condition(text)
                    .map_err(|source| reference_error(flow_id, &location, source))?;
                check_order(&condition.references(), &earlier, &declared)
                    .map_err(|source| reference_error(flow_id, &location, source))?;
                collect_dependencies(&condition.references(), &earlier, &mut depends_on);
                Some(condition)
            }
            None => None,
        };

        depends_on.sort_unstable();
        depends_on.dedup();
        steps.push(CompiledStep {
            id: step.id.clone(),
            skill_id: step.skill.clone(),
            condition,
            inputs,
            depends_on,
        });
        earlier.insert(step.id.as_str(), index);
    }

    let mut response = Vec::with_capacity(flow.response.len());
    for mapping in &flow.response {
        let expr = match &mapping.reference {
            Some(reference) => {
                let location = format!("response field '{}'", mapping.field);
                let expr = parse_expression(reference)
                    .map_err(|source| reference_error(flow_id, &location, source))?;
                check_order(&expr.references(), &earlier, &declared)
                    .map_err(|source| reference_error(flow_id, &location, source))?;
                Some(expr)
            }
            None => None,
        };
        response.push(CompiledResponseField {
            field: mapping.field.clone(),
            expr,
            default: mapping.default.clone(),
        });
    }

    let waves = build_waves(&steps);
    Ok(CompiledFlow {
        definition: flow.clone(),
        steps,
        response,
        waves,
    })
}

/// Every referenced step must already be declared before the current
/// position. `declared` distinguishes forward references from unknown ids.
fn check_order(
    refs: &[&Reference],
    earlier: &HashMap<&str, usize>,
    declared: &HashSet<&str>,
) -> Result<(), ReferenceResolutionError> {
    for reference in refs {
        let Some(step_id) = reference.step_id() else {
            continue;
        };
        if earlier.contains_key(step_id) {
            continue;
        }
        return Err(if declared.contains(step_id) {
            ReferenceResolutionError::ForwardReference {
                step_id: step_id.to_string(),
            }
        } else {
            ReferenceResolutionError::UnknownStep {
                step_id: step_id.to_string(),
            }
        });
    }
    Ok(())
}

fn collect_dependencies(refs: &[&Reference], earlier: &HashMap<&str, usize>, out: &mut Vec<usize>) {
    out.extend(
        refs.iter()
            .filter_map(|r| r.step_id())
            .filter_map(|id| earlier.get(id).copied()),
    );
}

fn reference_error(
    flow_id: &str,
    location: &str,
    source: ReferenceResolutionError,
) -> ManifestValidationError {
    ManifestValidationError::Reference {
        flow_id: flow_id.to_string(),
        location: location.to_string(),
        source,
    }
}
