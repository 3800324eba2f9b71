//! State of a single flow invocation.
//!
//! `FlowRun` owns the execution context and the per-step trace. Each wave of
//! steps goes through three phases: `prepare` (condition and input
//! resolution against the context), `dispatch` (executor calls, concurrent
//! within a wave) and `settle` (schema check, fallback, context update), the
//! last applied in declaration order.

use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;

use skillflow_types::ValueMap;
use skillflow_types::error::{AbortCause, ExecutorError, ReferenceResolutionError, StepFailure};
use skillflow_types::flow::{StepStatus, StepTrace};
use skillflow_types::manifest::{FallbackKind, SkillManifest};

use super::fallback::{FallbackOutcome, apply_fallback};
use super::schema::validate_output;
use crate::context::ExecutionContext;
use crate::reference::{evaluate_condition, resolve};
use crate::registry::Registry;
use crate::registry::compiled::{CompiledFlow, CompiledStep};

/// What `prepare` decided for one step.
enum Prepared {
    /// Condition evaluated false.
    Skipped,
    /// Inputs resolved; call the executor.
    Ready(ValueMap),
    /// A required input resolved to Missing; go straight to fallback.
    Unresolved(ValueMap, ReferenceResolutionError),
}

pub(crate) struct FlowRun<'a> {
    flow: &'a CompiledFlow,
    manifests: Vec<&'a SkillManifest>,
    registry: &'a Registry,
    ctx: ExecutionContext,
    trace: Vec<Option<StepTrace>>,
}

impl<'a> FlowRun<'a> {
    pub(crate) fn new(
        flow: &'a CompiledFlow,
        manifests: Vec<&'a SkillManifest>,
        registry: &'a Registry,
        request: ValueMap,
    ) -> Self {
        Self {
            flow,
            manifests,
            registry,
            ctx: ExecutionContext::new(request),
            trace: vec![None; flow.steps.len()],
        }
    }

    /// Run every wave. Stops at the first step whose fallback is `fail_flow`.
    pub(crate) async fn drive(&mut self, waves: &[Vec<usize>]) -> Result<(), AbortCause> {
        for wave in waves {
            let prepared: Vec<(usize, Prepared)> =
                wave.iter().map(|&idx| (idx, self.prepare(idx))).collect();

            let registry = self.registry;
            let manifests = &self.manifests;
            let attempts = join_all(prepared.iter().map(|(idx, prep)| async move {
                match prep {
                    Prepared::Ready(inputs) => Some(dispatch(registry, manifests[*idx], inputs).await),
                    _ => None,
                }
            }))
            .await;

            for ((idx, prep), attempt) in prepared.into_iter().zip(attempts) {
                match prep {
                    Prepared::Skipped => self.skip_on_condition(idx),
                    Prepared::Unresolved(inputs, err) => {
                        self.settle(idx, &inputs, Err(err.into()), 0)?;
                    }
                    Prepared::Ready(inputs) => {
                        let Some((result, latency_ms)) = attempt else {
                            continue;
                        };
                        self.settle(idx, &inputs, result.map_err(StepFailure::from), latency_ms)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn prepare(&self, idx: usize) -> Prepared {
        let step = &self.flow.steps[idx];
        if let Some(condition) = &step.condition {
            if !evaluate_condition(condition, &self.ctx) {
                return Prepared::Skipped;
            }
        }
        match resolve_inputs(step, self.manifests[idx], &self.ctx) {
            (inputs, None) => Prepared::Ready(inputs),
            (inputs, Some(err)) => Prepared::Unresolved(inputs, err),
        }
    }

    fn skip_on_condition(&mut self, idx: usize) {
        let step = &self.flow.steps[idx];
        tracing::debug!(
            flow_id = self.flow.flow_id(),
            step_id = %step.id,
            "condition is false, skipping step"
        );
        self.trace[idx] = Some(StepTrace {
            step_id: step.id.clone(),
            skill_id: step.skill_id.clone(),
            status: StepStatus::Skipped,
            latency_ms: 0,
            error: None,
            fallback: None,
        });
    }

    fn settle(
        &mut self,
        idx: usize,
        inputs: &ValueMap,
        result: Result<ValueMap, StepFailure>,
        latency_ms: u64,
    ) -> Result<(), AbortCause> {
        let step = &self.flow.steps[idx];
        let manifest = self.manifests[idx];
        let flow_id = self.flow.flow_id();

        let result = result.and_then(|output| {
            validate_output(manifest, &output)?;
            Ok(output)
        });

        let failure = match result {
            Ok(output) => {
                tracing::debug!(flow_id, step_id = %step.id, latency_ms, "step executed");
                self.ctx.record(&step.id, output);
                self.trace[idx] = Some(trace_entry(step, StepStatus::Executed, latency_ms, None, None));
                return Ok(());
            }
            Err(failure) => failure,
        };

        let strategy = manifest.effective_fallback().kind();
        match apply_fallback(manifest, inputs) {
            FallbackOutcome::Output(output) => {
                tracing::warn!(
                    flow_id,
                    step_id = %step.id,
                    skill_id = %manifest.skill_id,
                    %strategy,
                    error = %failure,
                    "step failed, using fallback output"
                );
                self.ctx.record(&step.id, output);
                self.trace[idx] = Some(trace_entry(
                    step,
                    StepStatus::Fallback,
                    latency_ms,
                    Some(failure.to_string()),
                    Some(strategy),
                ));
                Ok(())
            }
            FallbackOutcome::Skipped => {
                tracing::warn!(flow_id, step_id = %step.id, error = %failure, "step failed, skipping");
                self.trace[idx] = Some(trace_entry(
                    step,
                    StepStatus::Skipped,
                    latency_ms,
                    Some(failure.to_string()),
                    Some(FallbackKind::Skip),
                ));
                Ok(())
            }
            FallbackOutcome::Unusable(reason) => {
                tracing::warn!(
                    flow_id,
                    step_id = %step.id,
                    error = %failure,
                    reason = %reason,
                    "step failed and fallback produced no output"
                );
                self.trace[idx] = Some(trace_entry(
                    step,
                    StepStatus::Failed,
                    latency_ms,
                    Some(format!("{failure}; {reason}")),
                    Some(strategy),
                ));
                Ok(())
            }
            FallbackOutcome::Abort => {
                tracing::error!(flow_id, step_id = %step.id, error = %failure, "step failed, aborting flow");
                self.trace[idx] = Some(trace_entry(
                    step,
                    StepStatus::Failed,
                    latency_ms,
                    Some(failure.to_string()),
                    Some(FallbackKind::FailFlow),
                ));
                Err(AbortCause::Step {
                    step_id: step.id.clone(),
                    failure,
                })
            }
        }
    }

    /// Resolve the declared response. Missing fields use the mapping default,
    /// else `null`.
    pub(crate) fn response(&self) -> ValueMap {
        self.flow
            .response
            .iter()
            .map(|field| {
                let value = field
                    .expr
                    .as_ref()
                    .and_then(|expr| resolve(expr, &self.ctx))
                    .or_else(|| field.default.clone())
                    .unwrap_or(Value::Null);
                (field.field.clone(), value)
            })
            .collect()
    }

    /// Trace entries recorded so far, in declaration order.
    pub(crate) fn trace(&self) -> Vec<StepTrace> {
        self.trace.iter().flatten().cloned().collect()
    }
}

fn trace_entry(
    step: &CompiledStep,
    status: StepStatus,
    latency_ms: u64,
    error: Option<String>,
    fallback: Option<FallbackKind>,
) -> StepTrace {
    StepTrace {
        step_id: step.id.clone(),
        skill_id: step.skill_id.clone(),
        status,
        latency_ms,
        error,
        fallback,
    }
}

/// Resolve a step's bindings against the context.
///
/// Bound values that resolve to Missing fall back to the declared input
/// default; optional inputs without a default are omitted. Declared inputs
/// with a default but no binding are filled in. The first required input
/// left without a value is returned as the error, alongside whatever did
/// resolve (passthrough fallback may still use it).
fn resolve_inputs(
    step: &CompiledStep,
    manifest: &SkillManifest,
    ctx: &ExecutionContext,
) -> (ValueMap, Option<ReferenceResolutionError>) {
    let mut inputs = ValueMap::new();
    let mut missing = None;

    for binding in &step.inputs {
        let declared = manifest.input_field(&binding.field);
        let value = resolve(&binding.expr, ctx)
            .or_else(|| declared.and_then(|f| f.default.clone()));
        match value {
            Some(v) => {
                inputs.insert(binding.field.clone(), v);
            }
            None if declared.is_some_and(|f| f.required) => {
                missing.get_or_insert_with(|| ReferenceResolutionError::MissingRequired {
                    step_id: step.id.clone(),
                    field: binding.field.clone(),
                    path: binding.expr.to_string(),
                });
            }
            None => {}
        }
    }

    for field in &manifest.input_schema {
        if step.input(&field.name).is_some() {
            continue;
        }
        match &field.default {
            Some(default) => {
                inputs.insert(field.name.clone(), default.clone());
            }
            None if field.required => {
                missing.get_or_insert_with(|| ReferenceResolutionError::MissingRequired {
                    step_id: step.id.clone(),
                    field: field.name.clone(),
                    path: "<unbound>".to_string(),
                });
            }
            None => {}
        }
    }

    (inputs, missing)
}

async fn dispatch(
    registry: &Registry,
    manifest: &SkillManifest,
    inputs: &ValueMap,
) -> (Result<ValueMap, ExecutorError>, u64) {
    let start = Instant::now();
    let result = match registry.executor_for(manifest.skill_type) {
        Ok(executor) => executor.execute(manifest, inputs).await,
        Err(_) => Err(ExecutorError::NotRegistered(manifest.skill_type)),
    };
    (result, start.elapsed().as_millis() as u64)
}
