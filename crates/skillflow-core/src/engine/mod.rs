//! Flow engine: walks a flow's steps, dispatches executors, applies fallback
//! and assembles the declared response.
//!
//! - `run` -- per-invocation state (context, trace, prepare/dispatch/settle)
//! - `plan` -- wave computation over step references
//! - `fallback` -- fallback strategy application
//! - `schema` -- output validation against `output_schema`
//!
//! The engine takes a registry snapshot at the start of each invocation, so a
//! concurrent reload never changes the flow being executed. No lock is held
//! while executors run.

pub mod fallback;
pub mod plan;
pub(crate) mod run;
pub mod schema;

use std::sync::Arc;
use std::time::{Duration, Instant};

use skillflow_types::ValueMap;
use skillflow_types::config::{EngineConfig, ExecutionMode};
use skillflow_types::error::{AbortCause, FlowAbortError, FlowError, NotFoundError};
use skillflow_types::flow::FlowResult;
use skillflow_types::manifest::SkillManifest;

use crate::registry::Registry;
use run::FlowRun;

pub struct FlowEngine {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl FlowEngine {
    pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `flow_id` against `request`.
    ///
    /// Returns a best-effort [`FlowResult`] unless the flow is unknown, a
    /// step with the `fail_flow` strategy fails, or the flow timeout elapses.
    pub async fn execute_flow(&self, flow_id: &str, request: ValueMap) -> Result<FlowResult, FlowError> {
        let index = self.registry.snapshot();
        let flow = index.lookup_flow(flow_id)?;
        let manifests = flow
            .steps
            .iter()
            .map(|step| index.lookup_skill(&step.skill_id))
            .collect::<Result<Vec<&SkillManifest>, NotFoundError>>()?;

        let waves = match self.config.execution_mode {
            ExecutionMode::Sequential => plan::sequential_waves(flow.steps.len()),
            ExecutionMode::Waves => flow.waves.clone(),
        };

        tracing::info!(
            flow_id,
            steps = flow.steps.len(),
            mode = ?self.config.execution_mode,
            "flow started"
        );
        let start = Instant::now();
        let mut run = FlowRun::new(flow, manifests, &self.registry, request);

        let outcome = match self.config.flow_timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), run.drive(&waves)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AbortCause::Timeout {
                        after_ms: timeout_ms(secs),
                    }),
                }
            }
            None => run.drive(&waves).await,
        };

        let trace = run.trace();
        if let Err(cause) = outcome {
            tracing::error!(flow_id, error = %cause, "flow aborted");
            return Err(FlowAbortError {
                flow_id: flow_id.to_string(),
                cause,
                trace,
            }
            .into());
        }

        let total_latency_ms = match self.config.execution_mode {
            ExecutionMode::Sequential => trace.iter().map(|t| t.latency_ms).sum(),
            ExecutionMode::Waves => start.elapsed().as_millis() as u64,
        };
        let response = run.response();
        tracing::info!(flow_id, total_latency_ms, "flow completed");

        Ok(FlowResult {
            flow_id: flow_id.to_string(),
            response,
            steps: trace,
            total_latency_ms,
            display: flow.definition.display.clone(),
        })
    }

    /// Execute the registry's `default_flow`.
    pub async fn execute_default(&self, request: ValueMap) -> Result<FlowResult, FlowError> {
        let flow_id = self
            .registry
            .snapshot()
            .descriptor()
            .default_flow
            .clone()
            .ok_or_else(|| NotFoundError::Flow("<default>".to_string()))?;
        self.execute_flow(&flow_id, request).await
    }
}

fn timeout_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use skillflow_types::error::{ExecutorError, StepFailure};
    use skillflow_types::flow::{FlowDefinition, StepStatus};
    use skillflow_types::manifest::{FallbackKind, SkillType};

    use crate::executor::{ExecutorTable, SkillExecutor};
    use crate::registry::RegistryIndex;

    // -----------------------------------------------------------------------
    // Fake executor: per-skill scripted responses plus a call log
    // -----------------------------------------------------------------------

    type Script = Arc<Mutex<std::collections::HashMap<String, VecDeque<Result<Value, ExecutorError>>>>>;

    #[derive(Clone, Default)]
    struct Scripted {
        skill_type: Option<SkillType>,
        script: Script,
        calls: Arc<Mutex<Vec<(String, ValueMap)>>>,
        count: Arc<AtomicUsize>,
        delay_ms: u64,
    }

    impl Scripted {
        fn for_type(skill_type: SkillType) -> Self {
            Self {
                skill_type: Some(skill_type),
                ..Default::default()
            }
        }

        fn respond(&self, skill_id: &str, response: Result<Value, ExecutorError>) {
            self.script
                .lock()
                .unwrap()
                .entry(skill_id.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls_for(&self, skill_id: &str) -> Vec<ValueMap> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == skill_id)
                .map(|(_, inputs)| inputs.clone())
                .collect()
        }
    }

    impl SkillExecutor for Scripted {
        fn skill_type(&self) -> SkillType {
            self.skill_type.unwrap_or(SkillType::Function)
        }

        async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((skill.skill_id.clone(), inputs.clone()));
            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(&skill.skill_id)
                .and_then(|q| q.pop_front());
            match next {
                Some(Ok(Value::Object(map))) => Ok(map),
                Some(Ok(other)) => Err(ExecutorError::MalformedResponse(other.to_string())),
                Some(Err(e)) => Err(e),
                None => Err(ExecutorError::Backend(format!("no scripted response for {}", skill.skill_id))),
            }
        }
    }

    fn manifest(v: Value) -> SkillManifest {
        serde_json::from_value(v).unwrap()
    }

    fn skills() -> Vec<SkillManifest> {
        vec![
            manifest(json!({
                "skill_id": "query_rewrite", "name": "Rewrite", "type": "llm_call",
                "input_schema": [{"name": "user_query"}],
                "output_schema": [{"name": "rewritten_query"}, {"name": "location_hint"}],
                "fallback": {"strategy": "passthrough", "passthrough_field": "user_query"}
            })),
            manifest(json!({
                "skill_id": "genie_search", "name": "Genie", "type": "genie_query",
                "input_schema": [{"name": "question"}],
                "output_schema": [
                    {"name": "answer_text"},
                    {"name": "items", "type": "list"},
                    {"name": "genie_status", "required": true}
                ],
                "fallback": {"strategy": "default_value",
                             "default_value": {"answer_text": null, "items": [], "genie_status": "error"}}
            })),
            manifest(json!({
                "skill_id": "web_search", "name": "Web", "type": "web_search",
                "input_schema": [{"name": "query"}, {"name": "max_results", "type": "integer", "required": false, "default": 5}],
                "output_schema": [{"name": "snippets", "type": "list"}, {"name": "search_status"}],
                "fallback": {"strategy": "skip"}
            })),
            manifest(json!({
                "skill_id": "strict_lookup", "name": "Strict", "type": "function",
                "input_schema": [{"name": "key"}],
                "output_schema": [{"name": "value"}]
            })),
        ]
    }

    fn search_flow() -> FlowDefinition {
        serde_json::from_value(json!({
            "flow_id": "search_assistant",
            "name": "Search Assistant",
            "steps": [
                {"id": "rewrite", "skill": "query_rewrite",
                 "inputs": [{"field": "user_query", "reference": "${request.message}"}]},
                {"id": "genie", "skill": "genie_search",
                 "inputs": [{"field": "question", "reference": "${rewrite.output.rewritten_query}"}]},
                {"id": "web_fallback", "skill": "web_search",
                 "condition": "${genie.output.genie_status} != \"ok\"",
                 "inputs": [{"field": "query", "reference": "${rewrite.output.rewritten_query}"}]}
            ],
            "response": [
                {"field": "rewritten_query", "reference": "${rewrite.output.rewritten_query}"},
                {"field": "answer", "reference": "${genie.output.answer_text}"},
                {"field": "web_results", "reference": "${web_fallback.output.snippets}", "default": []},
                {"field": "status", "reference": "${genie.output.genie_status}"}
            ],
            "display": {"type": "inline"}
        }))
        .unwrap()
    }

    struct Harness {
        engine: FlowEngine,
        llm: Scripted,
        genie: Scripted,
        web: Scripted,
        func: Scripted,
    }

    fn harness_with(flows: Vec<FlowDefinition>, config: EngineConfig) -> Harness {
        let llm = Scripted::for_type(SkillType::LlmCall);
        let genie = Scripted::for_type(SkillType::GenieQuery);
        let web = Scripted::for_type(SkillType::WebSearch);
        let func = Scripted::for_type(SkillType::Function);
        let table = ExecutorTable::new()
            .with(llm.clone())
            .with(genie.clone())
            .with(web.clone())
            .with(func.clone());
        let index = RegistryIndex::from_definitions(skills(), flows).unwrap();
        let registry = Arc::new(Registry::new(index, table));
        Harness {
            engine: FlowEngine::new(registry, config),
            llm,
            genie,
            web,
            func,
        }
    }

    fn harness() -> Harness {
        harness_with(vec![search_flow()], EngineConfig::default())
    }

    fn request(message: &str) -> ValueMap {
        json!({"message": message}).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_genie_ok_skips_web_fallback() {
        let h = harness();
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "hotels miami", "location_hint": "Miami"})));
        h.genie.respond("genie_search", Ok(json!({"answer_text": "3 hotels", "items": [1, 2, 3], "genie_status": "ok"})));

        let result = h.engine.execute_flow("search_assistant", request("hotels in Miami")).await.unwrap();

        assert_eq!(result.trace("web_fallback").unwrap().status, StepStatus::Skipped);
        assert!(h.web.calls_for("web_search").is_empty());
        assert_eq!(result.response["answer"], json!("3 hotels"));
        assert_eq!(result.response["web_results"], json!([]));
        assert_eq!(result.response["status"], json!("ok"));
        assert_eq!(result.display, Some(json!({"type": "inline"})));
        let statuses: Vec<StepStatus> = result.steps.iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![StepStatus::Executed, StepStatus::Executed, StepStatus::Skipped]);
    }

    #[tokio::test]
    async fn test_genie_error_runs_web_fallback() {
        let h = harness();
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "hotels miami"})));
        h.genie.respond("genie_search", Ok(json!({"answer_text": null, "items": [], "genie_status": "error"})));
        h.web.respond("web_search", Ok(json!({"snippets": ["Casa Miami"], "search_status": "ok"})));

        let result = h.engine.execute_flow("search_assistant", request("hotels in Miami")).await.unwrap();

        assert_eq!(result.trace("web_fallback").unwrap().status, StepStatus::Executed);
        assert_eq!(result.response["web_results"], json!(["Casa Miami"]));
        assert_eq!(result.response["answer"], Value::Null);
        let web_calls = h.web.calls_for("web_search");
        assert_eq!(web_calls.len(), 1);
        assert_eq!(web_calls[0]["query"], json!("hotels miami"));
        // Optional input with a declared default is filled in
        assert_eq!(web_calls[0]["max_results"], json!(5));
    }

    #[tokio::test]
    async fn test_passthrough_fallback_uses_user_query() {
        let h = harness();
        h.llm.respond("query_rewrite", Err(ExecutorError::Backend("503".to_string())));
        h.genie.respond("genie_search", Ok(json!({"items": [], "genie_status": "ok"})));

        let result = h.engine.execute_flow("search_assistant", request("hotels in Miami")).await.unwrap();

        let rewrite = result.trace("rewrite").unwrap();
        assert_eq!(rewrite.status, StepStatus::Fallback);
        assert_eq!(rewrite.fallback, Some(FallbackKind::Passthrough));
        assert_eq!(result.response["rewritten_query"], json!("hotels in Miami"));
        assert_eq!(h.genie.calls_for("genie_search")[0]["question"], json!("hotels in Miami"));
    }

    #[tokio::test]
    async fn test_schema_violation_goes_to_default_value() {
        let h = harness();
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q"})));
        // Missing required genie_status
        h.genie.respond("genie_search", Ok(json!({"answer_text": "x"})));
        h.web.respond("web_search", Ok(json!({"snippets": [], "search_status": "no_results"})));

        let result = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();

        let genie = result.trace("genie").unwrap();
        assert_eq!(genie.status, StepStatus::Fallback);
        assert!(genie.error.as_deref().unwrap().contains("genie_status"));
        assert_eq!(result.response["status"], json!("error"));
        assert_eq!(result.trace("web_fallback").unwrap().status, StepStatus::Executed);
    }

    #[tokio::test]
    async fn test_skip_fallback_leaves_no_output() {
        let h = harness();
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q"})));
        h.genie.respond("genie_search", Ok(json!({"genie_status": "no_answer", "items": []})));
        h.web.respond("web_search", Err(ExecutorError::Timeout(10)));

        let result = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();

        let web = result.trace("web_fallback").unwrap();
        assert_eq!(web.status, StepStatus::Skipped);
        assert_eq!(web.fallback, Some(FallbackKind::Skip));
        assert_eq!(result.response["web_results"], json!([]));
    }

    #[tokio::test]
    async fn test_required_missing_input_never_reaches_executor() {
        let flow: FlowDefinition = serde_json::from_value(json!({
            "flow_id": "lookup",
            "name": "Lookup",
            "steps": [
                {"id": "rewrite", "skill": "query_rewrite",
                 "inputs": [{"field": "user_query", "reference": "${request.absent}"}]}
            ],
            "response": [{"field": "q", "reference": "${rewrite.output.rewritten_query}"}]
        }))
        .unwrap();
        let h = harness_with(vec![flow], EngineConfig::default());

        let result = h.engine.execute_flow("lookup", request("ignored")).await.unwrap();

        assert_eq!(h.llm.count.load(Ordering::SeqCst), 0);
        let trace = result.trace("rewrite").unwrap();
        // Passthrough field is itself missing, so no output is recorded
        assert_eq!(trace.status, StepStatus::Failed);
        assert!(trace.error.as_deref().unwrap().contains("user_query"));
        assert_eq!(result.response["q"], Value::Null);
    }

    #[tokio::test]
    async fn test_fail_flow_aborts_with_trace() {
        let flow: FlowDefinition = serde_json::from_value(json!({
            "flow_id": "strict",
            "name": "Strict",
            "steps": [
                {"id": "rewrite", "skill": "query_rewrite",
                 "inputs": [{"field": "user_query", "reference": "${request.message}"}]},
                {"id": "lookup", "skill": "strict_lookup",
                 "inputs": [{"field": "key", "reference": "${rewrite.output.rewritten_query}"}]},
                {"id": "after", "skill": "query_rewrite",
                 "inputs": [{"field": "user_query", "value": "never"}]}
            ]
        }))
        .unwrap();
        let h = harness_with(vec![flow], EngineConfig::default());
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "k"})));
        h.func.respond("strict_lookup", Err(ExecutorError::Rejected("denied".to_string())));

        let err = h.engine.execute_flow("strict", request("m")).await.unwrap_err();

        let FlowError::Aborted(abort) = err else {
            panic!("expected abort, got {err:?}");
        };
        assert_eq!(abort.flow_id, "strict");
        assert_eq!(
            abort.cause,
            AbortCause::Step {
                step_id: "lookup".to_string(),
                failure: StepFailure::Executor(ExecutorError::Rejected("denied".to_string())),
            }
        );
        assert_eq!(abort.trace.len(), 2);
        assert_eq!(abort.trace[1].status, StepStatus::Failed);
        assert_eq!(h.llm.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_flow_is_not_found() {
        let h = harness();
        let err = h.engine.execute_flow("nope", ValueMap::new()).await.unwrap_err();
        assert_eq!(err, FlowError::NotFound(NotFoundError::Flow("nope".to_string())));
    }

    #[tokio::test]
    async fn test_same_request_yields_identical_response() {
        let h = harness();
        for _ in 0..2 {
            h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q", "location_hint": "Miami"})));
            h.genie.respond("genie_search", Ok(json!({"answer_text": "a", "items": [{"id": 1}], "genie_status": "ok"})));
        }
        let first = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();
        let second = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first.response).unwrap(),
            serde_json::to_vec(&second.response).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_executor_goes_to_fallback() {
        let index = RegistryIndex::from_definitions(skills(), vec![search_flow()]).unwrap();
        let genie = Scripted::for_type(SkillType::GenieQuery);
        genie.respond("genie_search", Ok(json!({"genie_status": "ok", "items": []})));
        let registry = Arc::new(Registry::new(index, ExecutorTable::new().with(genie)));
        let engine = FlowEngine::new(registry, EngineConfig::default());

        let result = engine.execute_flow("search_assistant", request("hotels")).await.unwrap();

        let rewrite = result.trace("rewrite").unwrap();
        assert_eq!(rewrite.status, StepStatus::Fallback);
        assert!(rewrite.error.as_deref().unwrap().contains("llm_call"));
        assert_eq!(result.response["rewritten_query"], json!("hotels"));
    }

    #[tokio::test]
    async fn test_waves_mode_matches_sequential_response() {
        let config = EngineConfig {
            execution_mode: ExecutionMode::Waves,
            ..Default::default()
        };
        let h = harness_with(vec![search_flow()], config);
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q"})));
        h.genie.respond("genie_search", Ok(json!({"genie_status": "error", "items": []})));
        h.web.respond("web_search", Ok(json!({"snippets": ["s"], "search_status": "ok"})));

        let result = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();

        let ids: Vec<&str> = result.steps.iter().map(|t| t.step_id.as_str()).collect();
        assert_eq!(ids, vec!["rewrite", "genie", "web_fallback"]);
        assert_eq!(result.response["web_results"], json!(["s"]));
    }

    #[tokio::test]
    async fn test_waves_mode_runs_independent_steps_concurrently() {
        let flow: FlowDefinition = serde_json::from_value(json!({
            "flow_id": "fan_out",
            "name": "Fan Out",
            "steps": [
                {"id": "rewrite", "skill": "query_rewrite",
                 "inputs": [{"field": "user_query", "reference": "${request.message}"}]},
                {"id": "web", "skill": "web_search",
                 "inputs": [{"field": "query", "reference": "${request.message}"}]}
            ],
            "response": [
                {"field": "query", "reference": "${rewrite.output.rewritten_query}"},
                {"field": "snippets", "reference": "${web.output.snippets}"}
            ]
        }))
        .unwrap();

        // Shared call log records completion order across both executors
        let mut llm = Scripted::for_type(SkillType::LlmCall);
        llm.delay_ms = 400;
        let mut web = Scripted::for_type(SkillType::WebSearch);
        web.delay_ms = 300;
        web.calls = Arc::clone(&llm.calls);
        llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q"})));
        web.respond("web_search", Ok(json!({"snippets": ["s"], "search_status": "ok"})));

        let index = RegistryIndex::from_definitions(skills(), vec![flow]).unwrap();
        let table = ExecutorTable::new().with(llm.clone()).with(web.clone());
        let config = EngineConfig {
            execution_mode: ExecutionMode::Waves,
            ..Default::default()
        };
        let engine = FlowEngine::new(Arc::new(Registry::new(index, table)), config);

        let result = engine.execute_flow("fan_out", request("cabins")).await.unwrap();

        let finished: Vec<String> = llm.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(finished, vec!["web_search", "query_rewrite"]);

        let ids: Vec<&str> = result.steps.iter().map(|t| t.step_id.as_str()).collect();
        assert_eq!(ids, vec!["rewrite", "web"]);
        assert!(result.steps.iter().all(|t| t.status == StepStatus::Executed));

        assert!(result.total_latency_ms >= 400, "{}", result.total_latency_ms);
        assert!(result.total_latency_ms < 700, "{}", result.total_latency_ms);
        assert_eq!(result.response["query"], json!("q"));
        assert_eq!(result.response["snippets"], json!(["s"]));
    }

    #[tokio::test]
    async fn test_huge_flow_timeout_does_not_overflow() {
        let config = EngineConfig {
            flow_timeout_secs: Some(u64::MAX),
            ..Default::default()
        };
        let h = harness_with(vec![search_flow()], config);
        h.llm.respond("query_rewrite", Ok(json!({"rewritten_query": "q"})));
        h.genie.respond("genie_search", Ok(json!({"genie_status": "ok", "items": []})));

        let result = h.engine.execute_flow("search_assistant", request("q")).await.unwrap();
        assert_eq!(result.response["status"], json!("ok"));
        assert_eq!(timeout_ms(u64::MAX), u64::MAX);
        assert_eq!(timeout_ms(30), 30_000);
    }

    #[tokio::test]
    async fn test_flow_timeout_aborts_without_fallback() {
        let flow: FlowDefinition = serde_json::from_value(json!({
            "flow_id": "slow",
            "name": "Slow",
            "steps": [{"id": "web", "skill": "web_search",
                       "inputs": [{"field": "query", "value": "q"}]}]
        }))
        .unwrap();
        let mut web = Scripted::for_type(SkillType::WebSearch);
        web.delay_ms = 2_000;
        let index = RegistryIndex::from_definitions(skills(), vec![flow]).unwrap();
        let registry = Arc::new(Registry::new(index, ExecutorTable::new().with(web)));
        let config = EngineConfig {
            flow_timeout_secs: Some(1),
            ..Default::default()
        };
        let engine = FlowEngine::new(registry, config);

        let err = engine.execute_flow("slow", ValueMap::new()).await.unwrap_err();

        let FlowError::Aborted(abort) = err else {
            panic!("expected abort, got {err:?}");
        };
        assert_eq!(abort.cause, AbortCause::Timeout { after_ms: 1000 });
        assert!(abort.trace.is_empty());
    }
}
