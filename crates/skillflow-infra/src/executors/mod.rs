//! Concrete skill executors.
//!
//! One executor per [`SkillType`]. Each reads a typed view of the manifest's
//! opaque `config` map, serves canned data when mock mode is on and the skill
//! allows it, and reports every failure as an [`ExecutorError`].

pub mod function;
pub mod genie_query;
pub mod llm_call;
pub mod prompt_registry;
pub mod sql_query;
pub mod web_search;

use serde::de::DeserializeOwned;
use serde_json::Value;

use skillflow_core::ExecutorTable;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::SkillManifest;

use crate::workspace::WorkspaceClient;

pub use function::{FunctionExecutor, FunctionRegistry};
pub use genie_query::GenieQueryExecutor;
pub use llm_call::LlmCallExecutor;
pub use prompt_registry::PromptRegistryExecutor;
pub use sql_query::SqlQueryExecutor;
pub use web_search::WebSearchExecutor;

/// Build the dispatch table with every built-in executor.
pub fn build_executor_table(settings: &ExecutorSettings) -> Result<ExecutorTable, ExecutorError> {
    let workspace = WorkspaceClient::from_settings(settings)?;
    let table = ExecutorTable::new()
        .with(FunctionExecutor::new(FunctionRegistry::with_builtins()))
        .with(LlmCallExecutor::new(settings, workspace.clone()))
        .with(GenieQueryExecutor::new(settings, workspace.clone()))
        .with(WebSearchExecutor::new(settings)?)
        .with(SqlQueryExecutor::new(settings))
        .with(PromptRegistryExecutor::new(settings, workspace));

    tracing::info!(
        types = ?table.types(),
        mock_mode = settings.mock_mode,
        "executors registered"
    );
    Ok(table)
}

/// Deserialize the manifest's `config` map into an executor's config type.
pub(crate) fn parse_config<T: DeserializeOwned>(skill: &SkillManifest) -> Result<T, ExecutorError> {
    serde_json::from_value(Value::Object(skill.config.clone())).map_err(|e| {
        ExecutorError::Config(format!("invalid config for skill '{}': {e}", skill.skill_id))
    })
}

/// True when canned data should be served instead of calling the backend.
pub(crate) fn use_mock(mock_mode: bool, skill: &SkillManifest) -> bool {
    mock_mode && skill.mock_enabled
}

/// A required string input.
pub(crate) fn input_str<'a>(inputs: &'a ValueMap, name: &str) -> Result<&'a str, ExecutorError> {
    match inputs.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ExecutorError::Rejected(format!(
            "input '{name}' must be a string, got {other}"
        ))),
        None => Err(ExecutorError::Rejected(format!("missing input '{name}'"))),
    }
}

/// Convert a `serde_json::Value` produced by a backend into an output map.
pub(crate) fn into_output(value: Value) -> ValueMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ValueMap::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}
