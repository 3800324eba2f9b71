//! Application state wiring the registry, executors and engine together.
//!
//! AppState holds the concrete instances used by both CLI commands and REST
//! API handlers.

use std::sync::Arc;

use anyhow::Context;

use skillflow_core::{FlowEngine, Registry};
use skillflow_infra::executors::build_executor_table;
use skillflow_types::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FlowEngine>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build the executor table, load the registry from
    /// `config.registry.root` and wire the engine.
    pub fn init(config: AppConfig) -> anyhow::Result<Self> {
        let executors =
            build_executor_table(&config.executors).context("failed to build executor table")?;

        let root = config.registry.root.clone();
        let registry = Registry::open(&root, executors)
            .with_context(|| format!("failed to load registry from '{}'", root.display()))?;

        let index = registry.snapshot();
        tracing::info!(
            root = %root.display(),
            skills = index.skill_count(),
            flows = index.flow_count(),
            mock_mode = config.executors.mock_mode,
            "registry loaded"
        );

        Ok(Self::new(config, Arc::new(registry)))
    }

    pub fn new(config: AppConfig, registry: Arc<Registry>) -> Self {
        let engine = FlowEngine::new(registry, config.engine.clone());
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.engine.registry()
    }
}


#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use skillflow_types::config::ExecutionMode;
    use skillflow_types::flow::StepStatus;

    use super::*;

    fn demo_config(mode: ExecutionMode) -> AppConfig {
        let mut config = AppConfig::default();
        config.registry.root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../registry");
        config.executors.mock_mode = true;
        config.engine.execution_mode = mode;
        config
    }

    #[tokio::test]
    async fn test_demo_registry_runs_in_mock_mode() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::Waves] {
            let state = AppState::init(demo_config(mode)).unwrap();
            let mut request = skillflow_types::ValueMap::new();
            request.insert("message".into(), json!("quiet cabin near Lake Tahoe for 4"));

            let result = state.engine.execute_default(request).await.unwrap();
            assert_eq!(result.flow_id, "travel_search");
            assert_eq!(result.response["location"], json!("Lake Tahoe"));
            assert_eq!(result.response["search_status"], json!("ok"));
            assert_eq!(result.response["listings"].as_array().unwrap().len(), 2);
            assert!(!result.response["web_summary"].as_str().unwrap().is_empty());
            assert!(
                result.steps.iter().all(|t| t.status == StepStatus::Executed),
                "{:?}",
                result.steps
            );
        }
    }

    #[test]
    fn test_missing_registry_fails_init() {
        let mut config = AppConfig::default();
        config.registry.root = "/definitely/not/a/registry".into();
        let err = AppState::init(config).err().unwrap();
        assert!(format!("{err:#}").contains("failed to load registry"));
    }
}
