//! Configuration types for SkillFlow.
//!
//! `AppConfig` represents the top-level `config.toml`. Every section and
//! field has a default, so an empty or missing file yields a working setup
//! that reads the registry from `./registry` and executes sequentially.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.skillflow/config.toml` (or `--config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub executors: ExecutorSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Where manifests and flows are discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Root containing `skill_registry.yaml`, `skills/` and `flows/`.
    #[serde(default = "default_registry_root")]
    pub root: PathBuf,
}

fn default_registry_root() -> PathBuf {
    PathBuf::from("registry")
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            root: default_registry_root(),
        }
    }
}

/// How the flow engine schedules steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One step at a time, in declaration order.
    #[default]
    Sequential,
    /// Steps grouped by reference depth; each group dispatches concurrently.
    Waves,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Overall per-invocation deadline. `None` disables the timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_timeout_secs: Option<u64>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

/// Settings shared by the concrete executors. The engine never reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Serve canned data for skills with `mock_enabled: true`.
    #[serde(default)]
    pub mock_mode: bool,
    /// Base URL of the data workspace (genie, prompt registry, LLM serving).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_host: Option<String>,
    /// Environment variable holding the workspace bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// OpenAI-compatible base URL for `llm_call` skills. Defaults to
    /// `{workspace_host}/serving-endpoints`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_base: Option<String>,
    /// Per-request HTTP timeout for executor backends.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Default connection string for `sql_query` skills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Directory that relative prompt `file` paths are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_dir: Option<PathBuf>,
    /// Provider for `web_search` skills that do not name one.
    #[serde(default = "default_search_provider")]
    pub search_provider: String,
}

fn default_search_provider() -> String {
    "serpapi".to_string()
}

fn default_token_env() -> String {
    "DATABRICKS_TOKEN".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            mock_mode: false,
            workspace_host: None,
            token_env: default_token_env(),
            llm_api_base: None,
            http_timeout_secs: default_http_timeout_secs(),
            database_url: None,
            prompt_dir: None,
            search_provider: default_search_provider(),
        }
    }
}

/// HTTP transport settings for `sflow serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reload the registry when files under its root change.
    #[serde(default)]
    pub watch: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            watch: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.registry.root, PathBuf::from("registry"));
        assert_eq!(config.engine.execution_mode, ExecutionMode::Sequential);
        assert!(config.engine.flow_timeout_secs.is_none());
        assert!(!config.executors.mock_mode);
        assert_eq!(config.executors.token_env, "DATABRICKS_TOKEN");
        assert_eq!(config.executors.http_timeout_secs, 30);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_app_config_deserialize_empty() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_app_config_deserialize_with_values() {
        let toml_str = r#"
[registry]
root = "/srv/skills"

[engine]
flow_timeout_secs = 45
execution_mode = "waves"

[executors]
mock_mode = true
workspace_host = "https://example.cloud.databricks.com"
database_url = "sqlite://listings.db"

[server]
port = 8080
watch = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.registry.root, PathBuf::from("/srv/skills"));
        assert_eq!(config.engine.flow_timeout_secs, Some(45));
        assert_eq!(config.engine.execution_mode, ExecutionMode::Waves);
        assert!(config.executors.mock_mode);
        assert_eq!(
            config.executors.workspace_host.as_deref(),
            Some("https://example.cloud.databricks.com")
        );
        assert_eq!(config.executors.token_env, "DATABRICKS_TOKEN");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.watch);
    }

    #[test]
    fn test_unknown_execution_mode_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[engine]\nexecution_mode = \"parallel\"\n");
        assert!(result.is_err());
    }
}
