//! Configuration loader for SkillFlow.
//!
//! Reads `config.toml` from an explicit path or the data directory
//! (`~/.skillflow/` by default) into [`AppConfig`], then applies environment
//! overrides. Falls back to defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use skillflow_types::config::AppConfig;

/// Environment variables that force executor mock mode, in priority order.
const MOCK_MODE_VARS: [&str; 2] = ["SKILLFLOW_MOCK_MODE", "APP_MOCK_MODE"];

/// Environment variable overriding the registry root.
const REGISTRY_DIR_VAR: &str = "SKILLFLOW_REGISTRY_DIR";

/// Resolve the data directory.
///
/// Priority:
/// 1. `SKILLFLOW_DATA_DIR` environment variable
/// 2. `~/.skillflow`
/// 3. `.skillflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SKILLFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".skillflow");
    }
    PathBuf::from(".skillflow")
}

/// Load configuration from `path`.
///
/// - Missing file: returns [`AppConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config_file(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

/// Load the effective configuration: `explicit` path if given, else
/// `{data_dir}/config.toml`, with environment overrides applied.
pub async fn load_app_config(explicit: Option<&Path>) -> AppConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => resolve_data_dir().join("config.toml"),
    };
    let mut config = load_config_file(&path).await;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    for var in MOCK_MODE_VARS {
        let Some(raw) = lookup(var) else {
            continue;
        };
        match parse_flag(&raw) {
            Some(flag) => {
                config.executors.mock_mode = flag;
                break;
            }
            None => tracing::warn!("Ignoring {var}={raw:?}: expected true or false"),
        }
    }

    if let Some(dir) = lookup(REGISTRY_DIR_VAR).filter(|d| !d.trim().is_empty()) {
        config.registry.root = PathBuf::from(dir);
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
