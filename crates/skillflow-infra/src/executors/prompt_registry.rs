//! Versioned prompt templates from the workspace prompt registry.
//!
//! Prompts are addressed as `prompts:/<catalog.schema.name>/<version>`. The
//! `prompt_registry` executor fetches one version and renders `{{var}}`
//! placeholders; `llm_call` reuses [`fetch_prompt`] for registry-sourced
//! system prompts.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Value, json};

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::{into_output, parse_config, use_mock};
use crate::workspace::WorkspaceClient;

const URI_SCHEME: &str = "prompts:/";

/// Where a skill's prompt text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    #[default]
    Inline,
    Registry,
    File,
}

/// The `config.prompt` block shared by `llm_call` and `prompt_registry`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub source: PromptSource,
    #[serde(default)]
    pub inline_text: Option<String>,
    #[serde(default)]
    pub registry_uri: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub version: Option<u32>,
}

/// A parsed `prompts:/name/version` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptUri {
    pub name: String,
    pub version: Option<u32>,
}

impl PromptUri {
    pub fn parse(uri: &str) -> Result<Self, ExecutorError> {
        let rest = uri.strip_prefix(URI_SCHEME).unwrap_or(uri);
        let mut parts = rest.split('/').filter(|p| !p.is_empty());
        let name = parts
            .next()
            .ok_or_else(|| ExecutorError::Config(format!("prompt URI '{uri}' has no name")))?;
        let version = parts
            .next()
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    ExecutorError::Config(format!("prompt URI '{uri}' has a non-numeric version"))
                })
            })
            .transpose()?;
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

/// One fetched prompt version.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptVersion {
    pub name: String,
    pub version: Value,
    pub template: String,
    pub description: String,
}

/// Fetch a prompt version from the registry.
pub async fn fetch_prompt(
    workspace: &WorkspaceClient,
    name: &str,
    version: u32,
) -> Result<PromptVersion, ExecutorError> {
    let path = format!("/api/2.0/mlflow/unity-catalog/prompts/{name}/versions/{version}");
    let body = workspace.get_json(&path).await?;
    parse_prompt_version(&body, name, version)
}

fn parse_prompt_version(body: &Value, name: &str, version: u32) -> Result<PromptVersion, ExecutorError> {
    let data = body.get("prompt_version").ok_or_else(|| {
        ExecutorError::MalformedResponse("prompt registry response has no prompt_version".into())
    })?;
    let template = data
        .get("template")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::MalformedResponse("prompt version has no template".into()))?;
    Ok(PromptVersion {
        name: data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string(),
        version: data.get("version").cloned().unwrap_or(json!(version)),
        template: template.to_string(),
        description: data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Replace `{{ key }}` placeholders with values from `variables`.
///
/// Strings are inserted verbatim, other values as JSON text. Placeholders
/// naming unknown variables are left in place.
pub fn render_template(template: &str, variables: &ValueMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + len].trim();
        out.push_str(&rest[..start]);
        match variables.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&rest[start..start + len + 4]),
        }
        rest = &rest[start + len + 4..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Default, Deserialize)]
struct PromptRegistryConfig {
    #[serde(default)]
    prompt: Option<PromptConfig>,
}

#[derive(Debug)]
pub struct PromptRegistryExecutor {
    mock_mode: bool,
    workspace: WorkspaceClient,
}

impl PromptRegistryExecutor {
    pub fn new(settings: &ExecutorSettings, workspace: WorkspaceClient) -> Self {
        Self {
            mock_mode: settings.mock_mode,
            workspace,
        }
    }

    fn mock_output(&self) -> ValueMap {
        into_output(json!({
            "prompt_name": "mock_prompt",
            "prompt_version": 1,
            "raw_template": "You are a helpful {{role}} assistant.",
            "rendered_prompt": "You are a helpful travel assistant.",
            "description": "Mock prompt for testing",
        }))
    }
}

impl SkillExecutor for PromptRegistryExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::PromptRegistry
    }

    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        if use_mock(self.mock_mode, skill) {
            return Ok(self.mock_output());
        }

        let config: PromptRegistryConfig = parse_config(skill)?;
        let prompt = config.prompt.unwrap_or_default();
        let uri = inputs
            .get("prompt_uri")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or(prompt.registry_uri.as_deref())
            .ok_or_else(|| {
                ExecutorError::Config("no prompt_uri input and no config.prompt.registry_uri".into())
            })?;
        let uri = PromptUri::parse(uri)?;
        let version = uri.version.or(prompt.version).unwrap_or(1);

        tracing::info!(skill_id = %skill.skill_id, prompt = %uri.name, version, "fetching prompt");
        let fetched = fetch_prompt(&self.workspace, &uri.name, version).await?;

        let variables = match inputs.get("variables") {
            Some(Value::Object(map)) => map.clone(),
            _ => ValueMap::new(),
        };
        let rendered = render_template(&fetched.template, &variables);
        Ok(into_output(json!({
            "prompt_name": fetched.name,
            "prompt_version": fetched.version,
            "raw_template": fetched.template,
            "rendered_prompt": rendered,
            "description": fetched.description,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_uri_with_and_without_version() {
        assert_eq!(
            PromptUri::parse("prompts:/main.travel.rewrite/3").unwrap(),
            PromptUri {
                name: "main.travel.rewrite".into(),
                version: Some(3)
            }
        );
        assert_eq!(PromptUri::parse("prompts:/main.travel.rewrite").unwrap().version, None);
        assert!(PromptUri::parse("prompts:/").is_err());
        assert!(PromptUri::parse("prompts:/a/latest").is_err());
    }

    #[test]
    fn test_render_replaces_known_placeholders() {
        let rendered = render_template(
            "Find stays in {{ location }} for {{guests}} guests. {{unknown}}",
            &vars(json!({"location": "Austin", "guests": 4})),
        );
        assert_eq!(rendered, "Find stays in Austin for 4 guests. {{unknown}}");
    }

    #[test]
    fn test_render_leaves_unclosed_braces() {
        assert_eq!(render_template("hello {{name", &ValueMap::new()), "hello {{name");
    }

    #[test]
    fn test_parse_prompt_version_fills_defaults() {
        let body = json!({"prompt_version": {"template": "You are {{role}}."}});
        let parsed = parse_prompt_version(&body, "main.p", 2).unwrap();
        assert_eq!(parsed.name, "main.p");
        assert_eq!(parsed.version, json!(2));
        assert_eq!(parsed.description, "");

        let err = parse_prompt_version(&json!({}), "main.p", 2).unwrap_err();
        assert!(matches!(err, ExecutorError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_mock_mode_serves_canned_prompt() {
        let settings = ExecutorSettings {
            mock_mode: true,
            ..ExecutorSettings::default()
        };
        let workspace = WorkspaceClient::from_settings(&settings).unwrap();
        let executor = PromptRegistryExecutor::new(&settings, workspace);
        let skill: SkillManifest = serde_json::from_value(json!({
            "skill_id": "load_prompt",
            "name": "Load Prompt",
            "type": "prompt_registry",
        }))
        .unwrap();
        let out = executor.execute(&skill, &ValueMap::new()).await.unwrap();
        assert_eq!(out["prompt_name"], json!("mock_prompt"));
    }
}
