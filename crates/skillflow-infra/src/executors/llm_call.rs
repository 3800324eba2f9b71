//! `llm_call` skills: chat completion against an OpenAI-compatible serving
//! endpoint.
//!
//! The system prompt comes from `config.prompt` (inline text, a local file or
//! the prompt registry). The user message lists the resolved inputs. The
//! reply is expected to be a JSON object; when it is not, the first flat
//! `{...}` block is tried, and failing that the raw text is returned under the
//! skill's first output field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::prompt_registry::{PromptConfig, PromptSource, PromptUri, fetch_prompt};
use super::{into_output, parse_config, use_mock};
use crate::workspace::{WorkspaceClient, resolve_env_placeholder};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Snippets beyond this are left out of the user message.
const MAX_SNIPPETS: usize = 10;
/// Raw (non-JSON) replies are truncated to this many characters.
const RAW_REPLY_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
struct LlmCallConfig {
    /// Serving endpoint name or URL (`.../serving-endpoints/<name>/...`).
    #[serde(default)]
    endpoint: Option<String>,
    /// Explicit model name; defaults to the endpoint name.
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    prompt: Option<PromptConfig>,
}

// Does not derive Debug: the client config carries the API key.
pub struct LlmCallExecutor {
    mock_mode: bool,
    api_base: Option<String>,
    workspace: WorkspaceClient,
    prompt_dir: Option<PathBuf>,
    timeout: Duration,
}

impl LlmCallExecutor {
    pub fn new(settings: &ExecutorSettings, workspace: WorkspaceClient) -> Self {
        Self {
            mock_mode: settings.mock_mode,
            api_base: settings.llm_api_base.clone(),
            workspace,
            prompt_dir: settings.prompt_dir.clone(),
            timeout: Duration::from_secs(settings.http_timeout_secs),
        }
    }

    fn client(&self) -> Result<Client<OpenAIConfig>, ExecutorError> {
        let api_base = match &self.api_base {
            Some(base) => base.clone(),
            None => format!("{}/serving-endpoints", self.workspace.host()?),
        };
        let api_key = self
            .workspace
            .token()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_default();
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Ok(Client::with_config(config))
    }

    async fn system_prompt(&self, prompt: Option<&PromptConfig>) -> String {
        let Some(prompt) = prompt else {
            return DEFAULT_SYSTEM_PROMPT.to_string();
        };
        let loaded = match prompt.source {
            PromptSource::Inline => prompt.inline_text.clone(),
            PromptSource::File => self.load_prompt_file(prompt.file_path.as_deref()).await,
            PromptSource::Registry => self.load_registry_prompt(prompt).await,
        };
        loaded
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    async fn load_prompt_file(&self, path: Option<&Path>) -> Option<String> {
        let path = path?;
        let path = match &self.prompt_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read prompt file, using default");
                None
            }
        }
    }

    async fn load_registry_prompt(&self, prompt: &PromptConfig) -> Option<String> {
        let uri = PromptUri::parse(prompt.registry_uri.as_deref()?)
            .inspect_err(|err| tracing::warn!(error = %err, "invalid prompt URI, using default"))
            .ok()?;
        let version = uri.version.or(prompt.version).unwrap_or(1);
        match fetch_prompt(&self.workspace, &uri.name, version).await {
            Ok(fetched) => {
                tracing::info!(prompt = %uri.name, version, "loaded system prompt from registry");
                Some(fetched.template)
            }
            Err(err) => {
                tracing::warn!(prompt = %uri.name, error = %err, "failed to load prompt, using default");
                None
            }
        }
    }
}

impl SkillExecutor for LlmCallExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::LlmCall
    }

    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        if use_mock(self.mock_mode, skill) {
            return Ok(mock_output(inputs));
        }

        let config: LlmCallConfig = parse_config(skill)?;
        let model = match (&config.model, &config.endpoint) {
            (Some(model), _) => model.clone(),
            (None, Some(endpoint)) => endpoint_name(&resolve_env_placeholder(endpoint)),
            (None, None) => {
                return Err(ExecutorError::Config(format!(
                    "skill '{}' needs config.endpoint or config.model",
                    skill.skill_id
                )));
            }
        };

        let system = self.system_prompt(config.prompt.as_ref()).await;
        let request = CreateChatCompletionRequest {
            model: model.clone(),
            messages: vec![
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(system),
                    name: None,
                }),
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(build_user_message(inputs)),
                    name: None,
                }),
            ],
            max_completion_tokens: Some(config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            temperature: Some(config.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            ..Default::default()
        };

        tracing::info!(skill_id = %skill.skill_id, endpoint = %model, "calling serving endpoint");
        let client = self.client()?;
        let response = tokio::time::timeout(self.timeout, client.chat().create(request))
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout.as_secs()))?
            .map_err(map_openai_error)?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ExecutorError::MalformedResponse("completion has no content".into()))?;

        Ok(parse_reply(&text, skill.primary_output_field()))
    }
}

/// `https://host/serving-endpoints/my-llm/invocations` -> `my-llm`.
fn endpoint_name(endpoint: &str) -> String {
    let tail = endpoint
        .rsplit_once("/serving-endpoints/")
        .map_or(endpoint, |(_, tail)| tail);
    tail.split('/').next().unwrap_or(tail).to_string()
}

/// One line per input; `snippets` lists become a numbered block.
fn build_user_message(inputs: &ValueMap) -> String {
    let mut parts = Vec::with_capacity(inputs.len());
    for (key, value) in inputs {
        match value {
            Value::Null => {}
            Value::Array(items) if key == "snippets" => {
                let numbered: Vec<String> = items
                    .iter()
                    .take(MAX_SNIPPETS)
                    .enumerate()
                    .map(|(i, s)| format!("[{}] {}", i + 1, value_text(s)))
                    .collect();
                parts.push(format!("Web search results:\n{}", numbered.join("\n\n")));
            }
            Value::Array(_) | Value::Object(_) => parts.push(format!("{key}: {value}")),
            scalar => parts.push(format!("{key}: {}", value_text(scalar))),
        }
    }
    parts.join("\n")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Interpret a completion as an output map.
fn parse_reply(text: &str, primary_field: &str) -> ValueMap {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return match value {
            Value::Object(map) => map,
            other => single(primary_field, other),
        };
    }
    if let Some(Value::Object(map)) =
        first_flat_object(text).and_then(|block| serde_json::from_str(block).ok())
    {
        return map;
    }
    tracing::warn!("could not parse JSON from completion, wrapping raw text");
    let raw: String = text.trim().chars().take(RAW_REPLY_LIMIT).collect();
    single(primary_field, Value::String(raw))
}

/// The leftmost `{...}` span containing no nested braces.
fn first_flat_object(text: &str) -> Option<&str> {
    let mut open = None;
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => open = Some(i),
            '}' => {
                if let Some(start) = open {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn single(field: &str, value: Value) -> ValueMap {
    let mut map = ValueMap::new();
    map.insert(field.to_string(), value);
    map
}

fn map_openai_error(err: async_openai::error::OpenAIError) -> ExecutorError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => ExecutorError::Rejected(api_err.message.clone()),
        OpenAIError::Reqwest(reqwest_err) if reqwest_err.is_timeout() => {
            ExecutorError::Backend(format!("request timed out: {reqwest_err}"))
        }
        OpenAIError::JSONDeserialize(_, content) => {
            ExecutorError::MalformedResponse(format!("failed to parse completion: {content}"))
        }
        OpenAIError::InvalidArgument(msg) => ExecutorError::Config(msg.clone()),
        _ => ExecutorError::Backend(err.to_string()),
    }
}

fn mock_output(inputs: &ValueMap) -> ValueMap {
    let has_snippets = inputs
        .get("snippets")
        .and_then(Value::as_array)
        .is_some_and(|s| !s.is_empty());
    if has_snippets {
        return into_output(json!({
            "summary": "Based on web search results, there are several well-reviewed hotels in the area that match your criteria.",
            "suggestions": [
                {"name": "Suggested Hotel A", "reason": "Highly rated, great location", "source": "Web search"},
                {"name": "Suggested Hotel B", "reason": "Good value, walkable", "source": "Web search"},
            ],
        }));
    }

    let query = inputs
        .get("user_query")
        .or_else(|| inputs.get("query"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let location = if query.contains("tahoe") {
        "Lake Tahoe, CA"
    } else if query.contains("austin") {
        "Austin, TX"
    } else {
        "Miami, FL"
    };
    into_output(json!({
        "rewritten_query": format!("Find highly-rated hotels in {location} under $300/night with good amenities"),
        "assumptions": [format!("Looking for hotels in {location}"), "User prefers walkable locations"],
        "missing_info_questions": ["Do you have specific dates in mind?"],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_endpoint_name_from_url_or_bare_name() {
        assert_eq!(
            endpoint_name("https://ws.example.com/serving-endpoints/travel-llm/invocations"),
            "travel-llm"
        );
        assert_eq!(endpoint_name("travel-llm"), "travel-llm");
    }

    #[test]
    fn test_user_message_numbers_snippets() {
        let msg = build_user_message(&map(json!({
            "user_query": "hotels in Miami",
            "snippets": ["first", "second"],
            "filters": {"max_price": 300},
            "unused": null,
        })));
        assert_eq!(
            msg,
            "user_query: hotels in Miami\nWeb search results:\n[1] first\n\n[2] second\nfilters: {\"max_price\":300}"
        );
    }

    #[test]
    fn test_reply_parsed_as_json_object() {
        let out = parse_reply(r#"{"rewritten_query": "hotels in Austin"}"#, "rewritten_query");
        assert_eq!(out["rewritten_query"], json!("hotels in Austin"));
    }

    #[test]
    fn test_reply_with_embedded_object() {
        let out = parse_reply(
            "Sure! Here you go: {\"summary\": \"Two good options\"} Hope it helps.",
            "summary",
        );
        assert_eq!(out["summary"], json!("Two good options"));
    }

    #[test]
    fn test_reply_raw_text_is_truncated_under_primary_field() {
        let long = "x".repeat(800);
        let out = parse_reply(&format!("  {long}  "), "summary");
        assert_eq!(out["summary"].as_str().unwrap().len(), RAW_REPLY_LIMIT);
    }

    #[test]
    fn test_first_flat_object_skips_nested_opening() {
        assert_eq!(first_flat_object("a {b {\"c\": 1} d}"), Some("{\"c\": 1}"));
        assert_eq!(first_flat_object("no braces"), None);
    }

    #[tokio::test]
    async fn test_mock_rewriter_detects_location() {
        let settings = ExecutorSettings {
            mock_mode: true,
            ..ExecutorSettings::default()
        };
        let executor = LlmCallExecutor::new(&settings, WorkspaceClient::from_settings(&settings).unwrap());
        let skill: SkillManifest = serde_json::from_value(json!({
            "skill_id": "query_rewrite",
            "name": "Rewrite",
            "type": "llm_call",
        }))
        .unwrap();
        let out = executor
            .execute(&skill, &map(json!({"user_query": "cabins near Lake Tahoe"})))
            .await
            .unwrap();
        assert!(out["rewritten_query"].as_str().unwrap().contains("Lake Tahoe, CA"));
    }

    #[tokio::test]
    async fn test_system_prompt_defaults_when_file_missing() {
        let settings = ExecutorSettings::default();
        let executor = LlmCallExecutor::new(&settings, WorkspaceClient::from_settings(&settings).unwrap());
        let prompt = PromptConfig {
            source: PromptSource::File,
            file_path: Some(PathBuf::from("/definitely/not/here.txt")),
            ..PromptConfig::default()
        };
        assert_eq!(executor.system_prompt(Some(&prompt)).await, DEFAULT_SYSTEM_PROMPT);

        let inline = PromptConfig {
            inline_text: Some("You rewrite travel queries.".into()),
            ..PromptConfig::default()
        };
        assert_eq!(
            executor.system_prompt(Some(&inline)).await,
            "You rewrite travel queries."
        );
    }
}
