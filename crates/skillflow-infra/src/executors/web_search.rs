//! `web_search` skills backed by SerpAPI, Bing or Google Custom Search.
//!
//! Results are normalized to `{snippets, links, search_status}`. A missing
//! API key is not an error: the skill returns empty results with
//! `search_status: "no_config"` so the flow can continue.

use std::fmt;

use serde::Deserialize;
use serde_json::{Value, json};

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::{input_str, into_output, parse_config, use_mock};
use crate::workspace::{build_http_client, map_transport_error, read_json, resolve_env_placeholder};

const SERPAPI_URL: &str = "https://serpapi.com/search";
const BING_URL: &str = "https://api.bing.microsoft.com/v7.0/search";
const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const DEFAULT_NUM_RESULTS: u64 = 10;
/// Google CSE rejects `num` above this.
const GOOGLE_MAX_RESULTS: u64 = 10;

fn default_api_key_env() -> String {
    "WEB_SEARCH_API_KEY".to_string()
}

fn default_cse_id_env() -> String {
    "GOOGLE_CSE_ID".to_string()
}

#[derive(Debug, Deserialize)]
struct WebSearchConfig {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
    #[serde(default = "default_cse_id_env")]
    cse_id_env: String,
    /// Override for the Bing endpoint.
    #[serde(default)]
    endpoint: Option<String>,
    /// Appended to every query, e.g. `" hotels accommodations"`.
    #[serde(default)]
    query_suffix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchProvider {
    SerpApi,
    Bing,
    GoogleCse,
}

impl SearchProvider {
    fn parse(name: &str) -> Result<Self, ExecutorError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "serpapi" => Ok(Self::SerpApi),
            "bing" => Ok(Self::Bing),
            "google_cse" | "google" => Ok(Self::GoogleCse),
            other => Err(ExecutorError::Config(format!("unknown search provider '{other}'"))),
        }
    }
}

impl fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SerpApi => "serpapi",
            Self::Bing => "bing",
            Self::GoogleCse => "google_cse",
        })
    }
}

#[derive(Debug)]
pub struct WebSearchExecutor {
    mock_mode: bool,
    default_provider: String,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl WebSearchExecutor {
    pub fn new(settings: &ExecutorSettings) -> Result<Self, ExecutorError> {
        Ok(Self {
            mock_mode: settings.mock_mode,
            default_provider: settings.search_provider.clone(),
            http: build_http_client(settings.http_timeout_secs)?,
            timeout_secs: settings.http_timeout_secs,
        })
    }

    async fn get(&self, request: reqwest::RequestBuilder) -> Result<Value, ExecutorError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;
        read_json(response, self.timeout_secs).await
    }
}

impl SkillExecutor for WebSearchExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::WebSearch
    }

    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        if use_mock(self.mock_mode, skill) {
            return Ok(mock_output());
        }

        let config: WebSearchConfig = parse_config(skill)?;
        let query = input_str(inputs, "query")?;
        let num_results = inputs
            .get("num_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_NUM_RESULTS);

        let Some(api_key) = env_value(&config.api_key_env) else {
            tracing::warn!(skill_id = %skill.skill_id, env = %config.api_key_env, "no search API key configured");
            return Ok(no_config());
        };
        let provider_name = config
            .provider
            .as_deref()
            .map(resolve_env_placeholder)
            .unwrap_or_else(|| self.default_provider.clone());
        let provider = SearchProvider::parse(&provider_name)?;
        let q = format!("{query}{}", config.query_suffix.as_deref().unwrap_or_default());
        let num = num_results.to_string();
        tracing::info!(skill_id = %skill.skill_id, %provider, num_results, "web search");

        let output = match provider {
            SearchProvider::SerpApi => {
                let body = self
                    .get(self.http.get(SERPAPI_URL).query(&[
                        ("q", q.as_str()),
                        ("api_key", api_key.as_str()),
                        ("num", num.as_str()),
                        ("engine", "google"),
                    ]))
                    .await?;
                normalize(body.get("organic_results"), "title", "link", num_results)
            }
            SearchProvider::Bing => {
                let endpoint = config.endpoint.as_deref().unwrap_or(BING_URL);
                let body = self
                    .get(
                        self.http
                            .get(endpoint)
                            .header("Ocp-Apim-Subscription-Key", &api_key)
                            .query(&[("q", q.as_str()), ("count", num.as_str()), ("mkt", "en-US")]),
                    )
                    .await?;
                normalize(body.pointer("/webPages/value"), "name", "url", num_results)
            }
            SearchProvider::GoogleCse => {
                let Some(cse_id) = env_value(&config.cse_id_env) else {
                    tracing::warn!(env = %config.cse_id_env, "Google CSE id not configured");
                    return Ok(no_config());
                };
                let capped = num_results.min(GOOGLE_MAX_RESULTS);
                let capped_str = capped.to_string();
                let body = self
                    .get(self.http.get(GOOGLE_CSE_URL).query(&[
                        ("key", api_key.as_str()),
                        ("cx", cse_id.as_str()),
                        ("q", q.as_str()),
                        ("num", capped_str.as_str()),
                    ]))
                    .await?;
                normalize(body.get("items"), "title", "link", capped)
            }
        };
        Ok(output)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Keep results that carry a snippet, up to `limit`.
fn normalize(results: Option<&Value>, title_key: &str, url_key: &str, limit: u64) -> ValueMap {
    let results = results.and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    let mut snippets = Vec::new();
    let mut links = Vec::new();
    for result in results.iter().take(limit as usize) {
        let snippet = result.get("snippet").and_then(Value::as_str).unwrap_or_default();
        if snippet.is_empty() {
            continue;
        }
        snippets.push(json!(snippet));
        links.push(json!({
            "title": result.get(title_key).and_then(Value::as_str).unwrap_or_default(),
            "url": result.get(url_key).and_then(Value::as_str).unwrap_or_default(),
            "snippet": snippet,
        }));
    }
    let status = if snippets.is_empty() { "no_results" } else { "ok" };
    into_output(json!({
        "snippets": snippets,
        "links": links,
        "search_status": status,
    }))
}

fn no_config() -> ValueMap {
    into_output(json!({
        "snippets": [],
        "links": [],
        "search_status": "no_config",
    }))
}

fn mock_output() -> ValueMap {
    into_output(json!({
        "snippets": [
            "The best hotels near Miami concert venues include the Grand Hyatt.",
            "For concerts, fans recommend staying downtown for easy transit access.",
            "Budget-friendly options under $300/night include several boutique hotels.",
            "Many hotels offer shuttle service to major concert venues.",
            "Top-rated accommodations in Miami Beach feature ocean views.",
        ],
        "links": [
            {
                "title": "Best Hotels Near Miami Concerts",
                "url": "https://example.com/miami-hotels",
                "snippet": "The best hotels near Miami concert venues include the Grand Hyatt.",
            },
            {
                "title": "Where to Stay for Miami Events",
                "url": "https://example.com/events-stay",
                "snippet": "For concerts, fans recommend staying downtown.",
            },
        ],
        "search_status": "ok",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(config: Value) -> SkillManifest {
        serde_json::from_value(json!({
            "skill_id": "web_search",
            "name": "Web Search",
            "type": "web_search",
            "config": config,
        }))
        .unwrap()
    }

    fn query(q: &str) -> ValueMap {
        json!({ "query": q }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_is_no_config() {
        let executor = WebSearchExecutor::new(&ExecutorSettings::default()).unwrap();
        let out = executor
            .execute(
                &skill(json!({"api_key_env": "SKILLFLOW_TEST_UNSET_SEARCH_KEY"})),
                &query("hotels in Miami"),
            )
            .await
            .unwrap();
        assert_eq!(out["search_status"], json!("no_config"));
        assert_eq!(out["snippets"], json!([]));
        assert_eq!(out["links"], json!([]));
    }

    #[tokio::test]
    async fn test_mock_mode_serves_canned_results() {
        let settings = ExecutorSettings {
            mock_mode: true,
            ..ExecutorSettings::default()
        };
        let executor = WebSearchExecutor::new(&settings).unwrap();
        let out = executor.execute(&skill(json!({})), &query("q")).await.unwrap();
        assert_eq!(out["snippets"].as_array().unwrap().len(), 5);
        assert_eq!(out["links"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_normalize_drops_results_without_snippet() {
        let results = json!([
            {"title": "A", "link": "https://a.example", "snippet": "alpha"},
            {"title": "B", "link": "https://b.example"},
            {"title": "C", "link": "https://c.example", "snippet": "gamma"},
        ]);
        let out = normalize(Some(&results), "title", "link", 10);
        assert_eq!(out["snippets"], json!(["alpha", "gamma"]));
        assert_eq!(out["links"][1]["url"], json!("https://c.example"));
        assert_eq!(out["search_status"], json!("ok"));

        let out = normalize(Some(&results), "title", "link", 1);
        assert_eq!(out["snippets"], json!(["alpha"]));
    }

    #[test]
    fn test_normalize_empty_is_no_results() {
        let out = normalize(None, "name", "url", 5);
        assert_eq!(out["search_status"], json!("no_results"));
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(SearchProvider::parse("SerpAPI").unwrap(), SearchProvider::SerpApi);
        assert_eq!(SearchProvider::parse("google_cse").unwrap(), SearchProvider::GoogleCse);
        assert!(matches!(SearchProvider::parse("duckduckgo"), Err(ExecutorError::Config(_))));
    }
}
