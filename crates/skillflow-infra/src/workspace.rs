//! HTTP client for the data workspace REST API.
//!
//! Shared by the `genie_query` and `prompt_registry` executors. Holds one
//! pooled `reqwest::Client`, the workspace base URL and the bearer token read
//! from the environment variable named in [`ExecutorSettings::token_env`].

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;

/// Fallback environment variable for the workspace URL.
const HOST_ENV: &str = "DATABRICKS_HOST";

/// Longest response body excerpt carried in an error message.
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    host: Option<String>,
    token: Option<SecretString>,
    timeout_secs: u64,
}

impl WorkspaceClient {
    pub fn from_settings(settings: &ExecutorSettings) -> Result<Self, ExecutorError> {
        let http = build_http_client(settings.http_timeout_secs)?;
        let host = settings
            .workspace_host
            .clone()
            .or_else(|| std::env::var(HOST_ENV).ok())
            .map(|h| h.trim_end_matches('/').to_string())
            .filter(|h| !h.is_empty());
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        Ok(Self {
            http,
            host,
            token,
            timeout_secs: settings.http_timeout_secs,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn host(&self) -> Result<&str, ExecutorError> {
        self.host.as_deref().ok_or_else(|| {
            ExecutorError::Config(format!(
                "workspace host is not configured (set executors.workspace_host or {HOST_ENV})"
            ))
        })
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, ExecutorError> {
        let url = format!("{}{path}", self.host()?);
        self.send(self.http.get(url)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ExecutorError> {
        let url = format!("{}{path}", self.host()?);
        self.send(self.http.post(url).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ExecutorError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;
        read_json(response, self.timeout_secs).await
    }
}

impl std::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("host", &self.host)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

/// Build the pooled HTTP client used by every executor backend.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, ExecutorError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("skillflow/0.1")
        .build()
        .map_err(|e| ExecutorError::Config(format!("failed to build HTTP client: {e}")))
}

/// Decode a JSON response body, mapping non-success statuses to errors.
///
/// 4xx responses are `Rejected`; everything else that is not 2xx is a
/// `Backend` error.
pub async fn read_json(response: reqwest::Response, timeout_secs: u64) -> Result<Value, ExecutorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(e, timeout_secs))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ExecutorError::MalformedResponse(format!("invalid JSON body: {e}")))
}

pub fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> ExecutorError {
    if err.is_timeout() {
        ExecutorError::Timeout(timeout_secs)
    } else {
        ExecutorError::Backend(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> ExecutorError {
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    let message = format!("HTTP {status}: {excerpt}");
    if status.is_client_error() {
        ExecutorError::Rejected(message)
    } else {
        ExecutorError::Backend(message)
    }
}

/// Resolve a whole-value `${NAME}` placeholder from the environment.
///
/// Values that are not a placeholder, or name an unset variable, are
/// returned unchanged.
pub fn resolve_env_placeholder(value: &str) -> String {
    resolve_env_placeholder_with(value, |name| std::env::var(name).ok())
}

pub(crate) fn resolve_env_placeholder_with(
    value: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .and_then(|name| lookup(name))
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_resolves_from_lookup() {
        let lookup = |name: &str| (name == "SPACE").then(|| "01ef".to_string());
        assert_eq!(resolve_env_placeholder_with("${SPACE}", lookup), "01ef");
        assert_eq!(resolve_env_placeholder_with("${OTHER}", lookup), "${OTHER}");
        assert_eq!(resolve_env_placeholder_with("plain", lookup), "plain");
        assert_eq!(resolve_env_placeholder_with("x${SPACE}", lookup), "x${SPACE}");
    }

    #[test]
    fn test_status_errors_split_client_and_server() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "no such space"),
            ExecutorError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            ExecutorError::Backend(_)
        ));
    }

    #[test]
    fn test_host_must_be_configured() {
        let client = WorkspaceClient {
            http: reqwest::Client::new(),
            host: None,
            token: None,
            timeout_secs: 30,
        };
        assert!(matches!(client.host(), Err(ExecutorError::Config(_))));
        assert!(!format!("{client:?}").contains("token:"));
    }
}
