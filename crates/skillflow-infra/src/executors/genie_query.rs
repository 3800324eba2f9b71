//! `genie_query` skills: natural-language questions against a Genie space.
//!
//! A query starts a conversation, then polls the message until it reaches a
//! terminal status. Completed messages yield the text answer plus any query
//! attachment rows as `items`. A message that ends `FAILED` is a normal
//! output with `genie_status: "error"` so flows can branch on it; transport
//! failures and poll timeouts are executor errors, retried up to
//! `max_retries` times.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;

use skillflow_core::SkillExecutor;
use skillflow_types::ValueMap;
use skillflow_types::config::ExecutorSettings;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::{input_str, into_output, parse_config, use_mock};
use crate::workspace::{WorkspaceClient, resolve_env_placeholder};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const NO_ANSWER_TEXT: &str = "I couldn't find relevant information for your query.";

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct GenieConfig {
    space_id: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
}

/// Terminal and in-flight message states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageStatus {
    Completed,
    Failed,
    Pending,
}

impl MessageStatus {
    fn of(message: &Value) -> Self {
        let status = message
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_uppercase();
        match status.as_str() {
            "COMPLETED" => Self::Completed,
            "FAILED" | "ERROR" | "CANCELLED" | "QUERY_RESULT_EXPIRED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug)]
pub struct GenieQueryExecutor {
    mock_mode: bool,
    workspace: WorkspaceClient,
}

impl GenieQueryExecutor {
    pub fn new(settings: &ExecutorSettings, workspace: WorkspaceClient) -> Self {
        Self {
            mock_mode: settings.mock_mode,
            workspace,
        }
    }

    async fn run_query(&self, space_id: &str, query: &str, timeout: Duration) -> Result<ValueMap, ExecutorError> {
        let start = self
            .workspace
            .post_json(
                &format!("/api/2.0/genie/spaces/{space_id}/start-conversation"),
                &json!({ "content": query }),
            )
            .await?;
        let conversation_id = id_field(&start, "conversation_id", "conversation")?;
        let message_id = id_field(&start, "message_id", "message")?;
        tracing::debug!(%conversation_id, %message_id, "genie conversation started");

        let message_path =
            format!("/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}/messages/{message_id}");
        let deadline = Instant::now() + timeout;
        loop {
            let message = self.workspace.get_json(&message_path).await?;
            match MessageStatus::of(&message) {
                MessageStatus::Completed => return Ok(self.completed_output(&message_path, &message).await),
                MessageStatus::Failed => {
                    let error = message
                        .get("error")
                        .map(|e| match e {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "Unknown error".to_string());
                    tracing::warn!(%conversation_id, %error, "genie message failed");
                    return Ok(into_output(json!({
                        "answer_text": null,
                        "items": [],
                        "genie_status": "error",
                        "error": error,
                    })));
                }
                MessageStatus::Pending => {}
            }
            if Instant::now() >= deadline {
                return Err(ExecutorError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn completed_output(&self, message_path: &str, message: &Value) -> ValueMap {
        let attachments = message
            .get("attachments")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut answer_text = None;
        let mut items = Vec::new();
        for attachment in attachments {
            if let Some(text) = attachment.pointer("/text/content").and_then(Value::as_str) {
                answer_text = Some(text.to_string());
            }
            if attachment.get("query").is_none() {
                continue;
            }
            let Some(attachment_id) = attachment.get("attachment_id").and_then(Value::as_str) else {
                continue;
            };
            let path = format!("{message_path}/query-result/{attachment_id}");
            match self.workspace.get_json(&path).await {
                Ok(result) => items.extend(result_rows(&result)),
                Err(err) => tracing::warn!(%attachment_id, error = %err, "failed to fetch genie query result"),
            }
        }
        tracing::info!(items = items.len(), "genie query completed");
        genie_output(answer_text, items)
    }
}

impl SkillExecutor for GenieQueryExecutor {
    fn skill_type(&self) -> SkillType {
        SkillType::GenieQuery
    }

    async fn execute(&self, skill: &SkillManifest, inputs: &ValueMap) -> Result<ValueMap, ExecutorError> {
        if use_mock(self.mock_mode, skill) {
            return Ok(mock_output());
        }

        let config: GenieConfig = parse_config(skill)?;
        let space_id = resolve_env_placeholder(&config.space_id);
        let query = input_str(inputs, "query_text")?;
        let timeout = Duration::from_secs(config.timeout_seconds);
        let preview: String = query.chars().take(80).collect();
        tracing::info!(skill_id = %skill.skill_id, %space_id, query = %preview, "querying genie space");

        let mut attempt = 0;
        loop {
            match self.run_query(&space_id, query, timeout).await {
                Ok(output) => return Ok(output),
                Err(err) if attempt < config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "genie attempt failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Read an id either flat (`conversation_id`) or nested (`conversation.id`).
fn id_field(body: &Value, flat: &str, nested: &str) -> Result<String, ExecutorError> {
    body.get(flat)
        .or_else(|| body.get(nested).and_then(|n| n.get("id")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ExecutorError::MalformedResponse(format!("start-conversation response has no {flat}")))
}

/// Turn a statement result into row objects keyed by column name. Rows are
/// kept as `{"data": row}` when the schema is missing.
fn result_rows(result: &Value) -> Vec<Value> {
    let statement = result.get("statement_response").unwrap_or(result);
    let columns: Vec<&str> = statement
        .pointer("/manifest/schema/columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    let Some(rows) = statement.pointer("/result/data_array").and_then(Value::as_array) else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            let cells = row.as_array().map(Vec::as_slice).unwrap_or_default();
            if columns.is_empty() {
                return json!({ "data": row });
            }
            let item: ValueMap = columns
                .iter()
                .zip(cells)
                .map(|(name, cell)| (name.to_string(), cell.clone()))
                .collect();
            Value::Object(item)
        })
        .collect()
}

fn genie_output(answer_text: Option<String>, items: Vec<Value>) -> ValueMap {
    if answer_text.is_none() && items.is_empty() {
        return into_output(json!({
            "answer_text": NO_ANSWER_TEXT,
            "items": [],
            "genie_status": "no_answer",
        }));
    }
    into_output(json!({
        "answer_text": answer_text,
        "items": items,
        "genie_status": "ok",
    }))
}

fn mock_output() -> ValueMap {
    into_output(json!({
        "answer_text": "Based on your preferences, I found several highly-rated hotels that match your criteria.",
        "items": [
            {
                "id": "stay_mock_1",
                "name": "Grand Miami Resort & Spa",
                "location": "Miami Beach, FL",
                "price_per_night": 289,
                "rating": 4.8,
                "highlights": ["Ocean view", "Near concert venues", "Pool access"],
            },
            {
                "id": "stay_mock_2",
                "name": "Downtown Miami Luxury Hotel",
                "location": "Downtown Miami, FL",
                "price_per_night": 245,
                "rating": 4.6,
                "highlights": ["Walking distance to events", "Rooftop bar", "Free breakfast"],
            },
            {
                "id": "stay_mock_3",
                "name": "Beachside Boutique Inn",
                "location": "South Beach, FL",
                "price_per_night": 199,
                "rating": 4.5,
                "highlights": ["Beach access", "Cozy atmosphere", "Great reviews"],
            },
        ],
        "genie_status": "ok",
    }))
}
