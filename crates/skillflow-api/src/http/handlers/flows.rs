//! Flow listing and execution handlers.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use serde::Serialize;

use skillflow_types::ValueMap;
use skillflow_types::flow::{FlowDefinition, FlowResult};

use super::skills::TagQuery;
use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FlowSummary {
    pub flow_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    pub version: u32,
    pub step_count: usize,
    pub tags: Vec<String>,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct FlowDetail {
    #[serde(flatten)]
    pub flow: FlowDefinition,
    /// Step ids grouped by reference depth.
    pub waves: Vec<Vec<String>>,
}

/// GET /api/v1/flows - List flows, optionally filtered by tag.
pub async fn list_flows(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<ApiResponse<Vec<FlowSummary>>>, AppError> {
    let start = Instant::now();
    let index = state.registry().snapshot();
    let default_flow = index.descriptor().default_flow.as_deref();
    let flows = match query.tag.as_deref() {
        Some(tag) => index.flows_by_tag(tag),
        None => index.list_flows(),
    };
    let summaries = flows
        .into_iter()
        .map(|f| FlowSummary {
            flow_id: f.flow_id.clone(),
            name: f.name.clone(),
            description: f.description.clone(),
            trigger: f.trigger.clone(),
            version: f.version,
            step_count: f.steps.len(),
            tags: f.tags.clone(),
            is_default: default_flow == Some(f.flow_id.as_str()),
        })
        .collect();
    Ok(Json(ApiResponse::success(summaries, start).with_link("self", "/api/v1/flows")))
}

/// GET /api/v1/flows/{id} - Flow definition plus its execution waves.
pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FlowDetail>>, AppError> {
    let start = Instant::now();
    let index = state.registry().snapshot();
    let compiled = index.lookup_flow(&id)?;
    let waves = compiled
        .waves
        .iter()
        .map(|wave| wave.iter().map(|&i| compiled.steps[i].id.clone()).collect())
        .collect();
    let detail = FlowDetail {
        flow: compiled.definition.clone(),
        waves,
    };
    let href = format!("/api/v1/flows/{id}");
    let execute = format!("{href}/execute");
    Ok(Json(
        ApiResponse::success(detail, start)
            .with_link("self", &href)
            .with_link("execute", &execute),
    ))
}

/// POST /api/v1/flows/{id}/execute - Run a flow against the request map in
/// the body. An empty body is an empty request.
pub async fn execute_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<FlowResult>>, AppError> {
    let start = Instant::now();
    let request = parse_request(&body)?;
    let result = state.engine.execute_flow(&id, request).await?;
    Ok(Json(ApiResponse::success(result, start)))
}

/// POST /api/v1/execute - Run the registry's default flow.
pub async fn execute_default(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<FlowResult>>, AppError> {
    let start = Instant::now();
    let request = parse_request(&body)?;
    let result = state.engine.execute_default(request).await?;
    Ok(Json(ApiResponse::success(result, start)))
}

fn parse_request(body: &[u8]) -> Result<ValueMap, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ValueMap::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("request body must be a JSON object: {e}")))
}
