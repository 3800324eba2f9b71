//! Registry summary and reload handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/health - Liveness plus loaded registry counts.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let start = Instant::now();
    let index = state.registry().snapshot();
    Json(ApiResponse::success(
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "skills": index.skill_count(),
            "flows": index.flow_count(),
        }),
        start,
    ))
}

/// GET /api/v1/registry - Descriptor, counts and registered executor types.
pub async fn get_registry(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let registry = state.registry();
    let index = registry.snapshot();
    let executors: Vec<String> = registry
        .executors()
        .types()
        .into_iter()
        .map(|t| t.to_string())
        .collect();
    let data = json!({
        "root": registry.root().map(|p| p.display().to_string()),
        "descriptor": index.descriptor(),
        "skills": index.skill_count(),
        "flows": index.flow_count(),
        "executors": executors,
        "mock_mode": state.config.executors.mock_mode,
    });
    Ok(Json(ApiResponse::success(data, start).with_link("self", "/api/v1/registry")))
}

/// POST /api/v1/registry/reload - Rebuild the index from disk.
///
/// On validation failure the previous index stays active and the response
/// is 422.
pub async fn reload(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let registry = Arc::clone(state.registry());
    let index = tokio::task::spawn_blocking(move || registry.reload())
        .await
        .map_err(|e| AppError::Internal(format!("reload task failed: {e}")))??;

    tracing::info!(
        skills = index.skill_count(),
        flows = index.flow_count(),
        "registry reloaded via API"
    );
    let data = json!({
        "skills": index.skill_count(),
        "flows": index.flow_count(),
        "default_flow": index.descriptor().default_flow,
    });
    Ok(Json(ApiResponse::success(data, start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::state::test_support::{fixture_state, write};

    #[tokio::test]
    async fn test_reload_picks_up_changes_and_rejects_invalid() {
        let (tmp, state) = fixture_state();
        write(
            tmp.path(),
            "skills/format/manifest.yaml",
            "skill_id: format_price\nname: Format\ntype: function\nconfig:\n  function_name: format_price\n",
        );
        let Json(resp) = reload(State(state.clone())).await.unwrap();
        assert_eq!(resp.data.unwrap()["skills"], json!(3));

        write(
            tmp.path(),
            "flows/dangling.yaml",
            "flow_id: dangling\nname: D\nsteps:\n  - {id: s, skill: ghost}\n",
        );
        let err = reload(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.registry().snapshot().skill_count(), 3);
        assert_eq!(state.registry().snapshot().flow_count(), 2);
    }

    #[tokio::test]
    async fn test_summary_names_executors() {
        let (_tmp, state) = fixture_state();
        let Json(resp) = get_registry(State(state)).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data["executors"], json!(["function"]));
        assert_eq!(data["descriptor"]["default_flow"], json!("price_quote"));
    }
}
