//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use skillflow_core::RegistryError;
use skillflow_types::error::{AbortCause, FlowAbortError, FlowError, NotFoundError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Unknown skill, flow or executor.
    NotFound(NotFoundError),
    /// A `fail_flow` step failure or flow timeout.
    FlowAborted(Box<FlowAbortError>),
    /// Registry reload failed; the previous index is still active.
    Registry(RegistryError),
    /// Malformed request body.
    BadRequest(String),
    Internal(String),
}

impl From<NotFoundError> for AppError {
    fn from(e: NotFoundError) -> Self {
        AppError::NotFound(e)
    }
}

impl From<FlowError> for AppError {
    fn from(e: FlowError) -> Self {
        match e {
            FlowError::NotFound(e) => AppError::NotFound(e),
            FlowError::Aborted(abort) => AppError::FlowAborted(abort),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        AppError::Registry(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(NotFoundError::Skill(_)) => (StatusCode::NOT_FOUND, "SKILL_NOT_FOUND"),
            AppError::NotFound(NotFoundError::Flow(_)) => (StatusCode::NOT_FOUND, "FLOW_NOT_FOUND"),
            AppError::NotFound(NotFoundError::Executor(_)) => (StatusCode::NOT_FOUND, "EXECUTOR_NOT_FOUND"),
            AppError::FlowAborted(abort) => match abort.cause {
                AbortCause::Timeout { .. } => (StatusCode::BAD_GATEWAY, "FLOW_TIMEOUT"),
                AbortCause::Step { .. } => (StatusCode::BAD_GATEWAY, "FLOW_ABORTED"),
            },
            AppError::Registry(RegistryError::Invalid(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "REGISTRY_INVALID")
            }
            AppError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REGISTRY_ERROR"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::NotFound(e) => e.to_string(),
            AppError::FlowAborted(e) => e.to_string(),
            AppError::Registry(e) => e.to_string(),
            AppError::BadRequest(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::FlowAborted(abort) => {
                let failed_step = match &abort.cause {
                    AbortCause::Step { step_id, .. } => Some(step_id.as_str()),
                    AbortCause::Timeout { .. } => None,
                };
                Some(json!({
                    "flow_id": abort.flow_id,
                    "failed_step": failed_step,
                    "steps": abort.trace,
                }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %self.message(), "request failed");
        } else {
            tracing::debug!(code, error = %self.message(), "request rejected");
        }
        let body = ApiResponse::error(code, self.message(), self.details());
        (status, body).into_response()
    }
}
