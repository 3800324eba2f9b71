//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::registry::health))
        // Skills
        .route("/skills", get(handlers::skills::list_skills))
        .route("/skills/{id}", get(handlers::skills::get_skill))
        // Flows
        .route("/flows", get(handlers::flows::list_flows))
        .route("/flows/{id}", get(handlers::flows::get_flow))
        .route("/flows/{id}/execute", post(handlers::flows::execute_flow))
        .route("/execute", post(handlers::flows::execute_default))
        // Registry
        .route("/registry", get(handlers::registry::get_registry))
        .route("/registry/reload", post(handlers::registry::reload));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
