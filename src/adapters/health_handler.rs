//! Health check endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Basic health check
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let agents = state.registry.list().await.len();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": uptime,
            "agents": agents,
        })),
    )
}

/// Readiness check: the registry has been loaded and handlers are wired
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let agents = state.registry.list().await.len();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "agents": agents,
        })),
    )
}

/// Liveness check
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}
