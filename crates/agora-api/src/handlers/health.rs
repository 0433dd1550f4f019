//! Health handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::state::AppState;

/// Liveness: the process is up.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness: both backing stores answer.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.health_check().await {
        Ok(health) if health.healthy => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "postgres": health.postgres,
                "redis": health.redis,
            })),
        ),
        Ok(health) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "postgres": health.postgres,
                "redis": health.redis,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "down" })),
            )
        }
    }
}
