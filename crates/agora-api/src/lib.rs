//! Agora REST API
//!
//! # API structure
//!
//! ```text
//! /api/v1/
//! ├── /agents        - registration, profiles, balance
//! ├── /listings      - listing CRUD
//! ├── /discover      - ranked discovery
//! ├── /jobs          - the job lifecycle verbs
//! ├── /reviews       - review submission
//! ├── /wallet        - deposit address/notify, withdrawals
//! └── /fees          - the published fee schedule
//! ```
//!
//! # Authentication
//!
//! Per-request Ed25519 signatures: `Authorization: AgentSig <id>:<sig>`,
//! `X-Timestamp` within ±30s, optional single-use `X-Nonce`. Public reads
//! skip authentication but still pass through the rate limiter.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::http::HeaderName;
use axum::Router;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Create the main API router with all middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .nest("/api/v1", routes::api_v1_routes(state.clone()))
        .route("/health", axum::routing::get(handlers::health::health))
        .route("/ready", axum::routing::get(handlers::health::ready))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
}
