//! API middleware
//!
//! One guard protects every route: request-body cap, AgentSig
//! authentication (required, optional, or skipped per route class), and the
//! per-principal token-bucket rate limit. Rate-limit metadata is attached
//! to the response on allow and deny alike. A separate layer stamps the
//! security headers on every response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

use agora_auth::rate_limit::client_ip_principal;
use agora_auth::{RateCategory, RateLimitOutcome};
use agora_types::AgoraError;

use crate::error::ApiError;
use crate::state::AppState;

/// How a route class treats authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// AgentSig required; failure is a uniform 403.
    Required,
    /// AgentSig verified when presented; anonymous otherwise. Used where
    /// the response shape depends on who is asking (result redaction).
    Optional,
    /// No authentication; rate-limited by client IP.
    Public,
}

/// Per-route-group guard parameters.
#[derive(Debug, Clone, Copy)]
pub struct RouteClass {
    pub category: RateCategory,
    pub auth: AuthMode,
}

impl RouteClass {
    pub const fn new(category: RateCategory, auth: AuthMode) -> Self {
        Self { category, auth }
    }
}

/// The request guard. Applied per route group via
/// `axum::middleware::from_fn_with_state`.
pub async fn guard(
    State((state, class)): State<(Arc<AppState>, RouteClass)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    // Body cap before anything parses the payload.
    if let Some(length) = parts
        .headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > state.max_body_bytes {
            return Err(ApiError(AgoraError::PayloadTooLarge {
                max_bytes: state.max_body_bytes,
            }));
        }
    }
    let body_bytes = to_bytes(body, state.max_body_bytes).await.map_err(|_| {
        ApiError(AgoraError::PayloadTooLarge {
            max_bytes: state.max_body_bytes,
        })
    })?;

    // Authentication. The signature covers the exact body bytes we buffered.
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    let agent = match (class.auth, auth_header) {
        (AuthMode::Public, _) => None,
        (AuthMode::Optional, None) => None,
        (AuthMode::Required, None) => return Err(ApiError(AgoraError::Authentication)),
        (_, Some(header)) => {
            let timestamp = parts
                .headers
                .get("x-timestamp")
                .and_then(|v| v.to_str().ok());
            let nonce = parts.headers.get("x-nonce").and_then(|v| v.to_str().ok());
            let agent = state
                .auth
                .authenticate(
                    header,
                    timestamp,
                    nonce,
                    parts.method.as_str(),
                    parts.uri.path(),
                    &body_bytes,
                )
                .await?;
            Some(agent)
        }
    };

    // Rate limiting keyed by agent id when authenticated, client IP otherwise.
    let principal = match &agent {
        Some(agent) => agent.agent_id.to_string(),
        None => {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok());
            let peer = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string());
            client_ip_principal(forwarded, peer.as_deref())
        }
    };
    let outcome = state.limiter.check(&principal, class.category).await?;
    if !outcome.allowed {
        // The triple is response metadata on deny as well as allow.
        let mut response = ApiError(AgoraError::RateLimited {
            retry_after_secs: outcome.retry_after_secs,
        })
        .into_response();
        attach_rate_headers(&mut response, &outcome);
        return Ok(response);
    }

    // Rebuild the request and run the handler.
    let mut request = Request::from_parts(parts, Body::from(body_bytes));
    if let Some(agent) = agent {
        request.extensions_mut().insert(agent);
    }
    let mut response = next.run(request).await;
    attach_rate_headers(&mut response, &outcome);
    Ok(response)
}

fn attach_rate_headers(response: &mut Response, outcome: &RateLimitOutcome) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&outcome.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&outcome.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&outcome.reset_epoch.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}

/// Security headers on every response.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}
