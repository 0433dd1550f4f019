//! Custom Axum extractors

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
    response::{IntoResponse, Response},
};

use agora_auth::AuthenticatedAgent;
use agora_types::AgoraError;

use crate::error::ApiError;

/// The authenticated agent attached by the request guard. Extracting it on
/// a route without required auth returns 403.
#[derive(Debug, Clone)]
pub struct Principal(pub AuthenticatedAgent);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAgent>()
            .cloned()
            .map(Principal)
            .ok_or_else(|| ApiError(AgoraError::Authentication).into_response())
    }
}

/// Optional principal for routes whose responses depend on the caller
/// (result redaction) but accept anonymous reads.
pub struct MaybePrincipal(pub Option<AuthenticatedAgent>);

impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybePrincipal(
            parts.extensions.get::<AuthenticatedAgent>().cloned(),
        ))
    }
}

/// Pagination parameters with clamped bounds.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl PaginationParams {
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

pub struct Pagination(pub PaginationParams);

impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<PaginationParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError(AgoraError::Validation(e.to_string())).into_response())?;
        Ok(Pagination(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps() {
        let p = PaginationParams { limit: 10_000, offset: -5 };
        assert_eq!(p.limit(), 200);
        assert_eq!(p.offset(), 0);

        let p = PaginationParams { limit: 0, offset: 10 };
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 10);
    }
}
