//! API error handling
//!
//! Translates the shared error taxonomy into HTTP responses with stable
//! reason codes. Authentication failures collapse into one uniform body so
//! responses cannot reveal which check failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use agora_auth::AuthError;
use agora_types::{AgoraError, ErrorKind};

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// API-layer error: the shared taxonomy plus response metadata.
#[derive(Debug)]
pub struct ApiError(pub AgoraError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Schema => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Authentication | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgoraError> for ApiError {
    fn from(e: AgoraError) -> Self {
        ApiError(e)
    }
}

impl From<agora_db::DbError> for ApiError {
    fn from(e: agora_db::DbError) -> Self {
        ApiError(e.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::RateLimited { retry_after_secs } => {
                ApiError(AgoraError::RateLimited { retry_after_secs })
            }
            AuthError::Dependency(msg) => ApiError(AgoraError::Dependency(msg)),
            // Every other authentication failure is deliberately uniform.
            other => {
                tracing::debug!(reason = %other, "authentication rejected");
                ApiError(AgoraError::Authentication)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.0.code().to_string(),
            message: match self.0.kind() {
                // Internal detail stays in the logs.
                ErrorKind::Dependency => {
                    tracing::error!(error = %self.0, "dependency failure");
                    "internal error".to_string()
                }
                _ => self.0.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let AgoraError::RateLimited { retry_after_secs } = &self.0 {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError(AgoraError::Validation("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(AgoraError::Schema("x".into())).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError(AgoraError::Authentication).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError(AgoraError::Conflict("x".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(AgoraError::RateLimited { retry_after_secs: 1 }).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError(AgoraError::PayloadTooLarge { max_bytes: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn auth_failures_are_uniform() {
        for err in [
            AuthError::MalformedHeader,
            AuthError::StaleTimestamp,
            AuthError::DuplicateNonce,
            AuthError::UnknownAgent,
            AuthError::BadSignature,
        ] {
            let api: ApiError = err.into();
            assert_eq!(api.status_code(), StatusCode::FORBIDDEN);
            assert_eq!(api.0.code(), "authentication_failed");
            assert_eq!(api.0.to_string(), "authentication failed");
        }
    }
}
