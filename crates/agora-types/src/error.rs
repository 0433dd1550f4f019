//! Common error taxonomy
//!
//! Every fallible operation in the marketplace core maps to one of these
//! kinds. The API layer translates kinds to HTTP status codes; workers decide
//! retry policy from them. Reason codes are stable machine-readable strings.

use thiserror::Error;

/// Marketplace error, carrying the kind and a human-readable detail.
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Semantically invalid input (bounds, grammar, impossible values).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Schema-level input rejection (bad shape, unparseable document).
    #[error("unprocessable input: {0}")]
    Schema(String),

    /// Any authentication failure. Detail is logged, never surfaced, so the
    /// response cannot be used as an oracle.
    #[error("authentication failed")]
    Authentication,

    /// Authenticated but not allowed to perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid state transition, duplicate funding, lost race.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request body exceeds {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    /// A collaborator (DB, KV, chain, sandbox, outbound HTTP) failed.
    #[error("dependency failure: {0}")]
    Dependency(String),
}

/// Coarse classification used for status mapping and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Schema,
    Authentication,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    PayloadTooLarge,
    Dependency,
}

impl AgoraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgoraError::Validation(_) => ErrorKind::Validation,
            AgoraError::Schema(_) => ErrorKind::Schema,
            AgoraError::Authentication => ErrorKind::Authentication,
            AgoraError::Forbidden(_) => ErrorKind::Forbidden,
            AgoraError::NotFound(_) => ErrorKind::NotFound,
            AgoraError::Conflict(_) => ErrorKind::Conflict,
            AgoraError::RateLimited { .. } => ErrorKind::RateLimited,
            AgoraError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            AgoraError::Dependency(_) => ErrorKind::Dependency,
        }
    }

    /// Stable reason code for error responses.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "invalid_input",
            ErrorKind::Schema => "schema_violation",
            ErrorKind::Authentication => "authentication_failed",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "state_conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Dependency => "dependency_failure",
        }
    }

    /// Whether a background worker may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Dependency)
    }
}

pub type AgoraResult<T> = Result<T, AgoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AgoraError::Authentication.code(), "authentication_failed");
        assert_eq!(
            AgoraError::Conflict("already funded".into()).code(),
            "state_conflict"
        );
        assert_eq!(
            AgoraError::RateLimited { retry_after_secs: 3 }.code(),
            "rate_limited"
        );
    }

    #[test]
    fn only_dependency_failures_retry() {
        assert!(AgoraError::Dependency("kv down".into()).is_retryable());
        assert!(!AgoraError::Validation("bad tag".into()).is_retryable());
        assert!(!AgoraError::Conflict("race".into()).is_retryable());
    }

    #[test]
    fn auth_error_is_uniform() {
        // The Display form must not leak why authentication failed.
        assert_eq!(AgoraError::Authentication.to_string(), "authentication failed");
    }
}
