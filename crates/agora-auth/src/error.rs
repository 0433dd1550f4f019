//! Authentication errors
//!
//! Every variant except `RateLimited` and `Dependency` surfaces to clients
//! as the same uniform 403; the variants exist for logging and tests.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("missing or malformed timestamp")]
    BadTimestamp,

    #[error("timestamp outside freshness window")]
    StaleTimestamp,

    #[error("nonce already used")]
    DuplicateNonce,

    #[error("unknown or inactive agent")]
    UnknownAgent,

    #[error("signature verification failed")]
    BadSignature,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl From<agora_db::DbError> for AuthError {
    fn from(e: agora_db::DbError) -> Self {
        AuthError::Dependency(e.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
