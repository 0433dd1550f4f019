//! Database error types

use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
}

impl DbError {
    /// Whether the underlying sqlx error is a unique-constraint violation,
    /// which callers surface as a state conflict rather than a 5xx.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Query(sqlx::Error::Database(db)) => db.is_unique_violation(),
            DbError::Duplicate(_) => true,
            _ => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for DbError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<redis::RedisError> for DbError {
    fn from(e: redis::RedisError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<DbError> for agora_types::AgoraError {
    fn from(e: DbError) -> Self {
        use agora_types::AgoraError;
        match e {
            DbError::NotFound(msg) => AgoraError::NotFound(msg),
            DbError::Duplicate(msg) => AgoraError::Conflict(msg),
            // Insufficient balance is a state conflict the caller must
            // reconcile, not a payment-required condition.
            DbError::InsufficientBalance(msg) => AgoraError::Conflict(msg),
            DbError::InvalidInput(msg) => AgoraError::Validation(msg),
            other => AgoraError::Dependency(other.to_string()),
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
