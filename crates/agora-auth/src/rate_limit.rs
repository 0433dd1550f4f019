//! Token-bucket rate limiter over the shared key-value store
//!
//! The bucket step runs as one atomic script in Redis, so concurrent
//! requests across every process instance draw from the same budget. The
//! principal is the authenticated agent id, or the client IP for
//! unauthenticated calls.

use std::sync::Arc;

use chrono::Utc;

use crate::config::{RateCategory, RateLimitConfig};
use crate::error::{AuthError, AuthResult};
use agora_db::cache::RateDecision;
use agora_db::Database;

/// Result of a limiter check. The triple is surfaced as X-RateLimit-*
/// response metadata on allow and deny alike.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch: u64,
    /// Seconds until a token is available; meaningful on deny.
    pub retry_after_secs: u64,
}

impl From<RateDecision> for RateLimitOutcome {
    fn from(d: RateDecision) -> Self {
        Self {
            allowed: d.allowed,
            limit: d.limit,
            remaining: d.remaining,
            reset_epoch: d.reset_epoch,
            retry_after_secs: d.retry_after_secs.max(1),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    db: Arc<Database>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(db: Arc<Database>, config: RateLimitConfig) -> Self {
        Self { db, config }
    }

    /// Take one token for `principal` in `category`. A denied take is an
    /// Ok outcome with `allowed == false` so callers can surface the full
    /// triple as response metadata.
    ///
    /// If the store is unreachable, idempotent read categories fail open
    /// (graceful degradation beats spurious 5xx) while write categories
    /// fail closed as a dependency error.
    pub async fn check(
        &self,
        principal: &str,
        category: RateCategory,
    ) -> AuthResult<RateLimitOutcome> {
        let params = self.config.params(category);

        if !self.config.enabled {
            return Ok(RateLimitOutcome {
                allowed: true,
                limit: params.capacity,
                remaining: params.capacity,
                reset_epoch: Utc::now().timestamp() as u64,
                retry_after_secs: 0,
            });
        }

        let decision = self
            .db
            .cache()
            .rate_limit_take(
                principal,
                category.as_str(),
                params.capacity,
                params.refill_per_minute,
                Utc::now().timestamp() as u64,
            )
            .await;

        let decision = match decision {
            Ok(d) => d,
            Err(e) if category.is_idempotent_read() => {
                tracing::warn!(error = %e, category = category.as_str(), "rate limit store unreachable, allowing read");
                return Ok(RateLimitOutcome {
                    allowed: true,
                    limit: params.capacity,
                    remaining: 0,
                    reset_epoch: Utc::now().timestamp() as u64,
                    retry_after_secs: 0,
                });
            }
            Err(e) => return Err(AuthError::Dependency(e.to_string())),
        };

        if !decision.allowed {
            tracing::debug!(
                principal = principal,
                category = category.as_str(),
                retry_after = decision.retry_after_secs,
                "rate limit exceeded"
            );
        }
        Ok(decision.into())
    }
}

/// Derive the rate-limit principal for an unauthenticated request: the
/// left-most element of the forwarded-for header if present, else the peer
/// address.
pub fn client_ip_principal(forwarded_for: Option<&str>, peer_addr: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer_addr.map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_leftmost() {
        assert_eq!(
            client_ip_principal(Some("1.2.3.4, 5.6.7.8"), Some("9.9.9.9")),
            "1.2.3.4"
        );
        assert_eq!(client_ip_principal(None, Some("9.9.9.9")), "9.9.9.9");
        assert_eq!(client_ip_principal(None, None), "unknown");
        assert_eq!(client_ip_principal(Some(""), Some("9.9.9.9")), "9.9.9.9");
    }
}
