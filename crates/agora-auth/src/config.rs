//! Authentication and rate-limit configuration

use serde::{Deserialize, Serialize};

/// Request categories with independent token buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    Discovery,
    Read,
    Write,
    JobLifecycle,
    Registration,
    UnauthGeneric,
}

impl RateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateCategory::Discovery => "discovery",
            RateCategory::Read => "read",
            RateCategory::Write => "write",
            RateCategory::JobLifecycle => "job-lifecycle",
            RateCategory::Registration => "registration",
            RateCategory::UnauthGeneric => "unauth-generic",
        }
    }

    /// Whether a denied KV lookup may fail open for this category. Only
    /// idempotent reads degrade gracefully; state-changing calls fail closed.
    pub fn is_idempotent_read(&self) -> bool {
        matches!(self, RateCategory::Discovery | RateCategory::Read | RateCategory::UnauthGeneric)
    }
}

/// (capacity, refill per minute) for one bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketParams {
    pub capacity: u32,
    pub refill_per_minute: u32,
}

/// Per-category bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub discovery: BucketParams,
    pub read: BucketParams,
    pub write: BucketParams,
    pub job_lifecycle: BucketParams,
    pub registration: BucketParams,
    pub unauth_generic: BucketParams,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            discovery: BucketParams { capacity: 60, refill_per_minute: 20 },
            read: BucketParams { capacity: 120, refill_per_minute: 60 },
            write: BucketParams { capacity: 30, refill_per_minute: 10 },
            job_lifecycle: BucketParams { capacity: 20, refill_per_minute: 5 },
            registration: BucketParams { capacity: 5, refill_per_minute: 2 },
            unauth_generic: BucketParams { capacity: 60, refill_per_minute: 30 },
        }
    }
}

impl RateLimitConfig {
    pub fn params(&self, category: RateCategory) -> BucketParams {
        match category {
            RateCategory::Discovery => self.discovery,
            RateCategory::Read => self.read,
            RateCategory::Write => self.write,
            RateCategory::JobLifecycle => self.job_lifecycle,
            RateCategory::Registration => self.registration,
            RateCategory::UnauthGeneric => self.unauth_generic,
        }
    }
}

/// Signature authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Maximum clock skew accepted on X-Timestamp, in seconds.
    #[serde(default = "default_signature_max_age")]
    pub signature_max_age_secs: i64,
    /// Rate limiting parameters.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signature_max_age_secs: default_signature_max_age(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_signature_max_age() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_published_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.params(RateCategory::Discovery).capacity, 60);
        assert_eq!(config.params(RateCategory::Read).refill_per_minute, 60);
        assert_eq!(config.params(RateCategory::Write).capacity, 30);
        assert_eq!(config.params(RateCategory::JobLifecycle).refill_per_minute, 5);
        assert_eq!(config.params(RateCategory::Registration).capacity, 5);
    }

    #[test]
    fn fail_open_only_for_reads() {
        assert!(RateCategory::Read.is_idempotent_read());
        assert!(RateCategory::Discovery.is_idempotent_read());
        assert!(!RateCategory::Write.is_idempotent_read());
        assert!(!RateCategory::JobLifecycle.is_idempotent_read());
        assert!(!RateCategory::Registration.is_idempotent_read());
    }
}
