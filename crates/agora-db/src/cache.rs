//! Redis coordination state
//!
//! Everything here is ephemeral and fenced by TTL or owned by a single
//! consumer loop: replay nonces, rate-limit buckets, and the job deadline
//! schedule. Durable state never lives in Redis.

use deadpool_redis::{redis::AsyncCommands, Pool as RedisPool};
use redis::Script;
use std::time::Duration;

use crate::{DbError, DbResult};

/// Cache key prefixes
pub mod keys {
    pub const RATE_LIMIT: &str = "rate:";
    pub const NONCE: &str = "nonce:";
    pub const DEADLINES: &str = "deadlines:jobs";
}

/// Default TTLs
pub mod ttl {
    use std::time::Duration;

    pub const NONCE: Duration = Duration::from_secs(60);
    /// Rate buckets idle long enough to fully refill can be dropped.
    pub const RATE_BUCKET: Duration = Duration::from_secs(600);
}

/// Outcome of one token-bucket check, surfaced as response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch: u64,
    /// Seconds until a token is available; only meaningful on deny.
    pub retry_after_secs: u64,
}

// Executed atomically in Redis: refill by elapsed time, then take one token
// or compute the retry hint. Bucket state is {tokens, ts} in a hash.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local capacity = tonumber(ARGV[1])
local refill_per_min = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local bucket = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(bucket[1])
local ts = tonumber(bucket[2])
if tokens == nil or ts == nil then
  tokens = capacity
  ts = now
end

tokens = math.min(capacity, tokens + (now - ts) * refill_per_min / 60)

local allowed = 0
local retry_after = 0
if tokens >= 1 then
  allowed = 1
  tokens = tokens - 1
else
  retry_after = math.ceil((1 - tokens) * 60 / refill_per_min)
end

redis.call('HMSET', KEYS[1], 'tokens', tokens, 'ts', now)
redis.call('EXPIRE', KEYS[1], ttl)

local reset = now + math.ceil((capacity - tokens) * 60 / refill_per_min)
return {allowed, math.floor(tokens), reset, retry_after}
"#;

pub struct CacheManager {
    pool: RedisPool,
}

impl CacheManager {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Nonces (replay protection)
    // =========================================================================

    /// Atomically claim a nonce. Returns true if the nonce was unused.
    pub async fn check_nonce(&self, agent_id: &str, nonce: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let key = format!("{}{}:{}", keys::NONCE, agent_id, nonce);

        let result: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl::NONCE.as_secs())
            .query_async(&mut *conn)
            .await
            .map_err(DbError::from)?;

        Ok(result.is_some())
    }

    // =========================================================================
    // Rate limiting
    // =========================================================================

    /// Run one token-bucket step for `principal` in `category`.
    pub async fn rate_limit_take(
        &self,
        principal: &str,
        category: &str,
        capacity: u32,
        refill_per_minute: u32,
        now_epoch: u64,
    ) -> DbResult<RateDecision> {
        let mut conn = self.pool.get().await?;
        let key = format!("{}{}:{}", keys::RATE_LIMIT, principal, category);

        let script = Script::new(TOKEN_BUCKET_SCRIPT);
        let (allowed, remaining, reset, retry_after): (i64, i64, i64, i64) = script
            .key(&key)
            .arg(capacity)
            .arg(refill_per_minute)
            .arg(now_epoch)
            .arg(ttl::RATE_BUCKET.as_secs())
            .invoke_async(&mut *conn)
            .await
            .map_err(DbError::from)?;

        Ok(RateDecision {
            allowed: allowed == 1,
            limit: capacity,
            remaining: remaining.max(0) as u32,
            reset_epoch: reset.max(0) as u64,
            retry_after_secs: retry_after.max(0) as u64,
        })
    }

    // =========================================================================
    // Deadline schedule (sorted set, score = deadline epoch)
    // =========================================================================

    /// Insert or update a job's deadline. Idempotent.
    pub async fn deadline_enqueue(&self, job_id: &str, deadline_epoch: f64) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn
            .zadd(keys::DEADLINES, job_id, deadline_epoch)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    /// Remove a job from the schedule. Idempotent.
    pub async fn deadline_cancel(&self, job_id: &str) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn
            .zrem(keys::DEADLINES, job_id)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    /// Peek the earliest scheduled deadline without removing it.
    pub async fn deadline_peek_min(&self) -> DbResult<Option<(String, f64)>> {
        let mut conn = self.pool.get().await?;
        let entries: Vec<(String, f64)> = conn
            .zrangebyscore_limit_withscores(keys::DEADLINES, "-inf", "+inf", 0, 1)
            .await
            .map_err(DbError::from)?;
        Ok(entries.into_iter().next())
    }

    /// Claim a fired deadline. Returns false if another consumer already
    /// removed it.
    pub async fn deadline_claim(&self, job_id: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn
            .zrem(keys::DEADLINES, job_id)
            .await
            .map_err(DbError::from)?;
        Ok(removed > 0)
    }

    // =========================================================================
    // Generic helpers
    // =========================================================================

    /// Set a serialized value with expiration.
    pub async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, json, ttl.as_secs())
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    /// Get a serialized value.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(key).await.map_err(DbError::from)?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
