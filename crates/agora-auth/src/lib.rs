//! Agora authentication and rate limiting
//!
//! Authentication is per-request: every mutating call carries an Ed25519
//! signature over the canonical request digest, a fresh timestamp, and an
//! optional single-use nonce. There are no sessions or tokens to steal.
//!
//! Rate limiting is per-principal token buckets executed atomically in the
//! shared key-value store, so every instance of the process enforces one
//! global budget.

pub mod agent_sig;
pub mod config;
pub mod error;
pub mod rate_limit;

pub use agent_sig::{AuthService, AuthenticatedAgent, ParsedAuthHeader};
pub use config::{AuthConfig, RateCategory, RateLimitConfig};
pub use error::{AuthError, AuthResult};
pub use rate_limit::{RateLimiter, RateLimitOutcome};
