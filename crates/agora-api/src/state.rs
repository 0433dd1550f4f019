//! Application state shared across handlers

use std::sync::Arc;

use agora_auth::{AuthService, RateLimiter};
use agora_db::Database;
use agora_market::{AgentService, FeeEngine, JobService, ListingService, ReviewService};
use agora_workers::WalletService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub limiter: RateLimiter,
    pub agents: AgentService,
    pub listings: ListingService,
    pub jobs: JobService,
    pub reviews: ReviewService,
    pub wallet: WalletService,
    pub fees: FeeEngine,
    /// Universal request-body cap in bytes.
    pub max_body_bytes: usize,
}
