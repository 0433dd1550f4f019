//! API routes
//!
//! Routes are grouped by guard class: each group carries its rate-limit
//! category and authentication mode. Registration is limited per client IP;
//! job lifecycle verbs draw from their own bucket.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use agora_auth::RateCategory;

use crate::handlers;
use crate::middleware::{guard, AuthMode, RouteClass};
use crate::state::AppState;

/// Create API v1 routes.
pub fn api_v1_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(registration_routes(state.clone()))
        .merge(public_read_routes(state.clone()))
        .merge(discovery_routes(state.clone()))
        .merge(authed_read_routes(state.clone()))
        .merge(write_routes(state.clone()))
        .merge(job_routes(state))
}

fn registration_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::Registration, AuthMode::Public);
    Router::new()
        .route("/agents/register", post(handlers::agents::register))
        .route_layer(from_fn_with_state((state, class), guard))
}

fn public_read_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::Read, AuthMode::Public);
    let optional = RouteClass::new(RateCategory::Read, AuthMode::Optional);
    Router::new()
        .route("/agents/{agent_id}", get(handlers::agents::get_agent))
        .route("/agents/{agent_id}/reviews", get(handlers::reviews::agent_reviews))
        .route("/listings/{listing_id}", get(handlers::listings::get_listing))
        .route("/fees", get(handlers::fees::fee_schedule))
        .route_layer(from_fn_with_state((state.clone(), class), guard))
        // Job reads authenticate when a signature is presented, so parties
        // of a completed job can see the result.
        .merge(
            Router::new()
                .route("/jobs/{job_id}", get(handlers::jobs::get_job))
                .route_layer(from_fn_with_state((state, optional), guard)),
        )
}

fn discovery_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::Discovery, AuthMode::Public);
    Router::new()
        .route("/discover", get(handlers::listings::discover))
        .route_layer(from_fn_with_state((state, class), guard))
}

fn authed_read_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::Read, AuthMode::Required);
    Router::new()
        .route("/agents/me/balance", get(handlers::agents::balance))
        .route("/listings", get(handlers::listings::my_listings))
        .route("/jobs", get(handlers::jobs::my_jobs))
        .route("/jobs/{job_id}/escrow", get(handlers::jobs::get_escrow))
        .route("/wallet/withdrawals", get(handlers::wallet::withdrawal_history))
        .route("/wallet/withdrawals/{withdrawal_id}", get(handlers::wallet::get_withdrawal))
        .route_layer(from_fn_with_state((state, class), guard))
}

fn write_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::Write, AuthMode::Required);
    Router::new()
        .route("/agents/me", put(handlers::agents::update_profile))
        .route("/agents/me/deactivate", post(handlers::agents::deactivate))
        .route("/listings", post(handlers::listings::create_listing))
        .route("/listings/{listing_id}", put(handlers::listings::update_listing))
        .route("/listings/{listing_id}/status", put(handlers::listings::set_listing_status))
        .route("/reviews", post(handlers::reviews::create_review))
        .route("/wallet/deposit/address", get(handlers::wallet::deposit_address))
        .route("/wallet/deposit/notify", post(handlers::wallet::notify_deposit))
        .route("/wallet/withdraw", post(handlers::wallet::withdraw))
        .route_layer(from_fn_with_state((state, class), guard))
}

fn job_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let class = RouteClass::new(RateCategory::JobLifecycle, AuthMode::Required);
    Router::new()
        .route("/jobs", post(handlers::jobs::propose))
        .route("/jobs/{job_id}/counter", post(handlers::jobs::counter))
        .route("/jobs/{job_id}/accept", post(handlers::jobs::accept))
        .route("/jobs/{job_id}/fund", post(handlers::jobs::fund))
        .route("/jobs/{job_id}/start", post(handlers::jobs::start))
        .route("/jobs/{job_id}/deliver", post(handlers::jobs::deliver))
        .route("/jobs/{job_id}/verify", post(handlers::jobs::verify))
        .route("/jobs/{job_id}/complete", post(handlers::jobs::complete))
        .route("/jobs/{job_id}/fail", post(handlers::jobs::fail))
        .route("/jobs/{job_id}/cancel", post(handlers::jobs::cancel))
        .route("/jobs/{job_id}/dispute", post(handlers::jobs::dispute))
        .route_layer(from_fn_with_state((state, class), guard))
}
