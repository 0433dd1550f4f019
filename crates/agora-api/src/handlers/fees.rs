//! Fee schedule handler

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::state::AppState;

/// The current fee schedule. Agents should query this during negotiation
/// and price fees into their terms.
pub async fn fee_schedule(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.fees.schedule())
}
