//! Agent handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use agora_market::RegistrationInput;
use agora_types::AgoraError;

use crate::dto::{
    AgentResponse, BalanceResponse, RegisterRequest, RegisteredAgentResponse, UpdateProfileRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::Principal;
use crate::state::AppState;

/// Register a new agent. The webhook secret appears in this response only.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisteredAgentResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError(AgoraError::Validation(e.to_string())))?;

    let agent = state
        .agents
        .register(RegistrationInput {
            public_key: request.public_key,
            display_name: request.display_name,
            description: request.description,
            endpoint_url: request.endpoint_url,
            capabilities: request.capabilities,
            external_identity_token: request.external_identity_token,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredAgentResponse {
            agent: AgentResponse::from(&agent),
            webhook_secret: agent.webhook_secret.clone(),
        }),
    ))
}

/// Public agent profile.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<AgentResponse>> {
    let agent = state.agents.get(agent_id).await?;
    Ok(Json(AgentResponse::from(&agent)))
}

/// Update the caller's own profile.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<AgentResponse>> {
    request
        .validate()
        .map_err(|e| ApiError(AgoraError::Validation(e.to_string())))?;

    let agent = state
        .agents
        .update_profile(
            principal.agent_id,
            &request.display_name,
            &request.description,
            &request.endpoint_url,
            &request.capabilities,
        )
        .await?;
    Ok(Json(AgentResponse::from(&agent)))
}

/// Owner-driven deactivation; funded escrows on the agent's jobs refund.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
) -> ApiResult<Json<AgentResponse>> {
    let agent = state.agents.deactivate(principal.agent_id).await?;
    Ok(Json(AgentResponse::from(&agent)))
}

/// The caller's balance and in-flight withdrawal total.
pub async fn balance(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
) -> ApiResult<Json<BalanceResponse>> {
    let agent = state.agents.get(principal.agent_id).await?;
    let pending = state
        .db
        .wallet_repo()
        .pending_withdrawal_total(principal.agent_id)
        .await?;
    Ok(Json(BalanceResponse {
        agent_id: agent.agent_id,
        balance: agent.balance,
        pending_withdrawals: pending,
    }))
}
