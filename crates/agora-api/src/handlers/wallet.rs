//! Wallet handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use agora_types::AgoraError;

use crate::dto::{
    DepositAddressResponse, DepositResponse, NotifyDepositRequest, WithdrawRequest,
    WithdrawalResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{Pagination, Principal};
use crate::state::AppState;

/// The caller's unique deposit address, derived on first request.
pub async fn deposit_address(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
) -> ApiResult<Json<DepositAddressResponse>> {
    let address = state
        .wallet
        .get_or_create_deposit_address(principal.agent_id)
        .await?;
    Ok(Json(DepositAddressResponse::from(&address)))
}

/// Notify the platform of an on-chain deposit. Idempotent by tx hash.
pub async fn notify_deposit(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<NotifyDepositRequest>,
) -> ApiResult<Json<DepositResponse>> {
    if request.tx_hash.is_empty() || request.tx_hash.len() > 128 {
        return Err(ApiError(AgoraError::Validation("tx_hash is malformed".into())));
    }
    let deposit = state
        .wallet
        .notify_deposit(principal.agent_id, &request.tx_hash)
        .await?;
    Ok(Json(DepositResponse::from(&deposit)))
}

/// Request a withdrawal; the amount is debited immediately.
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<(StatusCode, Json<WithdrawalResponse>)> {
    let withdrawal = state
        .wallet
        .request_withdrawal(principal.agent_id, request.amount, &request.destination_address)
        .await?;
    Ok((StatusCode::CREATED, Json(WithdrawalResponse::from(&withdrawal))))
}

pub async fn withdrawal_history(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Pagination(page): Pagination,
) -> ApiResult<Json<Vec<WithdrawalResponse>>> {
    let withdrawals = state
        .db
        .wallet_repo()
        .list_withdrawals_by_agent(principal.agent_id, page.limit(), page.offset())
        .await?;
    Ok(Json(withdrawals.iter().map(WithdrawalResponse::from).collect()))
}

pub async fn get_withdrawal(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalResponse>> {
    let withdrawal = state
        .db
        .wallet_repo()
        .find_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ApiError(AgoraError::NotFound("withdrawal not found".into())))?;
    if withdrawal.agent_id != principal.agent_id {
        return Err(ApiError(AgoraError::Forbidden("not your withdrawal".into())));
    }
    Ok(Json(WithdrawalResponse::from(&withdrawal)))
}
