//! Review handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use agora_market::ReviewInput;
use agora_types::AgoraError;

use crate::dto::{CreateReviewRequest, ReviewResponse};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{Pagination, Principal};
use crate::state::AppState;

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<ReviewResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError(AgoraError::Validation(e.to_string())))?;

    let review = state
        .reviews
        .submit(
            principal.agent_id,
            ReviewInput {
                job_id: request.job_id,
                rating: request.rating,
                tags: request.tags,
                comment: request.comment,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::from(&review))))
}

/// Reviews received by an agent, newest first.
pub async fn agent_reviews(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<Uuid>,
    Pagination(page): Pagination,
) -> ApiResult<Json<Vec<ReviewResponse>>> {
    let reviews = state
        .reviews
        .list_for_agent(agent_id, page.limit(), page.offset())
        .await?;
    Ok(Json(reviews.iter().map(ReviewResponse::from).collect()))
}
