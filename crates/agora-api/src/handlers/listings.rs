//! Listing handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use agora_db::DiscoveryFilter;
use agora_market::ListingInput;
use agora_types::AgoraError;

use crate::dto::{
    CreateListingRequest, DiscoverQuery, DiscoveredListingResponse, ListingResponse,
    SetListingStatusRequest, UpdateListingRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::Principal;
use crate::state::AppState;

pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Json(request): Json<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError(AgoraError::Validation(e.to_string())))?;

    let listing = state
        .listings
        .create(
            principal.agent_id,
            ListingInput {
                skill_id: request.skill_id,
                description: request.description,
                price_model: request.price_model,
                base_price: request.base_price,
                sla: request.sla,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ListingResponse::from(&listing))))
}

pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<Uuid>,
) -> ApiResult<Json<ListingResponse>> {
    let listing = state.listings.get(listing_id).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

pub async fn my_listings(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
) -> ApiResult<Json<Vec<ListingResponse>>> {
    let listings = state.listings.list_by_seller(principal.agent_id).await?;
    Ok(Json(listings.iter().map(ListingResponse::from).collect()))
}

pub async fn update_listing(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(listing_id): Path<Uuid>,
    Json(request): Json<UpdateListingRequest>,
) -> ApiResult<Json<ListingResponse>> {
    request
        .validate()
        .map_err(|e| ApiError(AgoraError::Validation(e.to_string())))?;

    let existing = state.listings.get(listing_id).await?;
    let listing = state
        .listings
        .update(
            listing_id,
            principal.agent_id,
            ListingInput {
                skill_id: existing.skill_id,
                description: request.description,
                price_model: request.price_model,
                base_price: request.base_price,
                sla: request.sla,
            },
        )
        .await?;
    Ok(Json(ListingResponse::from(&listing)))
}

pub async fn set_listing_status(
    State(state): State<Arc<AppState>>,
    Principal(principal): Principal,
    Path(listing_id): Path<Uuid>,
    Json(request): Json<SetListingStatusRequest>,
) -> ApiResult<Json<ListingResponse>> {
    let listing = state
        .listings
        .set_status(listing_id, principal.agent_id, request.status)
        .await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// Public discovery with deterministic ranking.
pub async fn discover(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiscoverQuery>,
) -> ApiResult<Json<Vec<DiscoveredListingResponse>>> {
    let listings = state
        .listings
        .discover(DiscoveryFilter {
            skill_id: query.skill,
            min_rating: query.min_rating,
            max_price: query.max_price,
            price_model: query.price_model.map(|m| m.as_str().to_string()),
            limit: query.limit.unwrap_or(50).clamp(1, 200),
        })
        .await?;
    Ok(Json(listings.iter().map(DiscoveredListingResponse::from).collect()))
}
