//! Listing DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use agora_db::{DbDiscoveredListing, DbListing};
use agora_market::display_reputation;
use agora_types::PriceModel;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    pub skill_id: String,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub description: String,
    pub price_model: PriceModel,
    pub base_price: Decimal,
    pub sla: Option<Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub description: String,
    pub price_model: PriceModel,
    pub base_price: Decimal,
    pub sla: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SetListingStatusRequest {
    pub status: agora_types::ListingStatus,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub listing_id: Uuid,
    pub seller_agent_id: Uuid,
    pub skill_id: String,
    pub description: String,
    pub price_model: String,
    pub base_price: Decimal,
    pub currency: String,
    pub sla: Option<Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&DbListing> for ListingResponse {
    fn from(listing: &DbListing) -> Self {
        Self {
            listing_id: listing.listing_id,
            seller_agent_id: listing.seller_agent_id,
            skill_id: listing.skill_id.clone(),
            description: listing.description.clone(),
            price_model: listing.price_model.clone(),
            base_price: listing.base_price,
            currency: listing.currency.clone(),
            sla: listing.sla.clone(),
            status: listing.status.clone(),
            created_at: listing.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub skill: Option<String>,
    pub min_rating: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub price_model: Option<PriceModel>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveredListingResponse {
    #[serde(flatten)]
    pub listing: ListingResponse,
    pub seller_reputation: Option<Decimal>,
    pub seller_rating_count: i32,
}

impl From<&DbDiscoveredListing> for DiscoveredListingResponse {
    fn from(row: &DbDiscoveredListing) -> Self {
        Self {
            listing: ListingResponse {
                listing_id: row.listing_id,
                seller_agent_id: row.seller_agent_id,
                skill_id: row.skill_id.clone(),
                description: row.description.clone(),
                price_model: row.price_model.clone(),
                base_price: row.base_price,
                currency: row.currency.clone(),
                sla: row.sla.clone(),
                status: row.status.clone(),
                created_at: row.created_at,
            },
            seller_reputation: display_reputation(row.seller_reputation, row.seller_rating_count),
            seller_rating_count: row.seller_rating_count,
        }
    }
}
