//! Listing CRUD and discovery ranking

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use agora_db::{Database, DbDiscoveredListing, DbListing, DiscoveryFilter};
use agora_types::{
    is_valid_amount, validate_skill_id, validate_text, AgoraError, AgoraResult, ListingStatus,
    PriceModel, MAX_DESCRIPTION_LEN,
};

#[derive(Debug, Clone)]
pub struct ListingInput {
    pub skill_id: String,
    pub description: String,
    pub price_model: PriceModel,
    pub base_price: Decimal,
    pub sla: Option<Value>,
}

/// Deterministic discovery order: seller reputation descending, base price
/// ascending, listing id ascending as the final tie-break.
pub fn rank_listings(listings: &mut [DbDiscoveredListing]) {
    listings.sort_by(|a, b| {
        b.seller_reputation
            .cmp(&a.seller_reputation)
            .then(a.base_price.cmp(&b.base_price))
            .then(a.listing_id.cmp(&b.listing_id))
    });
}

#[derive(Clone)]
pub struct ListingService {
    db: Arc<Database>,
}

impl ListingService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, seller_agent_id: Uuid, input: ListingInput) -> AgoraResult<DbListing> {
        validate_skill_id(&input.skill_id)?;
        validate_text("description", &input.description, MAX_DESCRIPTION_LEN)?;
        if !is_valid_amount(input.base_price) {
            return Err(AgoraError::Validation("base_price out of range".into()));
        }

        let listing = self
            .db
            .listing_repo()
            .create(&DbListing {
                listing_id: Uuid::new_v4(),
                seller_agent_id,
                skill_id: input.skill_id,
                description: input.description,
                price_model: input.price_model.as_str().to_string(),
                base_price: input.base_price,
                currency: "credits".to_string(),
                sla: input.sla,
                status: ListingStatus::Active.as_str().to_string(),
                created_at: chrono::Utc::now(),
            })
            .await?;
        Ok(listing)
    }

    pub async fn get(&self, listing_id: Uuid) -> AgoraResult<DbListing> {
        self.db
            .listing_repo()
            .find_by_id(listing_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("listing not found".into()))
    }

    pub async fn list_by_seller(&self, seller_agent_id: Uuid) -> AgoraResult<Vec<DbListing>> {
        Ok(self.db.listing_repo().list_by_seller(seller_agent_id).await?)
    }

    pub async fn update(
        &self,
        listing_id: Uuid,
        seller_agent_id: Uuid,
        input: ListingInput,
    ) -> AgoraResult<DbListing> {
        validate_text("description", &input.description, MAX_DESCRIPTION_LEN)?;
        if !is_valid_amount(input.base_price) {
            return Err(AgoraError::Validation("base_price out of range".into()));
        }
        self.assert_owner(listing_id, seller_agent_id).await?;
        let listing = self
            .db
            .listing_repo()
            .update(
                listing_id,
                &input.description,
                input.base_price,
                input.price_model.as_str(),
                input.sla.as_ref(),
            )
            .await?;
        Ok(listing)
    }

    pub async fn set_status(
        &self,
        listing_id: Uuid,
        seller_agent_id: Uuid,
        status: ListingStatus,
    ) -> AgoraResult<DbListing> {
        self.assert_owner(listing_id, seller_agent_id).await?;
        Ok(self
            .db
            .listing_repo()
            .set_status(listing_id, status.as_str())
            .await?)
    }

    /// Discovery: filters applied before the deterministic ranking; only
    /// active listings from active sellers are visible.
    pub async fn discover(&self, filter: DiscoveryFilter) -> AgoraResult<Vec<DbDiscoveredListing>> {
        if let Some(skill) = &filter.skill_id {
            validate_skill_id(skill)?;
        }
        let mut listings = self.db.listing_repo().discover(&filter).await?;
        rank_listings(&mut listings);
        Ok(listings)
    }

    async fn assert_owner(&self, listing_id: Uuid, seller_agent_id: Uuid) -> AgoraResult<()> {
        let listing = self.get(listing_id).await?;
        if listing.seller_agent_id != seller_agent_id {
            return Err(AgoraError::Forbidden("not the owner of this listing".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(rep: Decimal, price: Decimal, id_byte: u8) -> DbDiscoveredListing {
        DbDiscoveredListing {
            listing_id: Uuid::from_bytes([id_byte; 16]),
            seller_agent_id: Uuid::new_v4(),
            skill_id: "translation".into(),
            description: String::new(),
            price_model: "per_call".into(),
            base_price: price,
            currency: "credits".into(),
            sla: None,
            status: "active".into(),
            created_at: chrono::Utc::now(),
            seller_reputation: rep,
            seller_rating_count: 25,
        }
    }

    #[test]
    fn ranking_prefers_reputation_then_price_then_id() {
        let mut listings = vec![
            listing(dec!(3.0), dec!(5.00), 3),
            listing(dec!(4.5), dec!(9.00), 2),
            listing(dec!(4.5), dec!(5.00), 1),
            listing(dec!(4.5), dec!(5.00), 0),
        ];
        rank_listings(&mut listings);

        // Highest reputation first; among equals, cheapest; among those,
        // lowest listing id.
        assert_eq!(listings[0].listing_id, Uuid::from_bytes([0; 16]));
        assert_eq!(listings[1].listing_id, Uuid::from_bytes([1; 16]));
        assert_eq!(listings[2].listing_id, Uuid::from_bytes([2; 16]));
        assert_eq!(listings[3].listing_id, Uuid::from_bytes([3; 16]));
    }

    #[test]
    fn ranking_is_deterministic() {
        let mut a = vec![
            listing(dec!(4.0), dec!(2.00), 9),
            listing(dec!(4.0), dec!(2.00), 4),
        ];
        let mut b = vec![
            listing(dec!(4.0), dec!(2.00), 4),
            listing(dec!(4.0), dec!(2.00), 9),
        ];
        rank_listings(&mut a);
        rank_listings(&mut b);
        assert_eq!(a[0].listing_id, b[0].listing_id);
    }
}
