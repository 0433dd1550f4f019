//! Listing repository

use rust_decimal::Decimal;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::{DbDiscoveredListing, DbError, DbListing, DbResult};

/// Pre-sort filters for discovery queries.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub skill_id: Option<String>,
    pub min_rating: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub price_model: Option<String>,
    pub limit: i64,
}

pub struct ListingRepo {
    pool: PgPool,
}

impl ListingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, listing: &DbListing) -> DbResult<DbListing> {
        let created = sqlx::query_as::<_, DbListing>(
            r#"
            INSERT INTO listings
                (listing_id, seller_agent_id, skill_id, description, price_model,
                 base_price, currency, sla, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(listing.listing_id)
        .bind(listing.seller_agent_id)
        .bind(&listing.skill_id)
        .bind(&listing.description)
        .bind(&listing.price_model)
        .bind(listing.base_price)
        .bind(&listing.currency)
        .bind(&listing.sla)
        .bind(&listing.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Duplicate(
                "an active listing for this skill already exists".into(),
            ),
            _ => DbError::from(e),
        })?;
        Ok(created)
    }

    pub async fn find_by_id(&self, listing_id: Uuid) -> DbResult<Option<DbListing>> {
        let listing =
            sqlx::query_as::<_, DbListing>("SELECT * FROM listings WHERE listing_id = $1")
                .bind(listing_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(listing)
    }

    pub async fn list_by_seller(&self, seller_agent_id: Uuid) -> DbResult<Vec<DbListing>> {
        let listings = sqlx::query_as::<_, DbListing>(
            "SELECT * FROM listings WHERE seller_agent_id = $1 ORDER BY created_at DESC",
        )
        .bind(seller_agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(listings)
    }

    pub async fn update(
        &self,
        listing_id: Uuid,
        description: &str,
        base_price: Decimal,
        price_model: &str,
        sla: Option<&serde_json::Value>,
    ) -> DbResult<DbListing> {
        let listing = sqlx::query_as::<_, DbListing>(
            r#"
            UPDATE listings
            SET description = $2, base_price = $3, price_model = $4, sla = $5
            WHERE listing_id = $1
            RETURNING *
            "#,
        )
        .bind(listing_id)
        .bind(description)
        .bind(base_price)
        .bind(price_model)
        .bind(sla)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("listing not found".into()))?;
        Ok(listing)
    }

    pub async fn set_status(&self, listing_id: Uuid, status: &str) -> DbResult<DbListing> {
        let listing = sqlx::query_as::<_, DbListing>(
            "UPDATE listings SET status = $2 WHERE listing_id = $1 RETURNING *",
        )
        .bind(listing_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Duplicate(
                "an active listing for this skill already exists".into(),
            ),
            _ => DbError::from(e),
        })?
        .ok_or_else(|| DbError::NotFound("listing not found".into()))?;
        Ok(listing)
    }

    /// Fetch active listings matching the filter, joined with seller
    /// reputation. The deterministic ranking happens in the service layer.
    pub async fn discover(&self, filter: &DiscoveryFilter) -> DbResult<Vec<DbDiscoveredListing>> {
        let mut qb = QueryBuilder::new(
            r#"
            SELECT l.listing_id, l.seller_agent_id, l.skill_id, l.description, l.price_model,
                   l.base_price, l.currency, l.sla, l.status, l.created_at,
                   a.reputation_as_seller AS seller_reputation,
                   a.rating_count_as_seller AS seller_rating_count
            FROM listings l
            JOIN agents a ON a.agent_id = l.seller_agent_id
            WHERE l.status = 'active' AND a.status = 'active'
            "#,
        );

        if let Some(skill) = &filter.skill_id {
            qb.push(" AND l.skill_id = ").push_bind(skill.clone());
        }
        if let Some(min_rating) = filter.min_rating {
            qb.push(" AND a.reputation_as_seller >= ").push_bind(min_rating);
        }
        if let Some(max_price) = filter.max_price {
            qb.push(" AND l.base_price <= ").push_bind(max_price);
        }
        if let Some(model) = &filter.price_model {
            qb.push(" AND l.price_model = ").push_bind(model.clone());
        }
        qb.push(" LIMIT ").push_bind(filter.limit.max(1));

        let listings = qb
            .build_query_as::<DbDiscoveredListing>()
            .fetch_all(&self.pool)
            .await?;
        Ok(listings)
    }
}
