//! Review repository

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbError, DbResult, DbReview};

pub struct ReviewRepo {
    pool: PgPool,
}

impl ReviewRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a review inside the caller's transaction so the reputation
    /// update commits atomically with it. The unique index on
    /// (job_id, reviewer_agent_id) rejects duplicates.
    pub async fn create(&self, conn: &mut PgConnection, review: &DbReview) -> DbResult<DbReview> {
        let created = sqlx::query_as::<_, DbReview>(
            r#"
            INSERT INTO reviews
                (review_id, job_id, reviewer_agent_id, reviewee_agent_id, role, rating, tags, comment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(review.review_id)
        .bind(review.job_id)
        .bind(review.reviewer_agent_id)
        .bind(review.reviewee_agent_id)
        .bind(&review.role)
        .bind(review.rating)
        .bind(&review.tags)
        .bind(&review.comment)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate("review already submitted for this job".into())
            }
            _ => DbError::from(e),
        })?;
        Ok(created)
    }

    pub async fn find_by_id(&self, review_id: Uuid) -> DbResult<Option<DbReview>> {
        let review = sqlx::query_as::<_, DbReview>("SELECT * FROM reviews WHERE review_id = $1")
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(review)
    }

    pub async fn list_for_agent(&self, agent_id: Uuid, limit: i64, offset: i64) -> DbResult<Vec<DbReview>> {
        let reviews = sqlx::query_as::<_, DbReview>(
            r#"
            SELECT * FROM reviews
            WHERE reviewee_agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }
}
