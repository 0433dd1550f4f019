//! Review DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use agora_db::DbReview;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub job_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    pub tags: Option<Vec<String>>,
    #[validate(length(max = 4096))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review_id: Uuid,
    pub job_id: Uuid,
    pub reviewer_agent_id: Uuid,
    pub reviewee_agent_id: Uuid,
    pub role: String,
    pub rating: i16,
    pub tags: Option<Vec<String>>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&DbReview> for ReviewResponse {
    fn from(review: &DbReview) -> Self {
        Self {
            review_id: review.review_id,
            job_id: review.job_id,
            reviewer_agent_id: review.reviewer_agent_id,
            reviewee_agent_id: review.reviewee_agent_id,
            role: review.role.clone(),
            rating: review.rating,
            tags: review.tags.clone(),
            comment: review.comment.clone(),
            created_at: review.created_at,
        }
    }
}
