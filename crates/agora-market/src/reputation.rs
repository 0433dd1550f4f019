//! Reputation aggregation
//!
//! One scalar per role, updated as a running mean on each review. Agents
//! with fewer than `NEW_AGENT_REVIEW_THRESHOLD` reviews in a role display
//! as "new" instead of a number.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use agora_db::{Database, DbReview};
use agora_types::{
    round_credits, validate_text, AgoraError, AgoraResult, JobStatus, ReviewRole, MAX_COMMENT_LEN,
};

pub const NEW_AGENT_REVIEW_THRESHOLD: i32 = 20;

/// Running-mean update: `(avg * n + rating) / (n + 1)`, rounded to two
/// decimals. Monotone-updatable: feeding reviews in any order through this
/// keeps the stored scalar within [0, 5].
pub fn updated_average(current_avg: Decimal, current_count: i32, new_rating: i32) -> (Decimal, i32) {
    let n = Decimal::from(current_count);
    let next_count = current_count + 1;
    let next_avg = round_credits((current_avg * n + Decimal::from(new_rating)) / Decimal::from(next_count));
    (next_avg, next_count)
}

/// What a profile shows for one role: a number, or "new" below the
/// confidence threshold.
pub fn display_reputation(average: Decimal, count: i32) -> Option<Decimal> {
    if count < NEW_AGENT_REVIEW_THRESHOLD {
        None
    } else {
        Some(average)
    }
}

#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub job_id: Uuid,
    pub rating: i32,
    pub tags: Option<Vec<String>>,
    pub comment: Option<String>,
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<Database>,
}

impl ReviewService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Submit a review. Only a party of a terminal-success or
    /// terminal-failure job may review, once, about the other party. The
    /// review insert and the reputation update commit together.
    pub async fn submit(&self, reviewer_agent_id: Uuid, input: ReviewInput) -> AgoraResult<DbReview> {
        if !(1..=5).contains(&input.rating) {
            return Err(AgoraError::Validation("rating must be within 1..=5".into()));
        }
        if let Some(comment) = &input.comment {
            validate_text("comment", comment, MAX_COMMENT_LEN)?;
        }
        if let Some(tags) = &input.tags {
            agora_types::validate_capability_tags(tags)?;
        }

        let job = self
            .db
            .job_repo()
            .find_by_id(input.job_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("job not found".into()))?;

        if !job.is_party(reviewer_agent_id) {
            return Err(AgoraError::Forbidden("not a party to this job".into()));
        }
        let status = JobStatus::from_str(&job.status)
            .map_err(|e| AgoraError::Dependency(format!("corrupt job status: {}", e)))?;
        if !matches!(status, JobStatus::Completed | JobStatus::Failed) {
            return Err(AgoraError::Conflict(
                "reviews are accepted only for completed or failed jobs".into(),
            ));
        }

        let (reviewee, role) = if reviewer_agent_id == job.client_agent_id {
            (job.seller_agent_id, ReviewRole::ClientOfSeller)
        } else {
            (job.client_agent_id, ReviewRole::SellerOfClient)
        };

        let mut tx = self
            .db
            .pg
            .begin()
            .await
            .map_err(|e| AgoraError::Dependency(e.to_string()))?;

        let review = self
            .db
            .review_repo()
            .create(
                &mut tx,
                &DbReview {
                    review_id: Uuid::new_v4(),
                    job_id: input.job_id,
                    reviewer_agent_id,
                    reviewee_agent_id: reviewee,
                    role: role.as_str().to_string(),
                    rating: input.rating as i16,
                    tags: input.tags,
                    comment: input.comment,
                    created_at: chrono::Utc::now(),
                },
            )
            .await?;

        // Reputation update under the reviewee's row lock, in the same
        // transaction as the review row.
        let reviewee_row = self.db.agent_repo().lock(&mut tx, reviewee).await?;
        let as_seller = role == ReviewRole::ClientOfSeller;
        let (avg, count) = if as_seller {
            updated_average(
                reviewee_row.reputation_as_seller,
                reviewee_row.rating_count_as_seller,
                input.rating,
            )
        } else {
            updated_average(
                reviewee_row.reputation_as_client,
                reviewee_row.rating_count_as_client,
                input.rating,
            )
        };
        self.db
            .agent_repo()
            .update_reputation(&mut tx, reviewee, as_seller, avg, count)
            .await?;

        tx.commit()
            .await
            .map_err(|e| AgoraError::Dependency(e.to_string()))?;

        // review.created webhook to the reviewee.
        let payload = serde_json::json!({
            "event": agora_types::events::REVIEW_CREATED,
            "job_id": input.job_id,
            "timestamp": chrono::Utc::now(),
            "data": { "rating": input.rating, "role": role.as_str() },
        });
        if let Err(e) = self
            .db
            .webhook_repo()
            .create(reviewee, agora_types::events::REVIEW_CREATED, &payload)
            .await
        {
            tracing::warn!(job_id = %input.job_id, error = %e, "failed to enqueue review webhook");
        }

        Ok(review)
    }

    pub async fn list_for_agent(&self, agent_id: Uuid, limit: i64, offset: i64) -> AgoraResult<Vec<DbReview>> {
        Ok(self.db.review_repo().list_for_agent(agent_id, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn running_mean_matches_arithmetic_mean() {
        let ratings = [5, 3, 4, 4, 2, 5, 1];
        let mut avg = Decimal::ZERO;
        let mut count = 0;
        for r in ratings {
            (avg, count) = updated_average(avg, count, r);
        }
        assert_eq!(count, ratings.len() as i32);
        // Arithmetic mean of the ratings is 24/7 = 3.4285... -> 3.43
        assert_eq!(avg, dec!(3.43));
    }

    #[test]
    fn average_stays_in_range() {
        let mut avg = Decimal::ZERO;
        let mut count = 0;
        for _ in 0..100 {
            (avg, count) = updated_average(avg, count, 5);
            assert!(avg <= dec!(5.00));
            assert!(avg >= dec!(0.00));
        }
        assert_eq!(avg, dec!(5.00));
        assert_eq!(count, 100);
    }

    #[test]
    fn new_label_below_threshold() {
        assert_eq!(display_reputation(dec!(4.5), 19), None);
        assert_eq!(display_reputation(dec!(4.5), 20), Some(dec!(4.5)));
        assert_eq!(display_reputation(dec!(0), 0), None);
    }
}
