//! Webhook delivery repository
//!
//! The dispatcher claims due rows with an update-returning query guarded by
//! SKIP LOCKED, so exactly one worker owns a delivery attempt.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbResult, DbWebhookDelivery};

pub struct WebhookRepo {
    pool: PgPool,
}

impl WebhookRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an outbound event before any delivery attempt.
    pub async fn create(
        &self,
        target_agent_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> DbResult<DbWebhookDelivery> {
        let delivery = sqlx::query_as::<_, DbWebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (delivery_id, target_agent_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(target_agent_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(delivery)
    }

    /// Claim up to `batch` deliveries that are due.
    pub async fn claim_due(&self, batch: i64) -> DbResult<Vec<DbWebhookDelivery>> {
        let claimed = sqlx::query_as::<_, DbWebhookDelivery>(
            r#"
            UPDATE webhook_deliveries
            SET attempts = attempts + 1
            WHERE delivery_id IN (
                SELECT delivery_id FROM webhook_deliveries
                WHERE status = 'pending' AND next_attempt_at <= now()
                ORDER BY next_attempt_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(batch)
        .fetch_all(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn mark_delivered(&self, delivery_id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE webhook_deliveries SET status = 'delivered' WHERE delivery_id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt: either reschedule or dead-letter.
    pub async fn record_failure(
        &self,
        delivery_id: Uuid,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        match next_attempt_at {
            Some(when) => {
                sqlx::query(
                    r#"
                    UPDATE webhook_deliveries
                    SET last_error = $2, next_attempt_at = $3
                    WHERE delivery_id = $1
                    "#,
                )
                .bind(delivery_id)
                .bind(error)
                .bind(when)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE webhook_deliveries SET status = 'failed', last_error = $2 WHERE delivery_id = $1",
                )
                .bind(delivery_id)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn list_for_agent(
        &self,
        target_agent_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<DbWebhookDelivery>> {
        let rows = sqlx::query_as::<_, DbWebhookDelivery>(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE target_agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(target_agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Dead-lettered deliveries, kept inspectable.
    pub async fn list_failed(&self, limit: i64) -> DbResult<Vec<DbWebhookDelivery>> {
        let rows = sqlx::query_as::<_, DbWebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE status = 'failed' ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
