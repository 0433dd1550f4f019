//! Job repository
//!
//! Negotiation-log appends and status transitions run under the job row
//! lock, so concurrent lifecycle calls on one job serialize.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbError, DbJob, DbResult};

pub struct JobRepo {
    pool: PgPool,
}

impl JobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &DbJob) -> DbResult<DbJob> {
        let created = sqlx::query_as::<_, DbJob>(
            r#"
            INSERT INTO jobs
                (job_id, client_agent_id, seller_agent_id, listing_id, status,
                 acceptance_criteria, acceptance_criteria_hash, requirements, agreed_price,
                 delivery_deadline, negotiation_log, max_rounds, current_round,
                 a2a_task_id, a2a_context_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(job.job_id)
        .bind(job.client_agent_id)
        .bind(job.seller_agent_id)
        .bind(job.listing_id)
        .bind(&job.status)
        .bind(&job.acceptance_criteria)
        .bind(&job.acceptance_criteria_hash)
        .bind(&job.requirements)
        .bind(job.agreed_price)
        .bind(job.delivery_deadline)
        .bind(&job.negotiation_log)
        .bind(job.max_rounds)
        .bind(job.current_round)
        .bind(&job.a2a_task_id)
        .bind(&job.a2a_context_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn find_by_id(&self, job_id: Uuid) -> DbResult<Option<DbJob>> {
        let job = sqlx::query_as::<_, DbJob>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Acquire the job's row lock inside an open transaction.
    pub async fn lock(&self, conn: &mut PgConnection, job_id: Uuid) -> DbResult<DbJob> {
        let job = sqlx::query_as::<_, DbJob>("SELECT * FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::NotFound("job not found".into()))?;
        Ok(job)
    }

    pub async fn list_for_agent(&self, agent_id: Uuid, limit: i64, offset: i64) -> DbResult<Vec<DbJob>> {
        let jobs = sqlx::query_as::<_, DbJob>(
            r#"
            SELECT * FROM jobs
            WHERE client_agent_id = $1 OR seller_agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Update status under an already-held row lock.
    pub async fn set_status(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        status: &str,
    ) -> DbResult<DbJob> {
        let job = sqlx::query_as::<_, DbJob>(
            "UPDATE jobs SET status = $2, updated_at = now() WHERE job_id = $1 RETURNING *",
        )
        .bind(job_id)
        .bind(status)
        .fetch_one(&mut *conn)
        .await?;
        Ok(job)
    }

    /// Persist a negotiation step: status, price, round counter, and the
    /// appended log. The log column is replaced wholesale; append-only is
    /// enforced by the service layer, which only ever extends it.
    pub async fn update_negotiation(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        status: &str,
        agreed_price: Option<rust_decimal::Decimal>,
        delivery_deadline: Option<DateTime<Utc>>,
        requirements: Option<&str>,
        current_round: i32,
        negotiation_log: &serde_json::Value,
    ) -> DbResult<DbJob> {
        let job = sqlx::query_as::<_, DbJob>(
            r#"
            UPDATE jobs
            SET status = $2, agreed_price = $3, delivery_deadline = $4, requirements = $5,
                current_round = $6, negotiation_log = $7, updated_at = now()
            WHERE job_id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(agreed_price)
        .bind(delivery_deadline)
        .bind(requirements)
        .bind(current_round)
        .bind(negotiation_log)
        .fetch_one(&mut *conn)
        .await?;
        Ok(job)
    }

    pub async fn mark_started(&self, conn: &mut PgConnection, job_id: Uuid) -> DbResult<DbJob> {
        let job = sqlx::query_as::<_, DbJob>(
            r#"
            UPDATE jobs SET status = 'in_progress', started_at = now(), updated_at = now()
            WHERE job_id = $1 RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(job)
    }

    pub async fn set_result(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        result: &serde_json::Value,
    ) -> DbResult<DbJob> {
        let job = sqlx::query_as::<_, DbJob>(
            r#"
            UPDATE jobs
            SET status = 'delivered', result = $2, delivered_at = now(), updated_at = now()
            WHERE job_id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(result)
        .fetch_one(&mut *conn)
        .await?;
        Ok(job)
    }

    /// Non-terminal jobs carrying a deadline, for startup recovery.
    pub async fn list_with_pending_deadlines(&self) -> DbResult<Vec<DbJob>> {
        let jobs = sqlx::query_as::<_, DbJob>(
            r#"
            SELECT * FROM jobs
            WHERE delivery_deadline IS NOT NULL
              AND status NOT IN ('completed', 'failed', 'disputed', 'resolved', 'cancelled')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}
