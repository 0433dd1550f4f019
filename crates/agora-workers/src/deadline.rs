//! Deadline enforcement
//!
//! A single consumer over the `deadlines:jobs` sorted set. It peeks the
//! earliest deadline and sleeps until it is due (in bounded slices, so an
//! earlier deadline enqueued meanwhile is picked up), then claims the entry
//! and fails the job if it is still in a state where the deadline matters.
//!
//! The sorted set is the schedule, not the truth: boot recovery rebuilds it
//! from the jobs table, so losing the key-value store only delays
//! enforcement until the next restart.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_market::EscrowEngine;
use agora_types::{events, AgoraResult, JobStatus, RefundCause};

use crate::ShutdownRx;

const IDLE_SLEEP: Duration = Duration::from_secs(10);
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

pub struct DeadlineWorker {
    db: Arc<Database>,
    escrow: EscrowEngine,
}

impl DeadlineWorker {
    pub fn new(db: Arc<Database>, escrow: EscrowEngine) -> Self {
        Self { db, escrow }
    }

    /// Rebuild the schedule from the database. Idempotent; run at boot.
    pub async fn recover(&self) -> AgoraResult<usize> {
        let jobs = self.db.job_repo().list_with_pending_deadlines().await?;
        let mut enqueued = 0;
        for job in &jobs {
            if let Some(deadline) = job.delivery_deadline {
                self.db
                    .cache()
                    .deadline_enqueue(&job.job_id.to_string(), deadline.timestamp() as f64)
                    .await?;
                enqueued += 1;
            }
        }
        info!(count = enqueued, "deadline schedule recovered");
        Ok(enqueued)
    }

    /// Consumer loop. Exits when the shutdown signal flips.
    pub async fn run(&self, mut shutdown: ShutdownRx) {
        info!("deadline consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.step().await {
                Ok(sleep_for) => sleep_for,
                Err(e) => {
                    error!(error = %e, "deadline consumer error, retrying in 5s");
                    Some(Duration::from_secs(5))
                }
            };

            if let Some(sleep_for) = sleep_for {
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("deadline consumer shut down");
    }

    /// One scheduling step. Returns how long to sleep before the next one,
    /// or None to continue immediately.
    async fn step(&self) -> AgoraResult<Option<Duration>> {
        let Some((member, score)) = self.db.cache().deadline_peek_min().await? else {
            return Ok(Some(IDLE_SLEEP));
        };

        let now = Utc::now().timestamp() as f64;
        if score > now {
            let until_due = Duration::from_secs_f64((score - now).min(MAX_SLEEP_SLICE.as_secs_f64()));
            return Ok(Some(until_due));
        }

        // Due. Claim it; another consumer may have beaten us to it.
        if !self.db.cache().deadline_claim(&member).await? {
            return Ok(None);
        }

        match Uuid::parse_str(&member) {
            Ok(job_id) => self.enforce(job_id).await,
            Err(_) => {
                warn!(member = %member, "malformed deadline entry dropped");
            }
        }
        Ok(None)
    }

    /// Fail one overdue job and refund its escrow.
    async fn enforce(&self, job_id: Uuid) {
        let job = match self.db.job_repo().find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "deadline fired for nonexistent job");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "deadline enforcement load failed");
                return;
            }
        };

        let status = match JobStatus::from_str(&job.status) {
            Ok(status) => status,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "corrupt job status");
                return;
            }
        };
        if !matches!(status, JobStatus::Funded | JobStatus::InProgress | JobStatus::Delivered) {
            info!(job_id = %job_id, status = %status, "deadline fired but job moved on");
            return;
        }

        match self.escrow.refund(job_id, RefundCause::Deadline, None).await {
            Ok(_) => {
                info!(job_id = %job_id, "overdue job failed and refunded");
                self.emit_failure_webhooks(&job).await;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "deadline refund failed");
            }
        }
    }

    async fn emit_failure_webhooks(&self, job: &agora_db::DbJob) {
        let payload = serde_json::json!({
            "event": events::JOB_FAILED,
            "job_id": job.job_id,
            "timestamp": Utc::now(),
            "data": {
                "status": JobStatus::Failed.as_str(),
                "cause": RefundCause::Deadline.as_str(),
                "a2a_task_id": job.a2a_task_id,
                "a2a_context_id": job.a2a_context_id,
            },
        });
        for agent_id in [job.client_agent_id, job.seller_agent_id] {
            if let Err(e) = self
                .db
                .webhook_repo()
                .create(agent_id, events::JOB_FAILED, &payload)
                .await
            {
                warn!(job_id = %job.job_id, error = %e, "failed to enqueue deadline webhook");
            }
        }
    }
}
