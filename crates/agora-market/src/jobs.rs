//! Job lifecycle and bounded negotiation
//!
//! States: proposed, negotiating, agreed, funded, in_progress, delivered,
//! verifying, and the terminal completed / failed / disputed / resolved /
//! cancelled. The transition table in `can_transition` is exhaustive; party
//! gating lives in each operation.
//!
//! Negotiation is bounded by `max_rounds` (1..=20). Rounds alternate: only
//! the party that did not author the previous round may counter, and only
//! that party may accept the terms on the table. Acceptance criteria are
//! fixed at proposal time and attested by hash; a seller accepting must
//! present the exact hash of the locked criteria.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use agora_crypto::criteria_hash;
use agora_db::{Database, DbJob};
use agora_types::{
    events, is_valid_amount, AgentStatus, AgoraError, AgoraResult, JobStatus, RefundCause,
};
use agora_verify::{CriteriaRunner, SuiteReport, VerificationContext};

use crate::escrow::EscrowEngine;

/// Whether the state machine permits `from -> to`. Exhaustive: anything not
/// listed is rejected, and terminal states have no outgoing edges except
/// the dispute of a failed job, which is handled by `dispute` itself.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Proposed, Negotiating)
            | (Proposed, Agreed)
            | (Proposed, Cancelled)
            | (Negotiating, Agreed)
            | (Negotiating, Cancelled)
            | (Agreed, Funded)
            | (Agreed, Cancelled)
            | (Funded, InProgress)
            | (InProgress, Delivered)
            | (InProgress, Failed)
            | (Delivered, Verifying)
            | (Delivered, Failed)
            | (Verifying, Completed)
            | (Verifying, Failed)
    )
}

/// One appended negotiation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationRound {
    pub round: i32,
    pub proposer: Uuid,
    pub proposed_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_terms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_terms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalInput {
    pub seller_agent_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub acceptance_criteria: Value,
    pub requirements: Option<String>,
    pub max_budget: Decimal,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub max_rounds: Option<i32>,
    pub a2a_task_id: Option<String>,
    pub a2a_context_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterInput {
    pub proposed_price: Decimal,
    pub counter_terms: Option<Value>,
    pub accepted_terms: Option<Value>,
    pub message: Option<String>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub requirements: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AcceptInput {
    pub acceptance_criteria_hash: Option<String>,
}

#[derive(Clone)]
pub struct JobService {
    db: Arc<Database>,
    escrow: EscrowEngine,
    runner: Arc<CriteriaRunner>,
}

impl JobService {
    pub fn new(db: Arc<Database>, escrow: EscrowEngine, runner: Arc<CriteriaRunner>) -> Self {
        Self { db, escrow, runner }
    }

    pub fn escrow_engine(&self) -> &EscrowEngine {
        &self.escrow
    }

    // =========================================================================
    // Negotiation
    // =========================================================================

    /// Client proposes a job to a seller.
    pub async fn propose(&self, client_agent_id: Uuid, input: ProposalInput) -> AgoraResult<DbJob> {
        if client_agent_id == input.seller_agent_id {
            return Err(AgoraError::Validation("cannot propose a job to yourself".into()));
        }
        if !is_valid_amount(input.max_budget) {
            return Err(AgoraError::Validation("max_budget out of range".into()));
        }
        let max_rounds = input.max_rounds.unwrap_or(5);
        if !(1..=20).contains(&max_rounds) {
            return Err(AgoraError::Validation("max_rounds must be within 1..=20".into()));
        }
        if let Some(deadline) = input.delivery_deadline {
            if deadline <= Utc::now() {
                return Err(AgoraError::Validation("delivery_deadline must be in the future".into()));
            }
        }

        for agent_id in [client_agent_id, input.seller_agent_id] {
            let agent = self
                .db
                .agent_repo()
                .find_by_id(agent_id)
                .await?
                .ok_or_else(|| AgoraError::NotFound(format!("agent {} not found", agent_id)))?;
            if agent.status != AgentStatus::Active.as_str() {
                return Err(AgoraError::Conflict(format!("agent {} is not active", agent_id)));
            }
        }

        // Criteria are locked from this moment; validate the document and
        // compute the hash the seller will attest to.
        self.runner.validate(&input.acceptance_criteria)?;
        let hash = criteria_hash(&input.acceptance_criteria);

        let now = Utc::now();
        let initial_round = NegotiationRound {
            round: 0,
            proposer: client_agent_id,
            proposed_price: input.max_budget.to_string(),
            counter_terms: None,
            accepted_terms: None,
            message: None,
            timestamp: now,
        };

        let job = self
            .db
            .job_repo()
            .create(&DbJob {
                job_id: Uuid::new_v4(),
                client_agent_id,
                seller_agent_id: input.seller_agent_id,
                listing_id: input.listing_id,
                status: JobStatus::Proposed.as_str().to_string(),
                acceptance_criteria: Some(input.acceptance_criteria),
                acceptance_criteria_hash: Some(hash),
                requirements: input.requirements,
                agreed_price: Some(input.max_budget),
                delivery_deadline: input.delivery_deadline,
                negotiation_log: json!([initial_round]),
                max_rounds,
                current_round: 0,
                result: None,
                a2a_task_id: input.a2a_task_id,
                a2a_context_id: input.a2a_context_id,
                started_at: None,
                delivered_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.notify_parties(&job, events::JOB_PROPOSED, json!({})).await;
        info!(job_id = %job.job_id, "job proposed");
        Ok(job)
    }

    /// Counter the current terms. Only the party that did not author the
    /// previous round may counter; exceeding max_rounds cancels the job.
    pub async fn counter(
        &self,
        job_id: Uuid,
        agent_id: Uuid,
        input: CounterInput,
    ) -> AgoraResult<DbJob> {
        if !is_valid_amount(input.proposed_price) {
            return Err(AgoraError::Validation("proposed_price out of range".into()));
        }

        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        self.assert_party(&job, agent_id)?;

        let status = job_status(&job)?;
        if !matches!(status, JobStatus::Proposed | JobStatus::Negotiating) {
            return Err(AgoraError::Conflict(format!("cannot counter in status {}", status)));
        }

        // Alternation: the previous round's proposer must sit this one out.
        if last_proposer(&job) == Some(agent_id) {
            return Err(AgoraError::Forbidden(
                "the party that sent the previous round cannot counter it".into(),
            ));
        }

        if job.current_round >= job.max_rounds {
            self.db
                .job_repo()
                .set_status(&mut tx, job_id, JobStatus::Cancelled.as_str())
                .await?;
            tx.commit().await.map_err(dep)?;
            let cancelled = self.db.job_repo().find_by_id(job_id).await?;
            if let Some(job) = cancelled {
                self.notify_parties(&job, events::JOB_CANCELLED, json!({"reason": "max_rounds"}))
                    .await;
            }
            return Err(AgoraError::Conflict(
                "maximum negotiation rounds exceeded, job cancelled".into(),
            ));
        }

        let round = NegotiationRound {
            round: job.current_round + 1,
            proposer: agent_id,
            proposed_price: input.proposed_price.to_string(),
            counter_terms: input.counter_terms,
            accepted_terms: input.accepted_terms,
            message: input.message,
            timestamp: Utc::now(),
        };
        let log = append_round(&job.negotiation_log, serde_json::to_value(&round).map_err(schema)?);

        let job = self
            .db
            .job_repo()
            .update_negotiation(
                &mut tx,
                job_id,
                JobStatus::Negotiating.as_str(),
                Some(input.proposed_price),
                input.delivery_deadline.or(job.delivery_deadline),
                input.requirements.as_deref().or(job.requirements.as_deref()),
                job.current_round + 1,
                &log,
            )
            .await?;
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_COUNTERED, json!({"round": job.current_round}))
            .await;
        Ok(job)
    }

    /// Accept the terms on the table. The accepting party must be the one
    /// that did not author the previous round; a seller must present the
    /// exact hash of the locked acceptance criteria.
    pub async fn accept(
        &self,
        job_id: Uuid,
        agent_id: Uuid,
        input: AcceptInput,
    ) -> AgoraResult<DbJob> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        self.assert_party(&job, agent_id)?;

        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::Agreed) {
            return Err(AgoraError::Conflict(format!("cannot accept in status {}", status)));
        }

        if last_proposer(&job) == Some(agent_id) {
            return Err(AgoraError::Forbidden(
                "the proposing party cannot accept its own terms".into(),
            ));
        }

        if agent_id == job.seller_agent_id {
            if job.acceptance_criteria.is_some() {
                let provided = input
                    .acceptance_criteria_hash
                    .as_deref()
                    .ok_or_else(|| {
                        AgoraError::Schema(
                            "seller must present acceptance_criteria_hash to accept".into(),
                        )
                    })?;
                if Some(provided) != job.acceptance_criteria_hash.as_deref() {
                    return Err(AgoraError::Conflict(
                        "acceptance_criteria_hash mismatch".into(),
                    ));
                }
            }
        }

        let entry = json!({
            "action": "accepted",
            "by": agent_id,
            "agreed_price": job.agreed_price.map(|p| p.to_string()),
            "acceptance_criteria_hash": job.acceptance_criteria_hash,
            "timestamp": Utc::now(),
        });
        let log = append_round(&job.negotiation_log, entry);

        let job = self
            .db
            .job_repo()
            .update_negotiation(
                &mut tx,
                job_id,
                JobStatus::Agreed.as_str(),
                job.agreed_price,
                job.delivery_deadline,
                job.requirements.as_deref(),
                job.current_round,
                &log,
            )
            .await?;
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_ACCEPTED, json!({})).await;
        Ok(job)
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Client funds the escrow. On success the delivery deadline, if any,
    /// enters the schedule.
    pub async fn fund(&self, job_id: Uuid, client_agent_id: Uuid) -> AgoraResult<DbJob> {
        self.escrow.fund(job_id, client_agent_id).await?;

        let job = self.require_job(job_id).await?;
        if let Some(deadline) = job.delivery_deadline {
            if let Err(e) = self
                .db
                .cache()
                .deadline_enqueue(&job.job_id.to_string(), deadline.timestamp() as f64)
                .await
            {
                // Boot recovery re-enqueues from the database, so a missed
                // enqueue degrades to a restart-latency delay, not a lost
                // deadline.
                warn!(job_id = %job_id, error = %e, "failed to enqueue deadline");
            }
        }

        self.notify_parties(&job, events::JOB_FUNDED, json!({})).await;
        Ok(job)
    }

    /// Seller starts work.
    pub async fn start(&self, job_id: Uuid, seller_agent_id: Uuid) -> AgoraResult<DbJob> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        if job.seller_agent_id != seller_agent_id {
            return Err(AgoraError::Forbidden("only the seller can start the job".into()));
        }
        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::InProgress) {
            return Err(AgoraError::Conflict(format!("cannot start in status {}", status)));
        }
        let job = self.db.job_repo().mark_started(&mut tx, job_id).await?;
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_STARTED, json!({})).await;
        Ok(job)
    }

    /// Seller submits the deliverable. The storage fee is charged in the
    /// same transaction that records the result.
    pub async fn deliver(
        &self,
        job_id: Uuid,
        seller_agent_id: Uuid,
        result: Value,
    ) -> AgoraResult<DbJob> {
        let size_bytes = serde_json::to_vec(&result).map_err(schema)?.len();

        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        if job.seller_agent_id != seller_agent_id {
            return Err(AgoraError::Forbidden("only the seller can deliver".into()));
        }
        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::Delivered) {
            return Err(AgoraError::Conflict(format!("cannot deliver in status {}", status)));
        }

        let fee = self.escrow.fees().storage_fee(size_bytes);
        self.escrow
            .fees()
            .charge(&mut tx, &self.db.agent_repo(), seller_agent_id, &fee)
            .await?;

        let job = self.db.job_repo().set_result(&mut tx, job_id, &result).await?;
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_DELIVERED, json!({"storage_fee": fee.amount.to_string()}))
            .await;
        Ok(job)
    }

    /// Client triggers verification of the deliverable against the locked
    /// acceptance criteria. The verification fee is charged regardless of
    /// outcome; on pass the escrow releases, on fail it refunds.
    pub async fn verify(&self, job_id: Uuid, client_agent_id: Uuid) -> AgoraResult<(DbJob, SuiteReport)> {
        // Claim the job for verification first so concurrent verify calls
        // serialize on the transition.
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        if job.client_agent_id != client_agent_id {
            return Err(AgoraError::Forbidden("only the client can verify".into()));
        }
        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::Verifying) {
            return Err(AgoraError::Conflict(format!("cannot verify in status {}", status)));
        }
        let job = self
            .db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Verifying.as_str())
            .await?;
        tx.commit().await.map_err(dep)?;

        let criteria = job
            .acceptance_criteria
            .clone()
            .ok_or_else(|| AgoraError::Schema("job has no acceptance criteria".into()))?;
        let deliverable = job
            .result
            .clone()
            .ok_or_else(|| AgoraError::Schema("job has no deliverable".into()))?;

        let ctx = VerificationContext {
            started_at: job.started_at,
            delivered_at: job.delivered_at,
        };
        let report = self.runner.run(&criteria, &deliverable, &ctx).await;

        // Charge the verification fee whatever the outcome; running heavy
        // scripts is never free.
        let fee = self.escrow.fees().verification_fee(report.cpu_seconds);
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        if let Err(e) = self
            .escrow
            .fees()
            .charge(&mut tx, &self.db.agent_repo(), client_agent_id, &fee)
            .await
        {
            warn!(job_id = %job_id, error = %e, "verification fee not collected");
        }
        tx.commit().await.map_err(dep)?;

        let job = if report.passed {
            self.escrow.release(job_id).await?;
            let job = self.require_job(job_id).await?;
            self.notify_parties(&job, events::JOB_COMPLETED, json!({"summary": report.summary}))
                .await;
            job
        } else {
            self.escrow
                .refund(job_id, RefundCause::Failed, Some(client_agent_id))
                .await?;
            let job = self.require_job(job_id).await?;
            self.notify_parties(&job, events::JOB_FAILED, json!({"summary": report.summary}))
                .await;
            job
        };

        if let Err(e) = self.db.cache().deadline_cancel(&job_id.to_string()).await {
            warn!(job_id = %job_id, error = %e, "failed to cancel deadline");
        }

        Ok((job, report))
    }

    /// Client confirms completion. Idempotent when verification already
    /// completed the job; releases the escrow when stuck in verifying.
    pub async fn complete(&self, job_id: Uuid, client_agent_id: Uuid) -> AgoraResult<DbJob> {
        let job = self.require_job(job_id).await?;
        if job.client_agent_id != client_agent_id {
            return Err(AgoraError::Forbidden("only the client can complete".into()));
        }
        match job_status(&job)? {
            JobStatus::Completed => Ok(job),
            JobStatus::Verifying => {
                self.escrow.release(job_id).await?;
                let job = self.require_job(job_id).await?;
                self.notify_parties(&job, events::JOB_COMPLETED, json!({})).await;
                Ok(job)
            }
            status => Err(AgoraError::Conflict(format!("cannot complete in status {}", status))),
        }
    }

    /// Either party aborts an in-progress or delivered job. A funded escrow
    /// refunds to the client.
    pub async fn fail(&self, job_id: Uuid, agent_id: Uuid) -> AgoraResult<DbJob> {
        let job = self.require_job(job_id).await?;
        self.assert_party(&job, agent_id)?;
        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::Failed) {
            return Err(AgoraError::Conflict(format!("cannot fail in status {}", status)));
        }

        self.escrow
            .refund(job_id, RefundCause::Failed, Some(agent_id))
            .await?;

        if let Err(e) = self.db.cache().deadline_cancel(&job_id.to_string()).await {
            warn!(job_id = %job_id, error = %e, "failed to cancel deadline");
        }

        let job = self.require_job(job_id).await?;
        self.notify_parties(&job, events::JOB_FAILED, json!({})).await;
        Ok(job)
    }

    /// Either party cancels during negotiation (or before funding).
    pub async fn cancel(&self, job_id: Uuid, agent_id: Uuid) -> AgoraResult<DbJob> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        self.assert_party(&job, agent_id)?;
        let status = job_status(&job)?;
        if !can_transition(status, JobStatus::Cancelled) {
            return Err(AgoraError::Conflict(format!("cannot cancel in status {}", status)));
        }
        let job = self
            .db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Cancelled.as_str())
            .await?;
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_CANCELLED, json!({})).await;
        Ok(job)
    }

    /// Either party disputes a failed job. The platform preserves state and
    /// audit; it does not decide outcomes.
    pub async fn dispute(&self, job_id: Uuid, agent_id: Uuid) -> AgoraResult<DbJob> {
        let mut tx = self.db.pg.begin().await.map_err(dep)?;
        let job = self.db.job_repo().lock(&mut tx, job_id).await?;
        self.assert_party(&job, agent_id)?;
        if job_status(&job)? != JobStatus::Failed {
            return Err(AgoraError::Conflict("only failed jobs can be disputed".into()));
        }

        let job = self
            .db
            .job_repo()
            .set_status(&mut tx, job_id, JobStatus::Disputed.as_str())
            .await?;
        if let Some(escrow) = self.db.escrow_repo().find_by_job(job_id).await? {
            self.db
                .escrow_repo()
                .append_audit(
                    &mut tx,
                    escrow.escrow_id,
                    agora_types::EscrowAction::Disputed.as_str(),
                    Some(agent_id),
                    escrow.amount,
                    None,
                )
                .await?;
        }
        tx.commit().await.map_err(dep)?;

        self.notify_parties(&job, events::JOB_DISPUTED, json!({})).await;
        Ok(job)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, job_id: Uuid) -> AgoraResult<DbJob> {
        self.require_job(job_id).await
    }

    pub async fn list_for_agent(&self, agent_id: Uuid, limit: i64, offset: i64) -> AgoraResult<Vec<DbJob>> {
        Ok(self.db.job_repo().list_for_agent(agent_id, limit, offset).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn require_job(&self, job_id: Uuid) -> AgoraResult<DbJob> {
        self.db
            .job_repo()
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("job not found".into()))
    }

    fn assert_party(&self, job: &DbJob, agent_id: Uuid) -> AgoraResult<()> {
        if !job.is_party(agent_id) {
            return Err(AgoraError::Forbidden("not a party to this job".into()));
        }
        Ok(())
    }

    /// Enqueue a webhook delivery row for both parties. Failure to enqueue
    /// never fails the operation that triggered the event.
    async fn notify_parties(&self, job: &DbJob, event: &str, data: Value) {
        let payload = json!({
            "event": event,
            "job_id": job.job_id,
            "timestamp": Utc::now(),
            "data": {
                "status": job.status,
                "a2a_task_id": job.a2a_task_id,
                "a2a_context_id": job.a2a_context_id,
                "detail": data,
            },
        });
        for agent_id in [job.client_agent_id, job.seller_agent_id] {
            if let Err(e) = self.db.webhook_repo().create(agent_id, event, &payload).await {
                warn!(job_id = %job.job_id, event = event, error = %e, "failed to enqueue webhook");
            }
        }
    }
}

/// The result field is returned only to a party of a completed job;
/// everyone else sees null. This is what makes unpaid extraction of
/// deliverables impossible.
pub fn redacted_result(job: &DbJob, viewer: Option<Uuid>) -> Option<Value> {
    let is_party = viewer.map(|v| job.is_party(v)).unwrap_or(false);
    if is_party && job.status == JobStatus::Completed.as_str() {
        job.result.clone()
    } else {
        None
    }
}

fn job_status(job: &DbJob) -> AgoraResult<JobStatus> {
    JobStatus::from_str(&job.status)
        .map_err(|e| AgoraError::Dependency(format!("corrupt job status: {}", e)))
}

/// Proposer of the most recent negotiation round, if any.
fn last_proposer(job: &DbJob) -> Option<Uuid> {
    job.negotiation_log
        .as_array()?
        .iter()
        .rev()
        .find_map(|entry| {
            let id = entry.get("proposer").or_else(|| entry.get("by"))?;
            serde_json::from_value(id.clone()).ok()
        })
}

fn append_round(log: &Value, entry: Value) -> Value {
    let mut rounds = log.as_array().cloned().unwrap_or_default();
    rounds.push(entry);
    Value::Array(rounds)
}

fn dep(e: sqlx::Error) -> AgoraError {
    AgoraError::Dependency(e.to_string())
}

fn schema(e: serde_json::Error) -> AgoraError {
    AgoraError::Schema(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_exhaustive() {
        use JobStatus::*;
        let all = [
            Proposed, Negotiating, Agreed, Funded, InProgress, Delivered, Verifying, Completed,
            Failed, Disputed, Resolved, Cancelled,
        ];

        // Terminal states have no outgoing edges.
        for from in [Completed, Failed, Disputed, Resolved, Cancelled] {
            for to in all {
                assert!(!can_transition(from, to), "{:?} -> {:?} must be invalid", from, to);
            }
        }

        // Spot-check the valid edges.
        assert!(can_transition(Proposed, Negotiating));
        assert!(can_transition(Proposed, Agreed));
        assert!(can_transition(Negotiating, Agreed));
        assert!(can_transition(Agreed, Funded));
        assert!(can_transition(Funded, InProgress));
        assert!(can_transition(InProgress, Delivered));
        assert!(can_transition(Delivered, Verifying));
        assert!(can_transition(Verifying, Completed));
        assert!(can_transition(Verifying, Failed));

        // And some invalid ones.
        assert!(!can_transition(Proposed, Funded));
        assert!(!can_transition(Agreed, InProgress));
        assert!(!can_transition(Funded, Delivered));
        assert!(!can_transition(Delivered, Completed));
    }

    fn job_with(status: JobStatus, result: Option<Value>, client: Uuid, seller: Uuid) -> DbJob {
        let now = Utc::now();
        DbJob {
            job_id: Uuid::new_v4(),
            client_agent_id: client,
            seller_agent_id: seller,
            listing_id: None,
            status: status.as_str().to_string(),
            acceptance_criteria: None,
            acceptance_criteria_hash: None,
            requirements: None,
            agreed_price: None,
            delivery_deadline: None,
            negotiation_log: json!([]),
            max_rounds: 5,
            current_round: 0,
            result,
            a2a_task_id: None,
            a2a_context_id: None,
            started_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn result_redacted_outside_completed() {
        let client = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let result = json!({"answer": 42});

        for status in [
            JobStatus::Delivered,
            JobStatus::Verifying,
            JobStatus::Failed,
            JobStatus::Disputed,
        ] {
            let job = job_with(status, Some(result.clone()), client, seller);
            assert_eq!(redacted_result(&job, Some(client)), None);
            assert_eq!(redacted_result(&job, Some(seller)), None);
        }
    }

    #[test]
    fn result_redacted_for_non_parties() {
        let client = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let job = job_with(JobStatus::Completed, Some(json!({"x": 1})), client, seller);

        assert_eq!(redacted_result(&job, Some(client)), Some(json!({"x": 1})));
        assert_eq!(redacted_result(&job, Some(seller)), Some(json!({"x": 1})));
        assert_eq!(redacted_result(&job, Some(Uuid::new_v4())), None);
        assert_eq!(redacted_result(&job, None), None);
    }

    #[test]
    fn last_proposer_reads_latest_round() {
        let client = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let mut job = job_with(JobStatus::Negotiating, None, client, seller);

        job.negotiation_log = json!([
            {"round": 0, "proposer": client, "proposed_price": "10"},
            {"round": 1, "proposer": seller, "proposed_price": "12"},
        ]);
        assert_eq!(last_proposer(&job), Some(seller));

        job.negotiation_log = json!([{"round": 0, "proposer": client, "proposed_price": "10"}]);
        assert_eq!(last_proposer(&job), Some(client));

        job.negotiation_log = json!([]);
        assert_eq!(last_proposer(&job), None);
    }
}
