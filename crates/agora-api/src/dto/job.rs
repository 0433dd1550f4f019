//! Job DTOs
//!
//! `JobResponse` is always built through `for_viewer` so the result
//! redaction rule is applied in exactly one place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use agora_db::{DbEscrowAccount, DbEscrowAuditEntry, DbJob};
use agora_market::redacted_result;
use agora_verify::SuiteReport;

#[derive(Debug, Deserialize)]
pub struct ProposeJobRequest {
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

#[derive(Debug, Deserialize)]
pub struct CounterRequest {
    pub proposed_price: Decimal,
    pub counter_terms: Option<Value>,
    pub accepted_terms: Option<Value>,
    pub message: Option<String>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub requirements: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AcceptRequest {
    pub acceptance_criteria_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub client_agent_id: Uuid,
    pub seller_agent_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub status: String,
    pub acceptance_criteria: Option<Value>,
    pub acceptance_criteria_hash: Option<String>,
    pub requirements: Option<String>,
    pub agreed_price: Option<Decimal>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub negotiation_log: Value,
    pub max_rounds: i32,
    pub current_round: i32,
    /// Null in every state except completed, and for every non-party.
    pub result: Option<Value>,
    pub a2a_task_id: Option<String>,
    pub a2a_context_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResponse {
    pub fn for_viewer(job: &DbJob, viewer: Option<Uuid>) -> Self {
        Self {
            job_id: job.job_id,
            client_agent_id: job.client_agent_id,
            seller_agent_id: job.seller_agent_id,
            listing_id: job.listing_id,
            status: job.status.clone(),
            acceptance_criteria: job.acceptance_criteria.clone(),
            acceptance_criteria_hash: job.acceptance_criteria_hash.clone(),
            requirements: job.requirements.clone(),
            agreed_price: job.agreed_price,
            delivery_deadline: job.delivery_deadline,
            negotiation_log: job.negotiation_log.clone(),
            max_rounds: job.max_rounds,
            current_round: job.current_round,
            result: redacted_result(job, viewer),
            a2a_task_id: job.a2a_task_id.clone(),
            a2a_context_id: job.a2a_context_id.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub job: JobResponse,
    pub verification: SuiteReport,
}

#[derive(Debug, Serialize)]
pub struct EscrowResponse {
    pub escrow_id: Uuid,
    pub job_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub audit: Vec<AuditEntryResponse>,
}

impl EscrowResponse {
    pub fn new(escrow: &DbEscrowAccount, audit: &[DbEscrowAuditEntry]) -> Self {
        Self {
            escrow_id: escrow.escrow_id,
            job_id: escrow.job_id,
            amount: escrow.amount,
            status: escrow.status.clone(),
            funded_at: escrow.funded_at,
            released_at: escrow.released_at,
            audit: audit.iter().map(AuditEntryResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub audit_id: Uuid,
    pub action: String,
    pub actor_agent_id: Option<Uuid>,
    pub amount: Decimal,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&DbEscrowAuditEntry> for AuditEntryResponse {
    fn from(entry: &DbEscrowAuditEntry) -> Self {
        Self {
            audit_id: entry.audit_id,
            action: entry.action.clone(),
            actor_agent_id: entry.actor_agent_id,
            amount: entry.amount,
            metadata: entry.metadata.clone(),
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_response_redacts_for_non_party() {
        let now = Utc::now();
        let client = Uuid::new_v4();
        let job = DbJob {
            job_id: Uuid::new_v4(),
            client_agent_id: client,
            seller_agent_id: Uuid::new_v4(),
            listing_id: None,
            status: "completed".into(),
            acceptance_criteria: None,
            acceptance_criteria_hash: None,
            requirements: None,
            agreed_price: None,
            delivery_deadline: None,
            negotiation_log: json!([]),
            max_rounds: 5,
            current_round: 0,
            result: Some(json!({"secret": true})),
            a2a_task_id: None,
            a2a_context_id: None,
            started_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };

        assert!(JobResponse::for_viewer(&job, None).result.is_none());
        assert!(JobResponse::for_viewer(&job, Some(Uuid::new_v4())).result.is_none());
        assert!(JobResponse::for_viewer(&job, Some(client)).result.is_some());
    }
}
