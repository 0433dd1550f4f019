//! Database models - mapped from PostgreSQL tables
//!
//! Status columns are stored as lowercase text; the service layer parses
//! them into the `agora-types` enums at the boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Agent
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAgent {
    pub agent_id: Uuid,
    pub public_key: String,
    pub display_name: String,
    pub description: String,
    pub endpoint_url: String,
    pub capabilities: Vec<String>,
    pub webhook_secret: String,
    pub reputation_as_seller: Decimal,
    pub rating_count_as_seller: i32,
    pub reputation_as_client: Decimal,
    pub rating_count_as_client: i32,
    pub balance: Decimal,
    pub status: String,
    pub agent_card: Option<serde_json::Value>,
    pub external_identity_id: Option<String>,
    pub external_identity_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbListing {
    pub listing_id: Uuid,
    pub seller_agent_id: Uuid,
    pub skill_id: String,
    pub description: String,
    pub price_model: String,
    pub base_price: Decimal,
    pub currency: String,
    pub sla: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A listing joined with its seller's reputation, for discovery ranking.
#[derive(Debug, Clone, FromRow)]
pub struct DbDiscoveredListing {
    pub listing_id: Uuid,
    pub seller_agent_id: Uuid,
    pub skill_id: String,
    pub description: String,
    pub price_model: String,
    pub base_price: Decimal,
    pub currency: String,
    pub sla: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub seller_reputation: Decimal,
    pub seller_rating_count: i32,
}

// ============================================================================
// Job
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbJob {
    pub job_id: Uuid,
    pub client_agent_id: Uuid,
    pub seller_agent_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub status: String,
    pub acceptance_criteria: Option<serde_json::Value>,
    pub acceptance_criteria_hash: Option<String>,
    pub requirements: Option<String>,
    pub agreed_price: Option<Decimal>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub negotiation_log: serde_json::Value,
    pub max_rounds: i32,
    pub current_round: i32,
    pub result: Option<serde_json::Value>,
    pub a2a_task_id: Option<String>,
    pub a2a_context_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbJob {
    pub fn is_party(&self, agent_id: Uuid) -> bool {
        self.client_agent_id == agent_id || self.seller_agent_id == agent_id
    }
}

// ============================================================================
// Escrow
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbEscrowAccount {
    pub escrow_id: Uuid,
    pub job_id: Uuid,
    pub client_agent_id: Uuid,
    pub seller_agent_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbEscrowAuditEntry {
    pub audit_id: Uuid,
    pub escrow_id: Uuid,
    pub action: String,
    pub actor_agent_id: Option<Uuid>,
    pub amount: Decimal,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Review
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbReview {
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

// ============================================================================
// Wallet
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbDepositAddress {
    pub deposit_address_id: Uuid,
    pub agent_id: Uuid,
    pub address: String,
    pub derivation_index: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbDepositTransaction {
    pub deposit_tx_id: Uuid,
    pub agent_id: Uuid,
    pub tx_hash: String,
    pub amount_usdc: Decimal,
    pub amount_credits: Decimal,
    pub confirmations: i32,
    pub status: String,
    pub block_number: Option<i64>,
    pub detected_at: DateTime<Utc>,
    pub credited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbWithdrawalRequest {
    pub withdrawal_id: Uuid,
    pub agent_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_payout: Decimal,
    pub destination_address: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

// ============================================================================
// Webhooks
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbWebhookDelivery {
    pub delivery_id: Uuid,
    pub target_agent_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
