//! Agent DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use agora_db::DbAgent;
use agora_market::display_reputation;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    pub public_key: String,
    #[validate(length(min = 1, max = 128))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub description: String,
    pub endpoint_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub external_identity_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 128))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub description: String,
    pub endpoint_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Public view of an agent. Reputation shows as null while the agent has
/// too few reviews in that role for a meaningful number.
#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub agent_id: Uuid,
    pub public_key: String,
    pub display_name: String,
    pub description: String,
    pub endpoint_url: String,
    pub capabilities: Vec<String>,
    pub reputation_as_seller: Option<Decimal>,
    pub reputation_as_client: Option<Decimal>,
    pub rating_count_as_seller: i32,
    pub rating_count_as_client: i32,
    pub status: String,
    pub external_identity_handle: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&DbAgent> for AgentResponse {
    fn from(agent: &DbAgent) -> Self {
        Self {
            agent_id: agent.agent_id,
            public_key: agent.public_key.clone(),
            display_name: agent.display_name.clone(),
            description: agent.description.clone(),
            endpoint_url: agent.endpoint_url.clone(),
            capabilities: agent.capabilities.clone(),
            reputation_as_seller: display_reputation(
                agent.reputation_as_seller,
                agent.rating_count_as_seller,
            ),
            reputation_as_client: display_reputation(
                agent.reputation_as_client,
                agent.rating_count_as_client,
            ),
            rating_count_as_seller: agent.rating_count_as_seller,
            rating_count_as_client: agent.rating_count_as_client,
            status: agent.status.clone(),
            external_identity_handle: agent.external_identity_handle.clone(),
            created_at: agent.created_at,
        }
    }
}

/// Returned once, at registration: includes the webhook secret the agent
/// needs to verify our deliveries.
#[derive(Debug, Serialize)]
pub struct RegisteredAgentResponse {
    #[serde(flatten)]
    pub agent: AgentResponse,
    pub webhook_secret: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub agent_id: Uuid,
    pub balance: Decimal,
    pub pending_withdrawals: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn agent(count: i32) -> DbAgent {
        DbAgent {
            agent_id: Uuid::new_v4(),
            public_key: "ab".repeat(32),
            display_name: "worker".into(),
            description: String::new(),
            endpoint_url: "https://agent.example.com".into(),
            capabilities: vec!["translation".into()],
            webhook_secret: "s".into(),
            reputation_as_seller: dec!(4.20),
            rating_count_as_seller: count,
            reputation_as_client: dec!(3.10),
            rating_count_as_client: 2,
            balance: dec!(10),
            status: "active".into(),
            agent_card: None,
            external_identity_id: None,
            external_identity_handle: None,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    #[test]
    fn new_sellers_show_no_number() {
        let resp = AgentResponse::from(&agent(5));
        assert_eq!(resp.reputation_as_seller, None);
        assert_eq!(resp.reputation_as_client, None);
    }

    #[test]
    fn established_sellers_show_the_scalar() {
        let resp = AgentResponse::from(&agent(30));
        assert_eq!(resp.reputation_as_seller, Some(dec!(4.20)));
    }

    #[test]
    fn response_never_carries_webhook_secret() {
        let json = serde_json::to_value(AgentResponse::from(&agent(1))).unwrap();
        assert!(json.get("webhook_secret").is_none());
        assert!(json.get("balance").is_none());
    }
}
