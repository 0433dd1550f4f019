//! Agent registration and profile service
//!
//! Registration validates the endpoint URL twice: statically (HTTPS, no IP
//! literal in a forbidden range) and by resolving the host and checking
//! every address it maps to. The agent card, when required, is fetched from
//! `{endpoint_url}/.well-known/agent.json` and cached verbatim.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::{Database, DbAgent};
use agora_types::{
    validate_capability_tags, validate_endpoint_url, validate_text, AgentStatus, AgoraError,
    AgoraResult, EscrowStatus, RefundCause, MAX_DESCRIPTION_LEN, MAX_DISPLAY_NAME_LEN,
};

use crate::escrow::EscrowEngine;

/// Registration behavior knobs.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Refuse registration when the agent card cannot be fetched.
    pub require_agent_card: bool,
    /// Verification endpoint for external-identity tokens; None disables.
    pub external_identity_url: Option<String>,
    /// Timeout for the agent card fetch.
    pub card_fetch_timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            require_agent_card: false,
            external_identity_url: None,
            card_fetch_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationInput {
    pub public_key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub endpoint_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub external_identity_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIdentity {
    id: String,
    #[serde(default)]
    handle: Option<String>,
}

#[derive(Clone)]
pub struct AgentService {
    db: Arc<Database>,
    escrow: EscrowEngine,
    config: RegistrationConfig,
    http: reqwest::Client,
}

impl AgentService {
    pub fn new(db: Arc<Database>, escrow: EscrowEngine, config: RegistrationConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.card_fetch_timeout)
            .build()
            .expect("reqwest client");
        Self {
            db,
            escrow,
            config,
            http,
        }
    }

    /// Register a new agent.
    pub async fn register(&self, input: RegistrationInput) -> AgoraResult<DbAgent> {
        validate_text("display_name", &input.display_name, MAX_DISPLAY_NAME_LEN)?;
        validate_text("description", &input.description, MAX_DESCRIPTION_LEN)?;
        validate_capability_tags(&input.capabilities)?;
        let url = validate_endpoint_url(&input.endpoint_url)?;
        self.assert_host_resolves_public(&url).await?;

        // The key must parse before we accept it as an identity.
        agora_crypto::PublicKey(input.public_key.clone())
            .to_verifying_key()
            .map_err(|_| AgoraError::Validation("public_key is not a valid Ed25519 key".into()))?;

        if self
            .db
            .agent_repo()
            .find_by_public_key(&input.public_key)
            .await?
            .is_some()
        {
            return Err(AgoraError::Conflict("public_key already registered".into()));
        }

        let external = match (&self.config.external_identity_url, &input.external_identity_token) {
            (Some(url), Some(token)) => Some(self.verify_external_identity(url, token).await?),
            (Some(_), None) => None,
            (None, _) => None,
        };

        let agent_card = self.fetch_agent_card(&input.endpoint_url).await?;

        let agent = self
            .db
            .agent_repo()
            .create(&DbAgent {
                agent_id: Uuid::new_v4(),
                public_key: input.public_key,
                display_name: input.display_name,
                description: input.description,
                endpoint_url: input.endpoint_url,
                capabilities: input.capabilities,
                webhook_secret: generate_webhook_secret(),
                reputation_as_seller: rust_decimal::Decimal::ZERO,
                rating_count_as_seller: 0,
                reputation_as_client: rust_decimal::Decimal::ZERO,
                rating_count_as_client: 0,
                balance: rust_decimal::Decimal::ZERO,
                status: AgentStatus::Active.as_str().to_string(),
                agent_card,
                external_identity_id: external.as_ref().map(|e| e.id.clone()),
                external_identity_handle: external.and_then(|e| e.handle),
                created_at: chrono::Utc::now(),
                last_seen_at: None,
            })
            .await?;

        info!(agent_id = %agent.agent_id, "agent registered");
        Ok(agent)
    }

    pub async fn get(&self, agent_id: Uuid) -> AgoraResult<DbAgent> {
        self.db
            .agent_repo()
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("agent not found".into()))
    }

    pub async fn update_profile(
        &self,
        agent_id: Uuid,
        display_name: &str,
        description: &str,
        endpoint_url: &str,
        capabilities: &[String],
    ) -> AgoraResult<DbAgent> {
        validate_text("display_name", display_name, MAX_DISPLAY_NAME_LEN)?;
        validate_text("description", description, MAX_DESCRIPTION_LEN)?;
        validate_capability_tags(capabilities)?;
        let url = validate_endpoint_url(endpoint_url)?;
        self.assert_host_resolves_public(&url).await?;

        Ok(self
            .db
            .agent_repo()
            .update_profile(agent_id, display_name, description, endpoint_url, capabilities)
            .await?)
    }

    /// Owner-driven deactivation. Any funded escrow on the agent's jobs
    /// refunds to the client with cause `deactivation`.
    pub async fn deactivate(&self, agent_id: Uuid) -> AgoraResult<DbAgent> {
        let agent = self
            .db
            .agent_repo()
            .set_status(agent_id, AgentStatus::Deactivated.as_str())
            .await?;

        let jobs = self.db.job_repo().list_for_agent(agent_id, 1000, 0).await?;
        for job in jobs {
            let escrow = self.db.escrow_repo().find_by_job(job.job_id).await?;
            if let Some(escrow) = escrow {
                if escrow.status == EscrowStatus::Funded.as_str() {
                    if let Err(e) = self
                        .escrow
                        .refund(job.job_id, RefundCause::Deactivation, Some(agent_id))
                        .await
                    {
                        warn!(job_id = %job.job_id, error = %e, "refund on deactivation failed");
                    }
                }
            }
        }

        Ok(agent)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Resolve the endpoint host and reject it if any address it maps to is
    /// private, loopback, link-local, or unique-local.
    async fn assert_host_resolves_public(&self, url: &url::Url) -> AgoraResult<()> {
        let Some(host) = url.host_str() else {
            return Err(AgoraError::Validation("endpoint_url must have a host".into()));
        };
        // IP literals were already checked statically.
        if url.host().map(|h| !matches!(h, url::Host::Domain(_))).unwrap_or(false) {
            return Ok(());
        }

        let port = url.port().unwrap_or(443);
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| AgoraError::Validation(format!("endpoint_url host does not resolve: {}", e)))?;

        for addr in addrs {
            if agora_types::validate::is_forbidden_ip(addr.ip()) {
                return Err(AgoraError::Validation(
                    "endpoint_url resolves to a private network".into(),
                ));
            }
        }
        Ok(())
    }

    async fn fetch_agent_card(&self, endpoint_url: &str) -> AgoraResult<Option<Value>> {
        let card_url = format!("{}/.well-known/agent.json", endpoint_url.trim_end_matches('/'));
        let fetched = self
            .http
            .get(&card_url)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match fetched {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(card) => Ok(Some(card)),
                Err(e) if self.config.require_agent_card => Err(AgoraError::Validation(format!(
                    "agent card is not valid JSON: {}",
                    e
                ))),
                Err(e) => {
                    warn!(url = %card_url, error = %e, "agent card unparseable, skipping cache");
                    Ok(None)
                }
            },
            Err(e) if self.config.require_agent_card => Err(AgoraError::Validation(format!(
                "agent card fetch failed: {}",
                e
            ))),
            Err(e) => {
                warn!(url = %card_url, error = %e, "agent card fetch failed, skipping cache");
                Ok(None)
            }
        }
    }

    async fn verify_external_identity(
        &self,
        verify_url: &str,
        token: &str,
    ) -> AgoraResult<ExternalIdentity> {
        let resp = self
            .http
            .get(verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AgoraError::Dependency(format!("identity verification failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AgoraError::Validation("external identity token rejected".into()));
        }
        resp.json::<ExternalIdentity>()
            .await
            .map_err(|e| AgoraError::Dependency(format!("identity response unparseable: {}", e)))
    }
}

fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_secret_is_random_and_long() {
        let a = generate_webhook_secret();
        let b = generate_webhook_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
