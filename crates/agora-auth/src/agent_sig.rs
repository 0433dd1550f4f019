//! AgentSig request authentication
//!
//! Wire form:
//!
//! ```text
//! Authorization: AgentSig <agent_id>:<signature_hex>
//! X-Timestamp: <ISO-8601 with timezone>
//! X-Nonce: <opaque string>        (optional, single-use within TTL)
//! ```
//!
//! The pipeline: parse header, check timestamp freshness, claim the nonce,
//! load the agent, verify the Ed25519 signature over the canonical digest of
//! the raw body bytes. Each step fails closed, and the caller collapses
//! every failure into one uniform 403 so responses cannot be used as an
//! oracle for which step failed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use agora_crypto::{timestamp_fresh, verify_request_signature, PublicKey};
use agora_db::{Database, DbAgent};
use agora_types::AgentStatus;

/// The principal attached to a request after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent {
    pub agent_id: Uuid,
    pub public_key: String,
    pub display_name: String,
    pub status: AgentStatus,
}

impl From<&DbAgent> for AuthenticatedAgent {
    fn from(agent: &DbAgent) -> Self {
        Self {
            agent_id: agent.agent_id,
            public_key: agent.public_key.clone(),
            display_name: agent.display_name.clone(),
            status: AgentStatus::from_str(&agent.status).unwrap_or(AgentStatus::Suspended),
        }
    }
}

/// Parsed `Authorization: AgentSig ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthHeader {
    pub agent_id: Uuid,
    pub signature_hex: String,
}

impl ParsedAuthHeader {
    /// Parse the header value. Any deviation from the exact shape fails.
    pub fn parse(header: &str) -> AuthResult<Self> {
        let rest = header
            .strip_prefix("AgentSig ")
            .ok_or(AuthError::MalformedHeader)?;
        let (agent_part, sig_part) = rest.split_once(':').ok_or(AuthError::MalformedHeader)?;

        let agent_id = Uuid::parse_str(agent_part.trim()).map_err(|_| AuthError::MalformedHeader)?;
        let signature_hex = sig_part.trim();
        if signature_hex.is_empty() || signature_hex.contains(':') {
            return Err(AuthError::MalformedHeader);
        }

        Ok(Self {
            agent_id,
            signature_hex: signature_hex.to_string(),
        })
    }
}

/// Signature verification service.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<Database>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Arc<Database>, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Authenticate one request from its raw parts.
    pub async fn authenticate(
        &self,
        auth_header: &str,
        timestamp: Option<&str>,
        nonce: Option<&str>,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> AuthResult<AuthenticatedAgent> {
        let parsed = ParsedAuthHeader::parse(auth_header)?;

        let timestamp = timestamp.ok_or(AuthError::BadTimestamp)?;
        if !timestamp_fresh(timestamp, Utc::now(), self.config.signature_max_age_secs) {
            return Err(AuthError::StaleTimestamp);
        }

        if let Some(nonce) = nonce {
            let fresh = self
                .db
                .cache()
                .check_nonce(&parsed.agent_id.to_string(), nonce)
                .await?;
            if !fresh {
                return Err(AuthError::DuplicateNonce);
            }
        }

        let agent = self
            .db
            .agent_repo()
            .find_by_id(parsed.agent_id)
            .await?
            .ok_or(AuthError::UnknownAgent)?;
        if agent.status != AgentStatus::Active.as_str() {
            return Err(AuthError::UnknownAgent);
        }

        let public_key = PublicKey(agent.public_key.clone());
        if !verify_request_signature(
            &public_key,
            &parsed.signature_hex,
            timestamp,
            method,
            path,
            body,
        ) {
            return Err(AuthError::BadSignature);
        }

        // Best effort; auth must not fail because the touch did.
        if let Err(e) = self.db.agent_repo().touch_last_seen(agent.agent_id).await {
            tracing::debug!(error = %e, "failed to touch last_seen_at");
        }

        Ok(AuthenticatedAgent::from(&agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_header() {
        let id = Uuid::new_v4();
        let header = format!("AgentSig {}:deadbeef", id);
        let parsed = ParsedAuthHeader::parse(&header).unwrap();
        assert_eq!(parsed.agent_id, id);
        assert_eq!(parsed.signature_hex, "deadbeef");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(ParsedAuthHeader::parse("Bearer token").is_err());
        assert!(ParsedAuthHeader::parse("AgentSig missing-colon").is_err());
        assert!(ParsedAuthHeader::parse("AgentSig not-a-uuid:sig").is_err());
        assert!(ParsedAuthHeader::parse(&format!("AgentSig {}:", Uuid::new_v4())).is_err());
        assert!(ParsedAuthHeader::parse(&format!("AgentSig {}:a:b", Uuid::new_v4())).is_err());
        assert!(ParsedAuthHeader::parse("").is_err());
    }
}
