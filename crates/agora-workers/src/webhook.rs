//! Webhook delivery with retry
//!
//! At-least-once delivery of signed event envelopes. A delivery row exists
//! before the first HTTP attempt; the dispatcher claims due rows with an
//! update-returning query (single-dispatcher semantics), POSTs with a hard
//! timeout, and either marks delivered, reschedules with exponential
//! backoff, or dead-letters after the attempt budget. Dead-lettered rows
//! stay inspectable.
//!
//! Ordering across events is not guaranteed; every envelope carries its own
//! timestamp and recipients are responsible for idempotence.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use agora_crypto::sign_webhook_payload;
use agora_db::{Database, DbWebhookDelivery};

use crate::ShutdownRx;

/// Retry schedule: delay before attempt N+1, indexed by attempts already
/// made. After the last entry the delivery dead-letters.
const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(300),
    Duration::from_secs(1800),
];

/// Delay before the next attempt given how many attempts have been made,
/// or None when the budget is exhausted.
pub fn backoff_delay(attempts_made: u32, max_attempts: u32) -> Option<Duration> {
    if attempts_made >= max_attempts {
        return None;
    }
    let index = (attempts_made as usize).saturating_sub(1).min(BACKOFF_SCHEDULE.len() - 1);
    Some(BACKOFF_SCHEDULE[index])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout; recipients must answer within this budget.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Attempts before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Rows claimed per dispatch cycle.
    #[serde(default = "default_batch")]
    pub batch_size: i64,
    /// Idle sleep between cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            batch_size: default_batch(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_batch() -> i64 {
    10
}

fn default_poll_interval() -> u64 {
    1
}

pub struct WebhookDispatcher {
    db: Arc<Database>,
    config: WebhookConfig,
    http: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(db: Arc<Database>, config: WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client");
        Self { db, config, http }
    }

    /// Dispatcher loop. Exits when the shutdown signal flips, finishing the
    /// claimed batch first.
    pub async fn run(&self, mut shutdown: ShutdownRx) {
        info!("webhook dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let dispatched = match self.dispatch_due().await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "webhook dispatch cycle failed");
                    0
                }
            };

            if dispatched == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("webhook dispatcher shut down");
    }

    /// Claim and attempt every due delivery once. Returns how many were
    /// attempted.
    pub async fn dispatch_due(&self) -> Result<usize, agora_db::DbError> {
        let claimed = self.db.webhook_repo().claim_due(self.config.batch_size).await?;
        let count = claimed.len();
        for delivery in claimed {
            self.attempt(delivery).await;
        }
        Ok(count)
    }

    async fn attempt(&self, delivery: DbWebhookDelivery) {
        let target = match self.db.agent_repo().find_by_id(delivery.target_agent_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                self.finish_failure(&delivery, "target agent missing").await;
                return;
            }
            Err(e) => {
                self.finish_failure(&delivery, &format!("target load failed: {}", e)).await;
                return;
            }
        };

        let envelope = signed_envelope(&delivery.payload, &target.webhook_secret);
        let result = self
            .http
            .post(&target.endpoint_url)
            .json(&envelope)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                if let Err(e) = self.db.webhook_repo().mark_delivered(delivery.delivery_id).await {
                    error!(delivery_id = %delivery.delivery_id, error = %e, "failed to mark delivered");
                }
                debug!(
                    delivery_id = %delivery.delivery_id,
                    event = %delivery.event_type,
                    "webhook delivered"
                );
            }
            Ok(resp) => {
                self.finish_failure(&delivery, &format!("HTTP {}", resp.status())).await;
            }
            Err(e) => {
                self.finish_failure(&delivery, &e.to_string()).await;
            }
        }
    }

    async fn finish_failure(&self, delivery: &DbWebhookDelivery, error: &str) {
        let next = backoff_delay(delivery.attempts as u32, self.config.max_attempts)
            .map(|delay| chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());

        if next.is_none() {
            warn!(
                delivery_id = %delivery.delivery_id,
                event = %delivery.event_type,
                attempts = delivery.attempts,
                error = error,
                "webhook dead-lettered"
            );
        }

        if let Err(e) = self
            .db
            .webhook_repo()
            .record_failure(delivery.delivery_id, error, next)
            .await
        {
            error!(delivery_id = %delivery.delivery_id, error = %e, "failed to record webhook failure");
        }
    }
}

/// Attach the HMAC signature to an envelope: the signature covers
/// `timestamp + "." + compact_json(body)` where body is the envelope
/// without the signature field.
fn signed_envelope(payload: &Value, webhook_secret: &str) -> Value {
    let timestamp = payload
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let body = serde_json::to_string(payload).unwrap_or_default();
    let signature = sign_webhook_payload(webhook_secret, &timestamp, &body);

    let mut envelope = payload.clone();
    if let Value::Object(map) = &mut envelope {
        map.insert("signature".into(), Value::String(signature));
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_crypto::webhook::verify_webhook_signature;
    use serde_json::json;

    #[test]
    fn backoff_schedule_is_roughly_exponential() {
        assert_eq!(backoff_delay(1, 5), Some(Duration::from_secs(1)));
        assert_eq!(backoff_delay(2, 5), Some(Duration::from_secs(5)));
        assert_eq!(backoff_delay(3, 5), Some(Duration::from_secs(30)));
        assert_eq!(backoff_delay(4, 5), Some(Duration::from_secs(300)));
        assert_eq!(backoff_delay(5, 5), None);
        assert_eq!(backoff_delay(6, 5), None);
    }

    #[test]
    fn envelope_signature_verifies() {
        let payload = json!({
            "event": "job.funded",
            "job_id": "6a8a4a1e-0000-0000-0000-000000000000",
            "timestamp": "2026-08-02T12:00:00+00:00",
            "data": {"status": "funded"},
        });
        let envelope = signed_envelope(&payload, "secret");

        let signature = envelope["signature"].as_str().unwrap();
        let body = serde_json::to_string(&payload).unwrap();
        assert!(verify_webhook_signature(
            "secret",
            "2026-08-02T12:00:00+00:00",
            &body,
            signature
        ));
    }

    #[test]
    fn envelope_keeps_original_fields() {
        let payload = json!({"event": "e", "job_id": "j", "timestamp": "t", "data": {}});
        let envelope = signed_envelope(&payload, "k");
        assert_eq!(envelope["event"], "e");
        assert_eq!(envelope["job_id"], "j");
        assert!(envelope["signature"].is_string());
    }
}
