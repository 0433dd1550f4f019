//! Webhook envelope signing
//!
//! Outbound webhooks are signed with the recipient agent's `webhook_secret`:
//! HMAC-SHA256 over `timestamp + "." + body`, hex-encoded. Recipients verify
//! with the same construction; comparison on their side should be
//! constant-time, as ours is in tests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a webhook body. `body` is the compact JSON serialization of the
/// envelope minus the signature field.
pub fn sign_webhook_payload(secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a webhook signature in constant time.
pub fn verify_webhook_signature(secret: &str, timestamp: &str, body: &str, signature: &str) -> bool {
    use subtle::ConstantTimeEq;
    let expected = sign_webhook_payload(secret, timestamp, body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let sig = sign_webhook_payload("secret", "2026-08-02T12:00:00+00:00", r#"{"event":"job.funded"}"#);
        assert_eq!(sig.len(), 64);
        assert!(verify_webhook_signature(
            "secret",
            "2026-08-02T12:00:00+00:00",
            r#"{"event":"job.funded"}"#,
            &sig
        ));
    }

    #[test]
    fn wrong_secret_or_body_fails() {
        let ts = "2026-08-02T12:00:00+00:00";
        let sig = sign_webhook_payload("secret", ts, "body");
        assert!(!verify_webhook_signature("other", ts, "body", &sig));
        assert!(!verify_webhook_signature("secret", ts, "tampered", &sig));
        assert!(!verify_webhook_signature("secret", "1970-01-01T00:00:00+00:00", "body", &sig));
    }

    #[test]
    fn timestamp_and_body_are_dot_joined() {
        // "a" + ".b" and "a." + "b" must produce the same mac as ("a", "b").
        let direct = sign_webhook_payload("k", "a", "b");
        let mut mac = HmacSha256::new_from_slice(b"k").unwrap();
        mac.update(b"a.b");
        assert_eq!(direct, hex::encode(mac.finalize().into_bytes()));
    }
}
