//! Request signatures and timestamp freshness
//!
//! The canonical message binds a request to a moment in time and its exact
//! body bytes:
//!
//! ```text
//! timestamp LF UPPER(method) LF path LF hex(sha256(body))
//! ```
//!
//! Verification never errors outward: any malformed signature, key, or
//! message yields `false`.

use chrono::{DateTime, FixedOffset, Utc};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier};
use sha2::{Digest, Sha256};

use crate::keys::{KeyPair, PublicKey};
use crate::CryptoResult;

/// Build the canonical byte string that request signatures cover.
pub fn build_signature_message(timestamp: &str, method: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let body_hash = hex::encode(Sha256::digest(body));
    format!(
        "{}\n{}\n{}\n{}",
        timestamp,
        method.to_uppercase(),
        path,
        body_hash
    )
    .into_bytes()
}

/// Sign a request with the agent's private key; returns the hex signature.
pub fn sign_request(
    keypair: &KeyPair,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> CryptoResult<String> {
    let message = build_signature_message(timestamp, method, path, body);
    let signature = keypair
        .signing_key()
        .try_sign(&message)
        .map_err(|e| crate::CryptoError::SigningFailed(e.to_string()))?;
    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a hex signature over the canonical request message.
///
/// Fail-closed: malformed hex, wrong lengths, and bad keys all return false.
pub fn verify_request_signature(
    public_key: &PublicKey,
    signature_hex: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> bool {
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(signature_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = public_key.to_verifying_key() else {
        return false;
    };

    let signature = Ed25519Signature::from_bytes(&sig_array);
    let message = build_signature_message(timestamp, method, path, body);
    verifying_key.verify(&message, &signature).is_ok()
}

/// Whether a timestamp is ISO-8601 with an explicit timezone and within
/// `max_age_secs` of `now` in either direction. Naive or unparseable
/// timestamps are never fresh.
pub fn timestamp_fresh(timestamp: &str, now: DateTime<Utc>, max_age_secs: i64) -> bool {
    // RFC 3339 parsing requires an offset; a naive timestamp fails here,
    // which is the fail-closed behavior we need.
    let Ok(parsed) = DateTime::<FixedOffset>::parse_from_rfc3339(timestamp) else {
        return false;
    };
    let delta = (now - parsed.with_timezone(&Utc)).num_seconds().abs();
    delta <= max_age_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = KeyPair::generate();
        let public = PublicKey::from_keypair(&keypair);
        let ts = "2026-08-02T12:00:00+00:00";
        let body = br#"{"hello":"world"}"#;

        let sig = sign_request(&keypair, ts, "post", "/api/v1/jobs", body).unwrap();
        assert!(verify_request_signature(&public, &sig, ts, "POST", "/api/v1/jobs", body));
    }

    #[test]
    fn method_is_case_insensitive_in_canonical_form() {
        let a = build_signature_message("t", "post", "/p", b"");
        let b = build_signature_message("t", "POST", "/p", b"");
        assert_eq!(a, b);
    }

    #[test]
    fn any_tamper_breaks_verification() {
        let keypair = KeyPair::generate();
        let public = PublicKey::from_keypair(&keypair);
        let ts = "2026-08-02T12:00:00+00:00";
        let body = b"payload";
        let sig = sign_request(&keypair, ts, "POST", "/x", body).unwrap();

        assert!(!verify_request_signature(&public, &sig, ts, "POST", "/x", b"payloae"));
        assert!(!verify_request_signature(&public, &sig, ts, "GET", "/x", body));
        assert!(!verify_request_signature(&public, &sig, ts, "POST", "/y", body));
        assert!(!verify_request_signature(
            &public,
            &sig,
            "2026-08-02T12:00:01+00:00",
            "POST",
            "/x",
            body
        ));

        // Flip one bit of the signature itself.
        let mut bytes = hex::decode(&sig).unwrap();
        bytes[0] ^= 0x01;
        assert!(!verify_request_signature(&public, &hex::encode(bytes), ts, "POST", "/x", body));
    }

    #[test]
    fn malformed_signature_fails_closed() {
        let public = PublicKey::from_keypair(&KeyPair::generate());
        assert!(!verify_request_signature(&public, "zzzz", "t", "POST", "/x", b""));
        assert!(!verify_request_signature(&public, "abcd", "t", "POST", "/x", b""));
        assert!(!verify_request_signature(&public, "", "t", "POST", "/x", b""));
    }

    #[test]
    fn naive_timestamps_are_never_fresh() {
        let now = Utc::now();
        assert!(!timestamp_fresh("2026-08-02T12:00:00", now, 30));
        assert!(!timestamp_fresh("garbage", now, 30));
        assert!(!timestamp_fresh("", now, 30));
    }

    #[test]
    fn freshness_window_is_symmetric() {
        let now = DateTime::parse_from_rfc3339("2026-08-02T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert!(timestamp_fresh("2026-08-02T12:00:29+00:00", now, 30));
        assert!(timestamp_fresh("2026-08-02T11:59:31+00:00", now, 30));
        assert!(!timestamp_fresh("2026-08-02T12:00:31+00:00", now, 30));
        assert!(!timestamp_fresh("2026-08-02T11:59:29+00:00", now, 30));
        // Non-UTC offsets are normalized before comparison.
        assert!(timestamp_fresh("2026-08-02T14:00:10+02:00", now, 30));
    }
}
