//! Agora cryptography
//!
//! Ed25519 keypairs and request signatures, the canonical request digest,
//! canonical-JSON hashing for acceptance criteria, and webhook HMAC signing.
//!
//! Every verification path here fails closed: malformed keys, signatures, or
//! timestamps produce a negative result, never a panic that could bypass
//! authentication.

pub mod hash;
pub mod keys;
pub mod signature;
pub mod webhook;

pub use hash::{canonical_json, criteria_hash, sha256_hex};
pub use keys::{KeyPair, PublicKey};
pub use signature::{
    build_signature_message, sign_request, timestamp_fresh, verify_request_signature,
};
pub use webhook::sign_webhook_payload;

use thiserror::Error;

/// Crypto operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
