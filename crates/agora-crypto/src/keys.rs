//! Ed25519 key management

use crate::{CryptoError, CryptoResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// An Ed25519 keypair. Agents hold these client-side; the platform only
/// ever stores the public half.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Restore a keypair from raw signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Restore from a hex-encoded private key.
    pub fn from_hex(private_hex: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(private_hex)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("private key must be 32 bytes".into()))?;
        Ok(Self::from_bytes(&arr))
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Hex form of the public key, as stored on agent records.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Hex form of the private key. For client-side storage only.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

/// A hex-encoded Ed25519 public key, as presented at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Self(keypair.public_key_hex())
    }

    /// Parse into a verifying key; any malformed input is an error the
    /// caller must treat as verification failure.
    pub fn to_verifying_key(&self) -> CryptoResult<VerifyingKey> {
        let bytes = hex::decode(&self.0)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_is_64_hex_chars() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.public_key_hex().len(), 64);
    }

    #[test]
    fn keypair_hex_round_trip() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_hex(&keypair.private_key_hex()).unwrap();
        assert_eq!(keypair.public_key_hex(), restored.public_key_hex());
    }

    #[test]
    fn malformed_public_key_fails_closed() {
        assert!(PublicKey("not-hex".into()).to_verifying_key().is_err());
        assert!(PublicKey("abcd".into()).to_verifying_key().is_err());
        assert!(PublicKey(String::new()).to_verifying_key().is_err());
    }
}
