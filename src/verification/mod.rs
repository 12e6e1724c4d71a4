//! Signature Verification
//!
//! Algorithm-dispatch verification of produced signatures, independent of
//! how they were produced:
//! - ECDSA (secp256k1) with real public-key recovery
//! - EdDSA (ed25519, strict)
//! - BLS12-381 (min-pk: 48-byte keys, 96-byte signatures)

pub mod bls;
pub mod ecdsa;
pub mod eddsa;
mod verifier;

pub use verifier::*;

use crate::eip712::keccak256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declared signature scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Ecdsa,
    Eddsa,
    Bls,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ecdsa => "ecdsa",
            SignatureAlgorithm::Eddsa => "eddsa",
            SignatureAlgorithm::Bls => "bls",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecdsa" | "secp256k1" => Ok(SignatureAlgorithm::Ecdsa),
            "eddsa" | "ed25519" => Ok(SignatureAlgorithm::Eddsa),
            "bls" | "bls12-381" => Ok(SignatureAlgorithm::Bls),
            other => Err(format!("unknown signature algorithm: {}", other)),
        }
    }
}

/// Format or key problems found before the cryptographic check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemeError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// Text message, or a 0x-prefixed 32-byte digest
    pub message: String,
    /// 0x-prefixed hex
    pub signature: String,
    /// Hex public key; for ECDSA a 20-byte address is also accepted
    pub public_key: String,
    #[serde(default)]
    pub algorithm: SignatureAlgorithm,
}

impl VerificationRequest {
    pub fn new(message: &str, signature: &str, public_key: &str, algorithm: SignatureAlgorithm) -> Self {
        Self {
            message: message.to_string(),
            signature: signature.to_string(),
            public_key: public_key.to_string(),
            algorithm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_valid: bool,
    /// ECDSA only. Advisory: compare against an expected signer, never
    /// authorize on it alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_address: Option<String>,
    /// Unix milliseconds
    pub verified_at: u64,
    pub algorithm: SignatureAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatistics {
    pub total_verifications: u64,
    pub successful: u64,
    pub failed: u64,
    /// 0.0-1.0; zero when nothing was verified
    pub success_rate: f64,
    pub by_algorithm: HashMap<SignatureAlgorithm, u64>,
    pub cache_entries: usize,
}

/// Bytes a 0x-prefixed 32-byte hex digest stands for, if `message` is one
pub fn message_digest(message: &str) -> Option<[u8; 32]> {
    let digits = message.strip_prefix("0x")?;
    if digits.len() != 64 {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Some(digest)
}

/// EIP-191 personal-message hash
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Strip an optional 0x prefix and decode
pub(crate) fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value
        .trim()
        .strip_prefix("0x")
        .or_else(|| value.trim().strip_prefix("0X"))
        .unwrap_or(value.trim());
    hex::decode(digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_digest_detection() {
        let digest = format!("0x{}", "ab".repeat(32));
        assert_eq!(message_digest(&digest), Some([0xab; 32]));
        assert_eq!(message_digest(&"ab".repeat(32)), None);
        assert_eq!(message_digest("0x1234"), None);
        assert_eq!(message_digest("hello"), None);
    }

    #[test]
    fn test_personal_message_hash() {
        // keccak256("\x19Ethereum Signed Message:\n5hello")
        assert_eq!(
            hex::encode(personal_message_hash(b"hello")),
            "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("ED25519".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Eddsa));
        assert!("rsa".parse::<SignatureAlgorithm>().is_err());
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::Ecdsa);
    }
}
