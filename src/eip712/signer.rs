//! EIP-712 Signing
//!
//! [`TypedDataSigner`] canonicalizes typed data into a digest and obtains
//! one signature over it from the agent. The free functions recover and
//! check signers of a returned signature.

use super::encoder::keccak256;
use super::hasher::hash_typed_data;
use super::types::*;
use crate::agent::SigningAgent;
use crate::error::{SigningError, SigningResult};
use crate::types::{SigningResponse, TypedDataSigningRequest, TypedDataSigningResponse};
use crate::utils::audit::{AuditBuilder, AuditEventType, AuditLog, AuditSeverity};
use crate::{log_info, log_warn};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use std::sync::Arc;

/// Signs EIP-712 typed data through an external agent
pub struct TypedDataSigner {
    agent: Arc<dyn SigningAgent>,
    audit: Option<Arc<AuditLog>>,
}

impl TypedDataSigner {
    pub fn new(agent: Arc<dyn SigningAgent>) -> Self {
        Self { agent, audit: None }
    }

    /// Record signing events into a shared audit log
    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Validate, hash, and have the agent sign the digest
    pub async fn sign_typed_data(
        &self,
        request: &TypedDataSigningRequest,
    ) -> SigningResult<TypedDataSigningResponse> {
        let digest = self.prepare(request).map_err(|e| {
            self.record_failure(request, &e);
            e.for_request(&request.id)
        })?;

        log_info!(
            "eip712",
            "Requesting typed data signature",
            request_id = request.id,
            primary_type = request.typed_data.primary_type,
            account = request.account,
            digest = hex::encode(digest)
        );

        let signature = self
            .agent
            .sign_typed_data_digest(&request.topic, &digest, &request.account)
            .await
            .map_err(|e| {
                let err = SigningError::from(e).for_request(&request.id);
                log_warn!(
                    "eip712",
                    "Agent declined typed data",
                    request_id = request.id,
                    reason = err.reason
                );
                self.record_failure(request, &err);
                err
            })?;

        let response = SigningResponse::from_signature(&request.id, &signature.bytes, signature.format)?;

        if let Some(audit) = &self.audit {
            audit.log(
                AuditEventType::TypedDataSigned,
                AuditSeverity::Info,
                AuditBuilder::new()
                    .request(&request.id)
                    .operation("sign_typed_data")
                    .signer(&request.account)
                    .signature(&response.signature)
                    .context(&request.typed_data.primary_type),
            );
        }

        Ok(TypedDataSigningResponse {
            response,
            typed_data_hash: format!("0x{}", hex::encode(digest)),
        })
    }

    fn prepare(&self, request: &TypedDataSigningRequest) -> SigningResult<[u8; 32]> {
        if request.id.trim().is_empty() {
            return Err(SigningError::invalid_request("request id is required"));
        }
        if request.chain_id.trim().is_empty() {
            return Err(SigningError::invalid_request("chain id is required"));
        }
        if request.topic.trim().is_empty() {
            return Err(SigningError::invalid_request("session topic is required"));
        }
        if request.account.trim().is_empty() {
            return Err(SigningError::invalid_request("signing account is required"));
        }

        Ok(hash_typed_data(&request.typed_data)?)
    }

    fn record_failure(&self, request: &TypedDataSigningRequest, error: &SigningError) {
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEventType::TransactionFailed,
                AuditSeverity::Warning,
                AuditBuilder::new()
                    .request(&request.id)
                    .operation("sign_typed_data")
                    .error(&error.to_string()),
            );
        }
    }
}

/// Check a returned signature against the expected signer address
pub fn verify_typed_data(
    typed_data: &TypedData,
    signature: &Eip712Signature,
    expected_address: &str,
) -> Result<bool, Eip712Error> {
    let hash = hash_typed_data(typed_data)?;
    let recovered = recover_address(&hash, signature)?;
    Ok(addresses_equal(&recovered, expected_address))
}

/// Recover the signer's checksummed address from a digest signature
pub fn recover_address(hash: &[u8; 32], signature: &Eip712Signature) -> Result<String, Eip712Error> {
    let public_key = recover_public_key(hash, signature)?;
    Ok(checksum_address(&public_key_to_address(&public_key)))
}

/// Recover the secp256k1 public key behind a digest signature
pub fn recover_public_key(hash: &[u8; 32], signature: &Eip712Signature) -> Result<PublicKey, Eip712Error> {
    let secp = Secp256k1::verification_only();

    let recovery_id = RecoveryId::from_i32(signature.recovery_id()?)
        .map_err(|e| Eip712Error::InvalidSignature(e.to_string()))?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);

    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| Eip712Error::InvalidSignature(e.to_string()))?;

    let message = Message::from_digest(*hash);

    secp.recover_ecdsa(&message, &recoverable)
        .map_err(|e| Eip712Error::InvalidSignature(e.to_string()))
}

/// Ethereum address: last 20 bytes of keccak256(uncompressed key without 0x04)
pub fn public_key_to_address(public_key: &PublicKey) -> [u8; 20] {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// EIP-55 mixed-case checksum encoding
pub fn checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Case-insensitive address comparison, 0x prefix optional
pub fn addresses_equal(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        let s = s.trim();
        s.strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s)
            .to_ascii_lowercase()
    };
    strip(a) == strip(b)
}
