//! Shared request/response vocabulary
//!
//! All data structures that cross component boundaries are defined here
//! for consistent serialization.

use crate::eip712::TypedData;
use crate::error::{ErrorReason, SigningError};
use crate::hardware::DeviceType;
use crate::multisig::MultiSigStatus;
use crate::utils::current_timestamp_ms;
use serde::{Deserialize, Serialize};

// =============================================================================
// Signatures
// =============================================================================

/// Encoding of a produced signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFormat {
    /// secp256k1 r || s || v (65 bytes)
    EcdsaRecoverable,
    /// secp256k1 r || s without recovery byte (64 bytes)
    EcdsaCompact,
    /// Ed25519 (64 bytes)
    Eddsa,
    /// BLS12-381 G2 signature (96 bytes)
    Bls,
}

impl SignatureFormat {
    /// Infer the format from a raw signature length
    ///
    /// 64-byte signatures are ambiguous; they are reported as compact ECDSA
    /// unless the agent declares otherwise.
    pub fn infer(len: usize) -> Option<Self> {
        match len {
            65 => Some(SignatureFormat::EcdsaRecoverable),
            64 => Some(SignatureFormat::EcdsaCompact),
            96 => Some(SignatureFormat::Bls),
            _ => None,
        }
    }

    pub fn expected_len(&self) -> usize {
        match self {
            SignatureFormat::EcdsaRecoverable => 65,
            SignatureFormat::EcdsaCompact | SignatureFormat::Eddsa => 64,
            SignatureFormat::Bls => 96,
        }
    }
}

/// A produced signature. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningResponse {
    pub request_id: String,
    /// 0x-prefixed hex
    pub signature: String,
    pub signature_format: SignatureFormat,
    /// Unix milliseconds
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_id: Option<u8>,
}

impl SigningResponse {
    /// Build a response from raw signature bytes returned by an agent
    pub fn from_signature(
        request_id: &str,
        bytes: &[u8],
        declared: Option<SignatureFormat>,
    ) -> Result<Self, SigningError> {
        let format = declared
            .or_else(|| SignatureFormat::infer(bytes.len()))
            .ok_or_else(|| {
                SigningError::unknown(format!(
                    "agent returned a signature of unsupported length {}",
                    bytes.len()
                ))
                .for_request(request_id)
            })?;

        if bytes.len() != format.expected_len() {
            return Err(SigningError::unknown(format!(
                "agent returned {} bytes for a {:?} signature",
                bytes.len(),
                format
            ))
            .for_request(request_id));
        }

        let recovery_id = match format {
            SignatureFormat::EcdsaRecoverable => Some(normalize_recovery_byte(bytes[64])),
            _ => None,
        };

        Ok(Self {
            request_id: request_id.to_string(),
            signature: format!("0x{}", hex::encode(bytes)),
            signature_format: format,
            timestamp: current_timestamp_ms(),
            recovery_id,
        })
    }
}

/// Map an Ethereum-style v (27/28, or EIP-155 encoded) to a 0/1 recovery id
pub fn normalize_recovery_byte(v: u8) -> u8 {
    match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        // EIP-155: v = chain_id * 2 + 35 + recovery_id
        v if v >= 35 => (v - 35) % 2,
        v => v % 2,
    }
}

/// A single failed item inside a batch-like operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttempt {
    pub request_id: String,
    pub reason: ErrorReason,
    pub message: String,
    pub timestamp: u64,
    pub retryable: bool,
}

impl FailedAttempt {
    pub fn from_error(request_id: &str, error: &SigningError) -> Self {
        Self {
            request_id: request_id.to_string(),
            reason: error.reason,
            message: error.message.clone(),
            timestamp: current_timestamp_ms(),
            retryable: error.retryable(),
        }
    }
}

// =============================================================================
// Single Transaction
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSigningRequest {
    pub id: String,
    pub chain_id: String,
    pub topic: String,
    /// Hex-encoded raw transaction
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

// =============================================================================
// Batch
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransaction {
    pub id: String,
    /// Hex-encoded raw transaction
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSigningRequest {
    pub id: String,
    pub chain_id: String,
    pub topic: String,
    pub transactions: Vec<BatchTransaction>,
    /// Overrides the configured default when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulate: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSigningResponse {
    pub batch_id: String,
    pub signatures: Vec<SigningResponse>,
    pub failed_transactions: Vec<FailedAttempt>,
    pub total_signed: usize,
    pub total_failed: usize,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Simulating,
    Signing,
    Completed,
    Failed,
}

/// Snapshot handed to batch progress callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_id: String,
    pub status: BatchStatus,
    /// 0-100, never decreases within one batch
    pub progress: u8,
    pub current_transaction: Option<String>,
    pub processed: usize,
    pub total: usize,
}

// =============================================================================
// Typed Data
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataSigningRequest {
    pub id: String,
    pub chain_id: String,
    pub topic: String,
    /// Account asked to sign the digest
    pub account: String,
    pub typed_data: TypedData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataSigningResponse {
    #[serde(flatten)]
    pub response: SigningResponse,
    /// 0x-prefixed digest that was handed to the agent
    pub typed_data_hash: String,
}

// =============================================================================
// Hardware
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareDescriptor {
    pub device_type: DeviceType,
    pub derivation_path: String,
    #[serde(default)]
    pub require_confirmation: bool,
    /// Confirmation timeout; the coordinator default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSigningRequest {
    pub id: String,
    pub chain_id: String,
    pub topic: String,
    pub device: HardwareDescriptor,
    /// Hex-encoded raw transaction
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSigningResponse {
    #[serde(flatten)]
    pub response: SigningResponse,
    pub device_id: String,
    pub device_type: DeviceType,
    pub derivation_path: String,
    pub confirmed_on_device: bool,
}

// =============================================================================
// Multi-sig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigRequest {
    /// Becomes the session's transaction id
    pub id: String,
    pub chain_id: String,
    pub topic: String,
    /// Hex-encoded transaction every signer signs
    pub payload: String,
    pub required_signatures: usize,
    pub signers: Vec<String>,
    /// Session lifetime; the coordinator default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Signer whose signature is collected through the agent at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedSignature {
    pub signer: String,
    pub signature: String,
    pub added_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigSigningResponse {
    pub transaction_id: String,
    pub status: MultiSigStatus,
    pub required_signatures: usize,
    /// In insertion order
    pub signatures: Vec<CollectedSignature>,
    pub pending_signers: Vec<String>,
    pub is_complete: bool,
    /// True only for the insertion that reached quorum
    pub completed_by_this_call: bool,
    pub expires_at: u64,
}

// =============================================================================
// Request envelope
// =============================================================================

/// One signing request of any mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SigningRequest {
    Transaction(TransactionSigningRequest),
    Batch(BatchSigningRequest),
    TypedData(TypedDataSigningRequest),
    Hardware(HardwareSigningRequest),
    MultiSig(MultiSigRequest),
}

impl SigningRequest {
    pub fn id(&self) -> &str {
        match self {
            SigningRequest::Transaction(r) => &r.id,
            SigningRequest::Batch(r) => &r.id,
            SigningRequest::TypedData(r) => &r.id,
            SigningRequest::Hardware(r) => &r.id,
            SigningRequest::MultiSig(r) => &r.id,
        }
    }

    pub fn chain_id(&self) -> &str {
        match self {
            SigningRequest::Transaction(r) => &r.chain_id,
            SigningRequest::Batch(r) => &r.chain_id,
            SigningRequest::TypedData(r) => &r.chain_id,
            SigningRequest::Hardware(r) => &r.chain_id,
            SigningRequest::MultiSig(r) => &r.chain_id,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            SigningRequest::Transaction(r) => &r.topic,
            SigningRequest::Batch(r) => &r.topic,
            SigningRequest::TypedData(r) => &r.topic,
            SigningRequest::Hardware(r) => &r.topic,
            SigningRequest::MultiSig(r) => &r.topic,
        }
    }
}

/// Result of dispatching a [`SigningRequest`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SigningOutcome {
    Transaction(SigningResponse),
    Batch(BatchSigningResponse),
    TypedData(TypedDataSigningResponse),
    Hardware(HardwareSigningResponse),
    MultiSig(MultiSigSigningResponse),
}

// =============================================================================
// Helpers
// =============================================================================

/// Decode a hex payload (with or without 0x prefix)
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, SigningError> {
    let trimmed = payload.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if stripped.is_empty() {
        return Err(SigningError::invalid_request("payload is empty"));
    }
    Ok(hex::decode(stripped)?)
}
