//! Pre-signing Transaction Simulation
//!
//! Simulation runs before signing and only ever produces warnings; a
//! failed simulation never blocks or changes the signing outcome.

use crate::error::{SigningError, SigningResult};
use crate::types::{decode_payload, BatchTransaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Below this many bytes a payload cannot be a complete transaction
const MIN_TRANSACTION_BYTES: usize = 3;

/// Intrinsic gas of a plain transfer
const BASE_GAS: u64 = 21_000;
const GAS_PER_DATA_BYTE: u64 = 16;

// =============================================================================
// Types
// =============================================================================

/// Envelope recognized from the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxEnvelope {
    /// Pre-EIP-2718 RLP list
    Legacy,
    /// Type 0x01
    AccessList,
    /// Type 0x02
    DynamicFee,
    /// Type 0x03
    Blob,
    /// Type 0x04
    SetCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    UnknownEnvelope,
    MalformedEnvelope,
    UnusuallySmall,
    BlobTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationWarning {
    pub code: WarningCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub transaction_id: String,
    /// False when the simulator predicts the transaction would fail
    pub success: bool,
    pub envelope: Option<TxEnvelope>,
    pub estimated_gas: u64,
    pub warnings: Vec<SimulationWarning>,
}

/// Simulates a transaction before it is signed
#[async_trait]
pub trait TransactionSimulator: Send + Sync {
    async fn simulate(&self, tx: &BatchTransaction, chain_id: &str) -> SigningResult<SimulationReport>;
}

// =============================================================================
// Offline simulator
// =============================================================================

/// Structural checks only: no RPC, no state
#[derive(Debug, Clone, Default)]
pub struct PayloadSimulator;

impl PayloadSimulator {
    pub fn new() -> Self {
        Self
    }

    /// Analyze raw transaction bytes
    pub fn analyze(&self, transaction_id: &str, bytes: &[u8]) -> SigningResult<SimulationReport> {
        if bytes.len() < MIN_TRANSACTION_BYTES {
            return Err(SigningError::invalid_request(format!(
                "payload of {} bytes is too short to be a transaction",
                bytes.len()
            ))
            .for_request(transaction_id));
        }

        let mut warnings = Vec::new();
        let first = bytes[0];

        let envelope = match first {
            0x01 => Some(TxEnvelope::AccessList),
            0x02 => Some(TxEnvelope::DynamicFee),
            0x03 => Some(TxEnvelope::Blob),
            0x04 => Some(TxEnvelope::SetCode),
            0xc0..=0xff => Some(TxEnvelope::Legacy),
            0x00..=0x7f => {
                warnings.push(SimulationWarning {
                    code: WarningCode::UnknownEnvelope,
                    message: format!("unrecognized transaction type 0x{:02x}", first),
                });
                None
            }
            _ => {
                warnings.push(SimulationWarning {
                    code: WarningCode::MalformedEnvelope,
                    message: format!("payload starts with 0x{:02x}, not an RLP list or typed envelope", first),
                });
                None
            }
        };

        if envelope == Some(TxEnvelope::Blob) {
            warnings.push(SimulationWarning {
                code: WarningCode::BlobTransaction,
                message: "blob transactions need sidecar data at broadcast".into(),
            });
        }

        if bytes.len() < 16 {
            warnings.push(SimulationWarning {
                code: WarningCode::UnusuallySmall,
                message: format!("payload is only {} bytes", bytes.len()),
            });
        }

        Ok(SimulationReport {
            transaction_id: transaction_id.to_string(),
            success: envelope.is_some(),
            envelope,
            estimated_gas: BASE_GAS + bytes.len() as u64 * GAS_PER_DATA_BYTE,
            warnings,
        })
    }
}

#[async_trait]
impl TransactionSimulator for PayloadSimulator {
    async fn simulate(&self, tx: &BatchTransaction, _chain_id: &str) -> SigningResult<SimulationReport> {
        let bytes = decode_payload(&tx.payload).map_err(|e| e.for_request(&tx.id))?;
        self.analyze(&tx.id, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_fee_envelope() {
        let payload = [vec![0x02, 0xf8, 0x70], vec![0u8; 40]].concat();
        let report = PayloadSimulator::new().analyze("tx1", &payload).unwrap();
        assert!(report.success);
        assert_eq!(report.envelope, Some(TxEnvelope::DynamicFee));
        assert!(report.warnings.is_empty());
        assert_eq!(report.estimated_gas, 21_000 + 43 * 16);
    }

    #[test]
    fn test_legacy_and_unknown() {
        let sim = PayloadSimulator::new();
        let legacy = sim.analyze("a", &[0xf8, 0x6b, 0x80]).unwrap();
        assert_eq!(legacy.envelope, Some(TxEnvelope::Legacy));
        assert!(legacy.warnings.iter().any(|w| w.code == WarningCode::UnusuallySmall));

        let unknown = sim.analyze("b", &[0x09, 0x00, 0x00]).unwrap();
        assert!(!unknown.success);
        assert_eq!(unknown.warnings[0].code, WarningCode::UnknownEnvelope);

        let malformed = sim.analyze("c", &[0x99, 0x00, 0x00]).unwrap();
        assert_eq!(malformed.warnings[0].code, WarningCode::MalformedEnvelope);
    }

    #[tokio::test]
    async fn test_undecodable_payload_errors() {
        let tx = BatchTransaction {
            id: "bad".into(),
            payload: "0xzz".into(),
            description: None,
        };
        let err = PayloadSimulator::new().simulate(&tx, "eip155:1").await.unwrap_err();
        assert_eq!(err.request_id.as_deref(), Some("bad"));
    }
}
