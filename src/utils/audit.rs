//! Audit Logging
//!
//! In-memory audit trail for signing and verification events with:
//! - Tamper-evident log entries (hash chain)
//! - Structured event types
//! - Truncation of signatures, messages and keys
//! - Bounded retention (ring buffer)
//! - JSON export

use crate::error::{SigningError, SigningResult};
use crate::utils::{current_timestamp_ms, truncate_middle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Audit log manager
pub struct AuditLog {
    /// Log entries (ring buffer for memory efficiency)
    entries: RwLock<VecDeque<AuditEntry>>,
    /// Configuration
    config: AuditConfig,
    /// Last entry hash (for hash chain)
    last_hash: RwLock<[u8; 32]>,
    /// Id of the next entry; survives ring-buffer eviction
    next_id: RwLock<u64>,
}

/// Audit configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum entries to keep in memory
    pub max_entries: usize,
    /// Whether to hash-chain entries for tamper detection
    pub hash_chain_enabled: bool,
    /// Whether to truncate signatures, messages and keys
    pub redact_sensitive: bool,
    /// Minimum severity to log
    pub min_severity: AuditSeverity,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            hash_chain_enabled: true,
            redact_sensitive: true,
            min_severity: AuditSeverity::Info,
        }
    }
}

/// Audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: u64,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// Request, batch or multi-sig transaction id
    pub request_id: Option<String>,
    pub details: AuditDetails,
    /// Hash of this entry + previous hash (for tamper detection)
    pub hash: String,
    pub prev_hash: String,
}

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    // Transaction signing
    TransactionSigned,
    TransactionFailed,

    // Batches
    BatchStarted,
    BatchCompleted,
    BatchCancelled,

    // Typed data
    TypedDataSigned,

    // Hardware
    DeviceConnected,
    DeviceDisconnected,
    HardwareSigned,
    HardwareRejected,

    // Multi-sig
    MultiSigInitiated,
    MultiSigSignatureAdded,
    MultiSigCompleted,
    MultiSigCancelled,
    MultiSigExpired,

    // Verification
    SignatureVerified,
    VerificationFailed,

    // Input
    ValidationFailed,
}

/// Audit severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Event-specific details
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditDetails {
    pub operation: Option<String>,
    pub result: Option<String>,
    pub signer: Option<String>,
    /// Truncated when redaction is on
    pub signature: Option<String>,
    /// Truncated when redaction is on
    pub message: Option<String>,
    /// Truncated when redaction is on
    pub public_key: Option<String>,
    pub algorithm: Option<String>,
    pub error: Option<String>,
    pub context: Option<String>,
}

impl AuditLog {
    /// Create a new audit log
    pub fn new() -> Self {
        Self::with_config(AuditConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(config: AuditConfig) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(config.max_entries.min(4096))),
            config,
            last_hash: RwLock::new([0u8; 32]),
            next_id: RwLock::new(1),
        }
    }

    /// Log an audit event
    pub fn log(&self, event_type: AuditEventType, severity: AuditSeverity, builder: AuditBuilder) {
        if severity < self.config.min_severity || self.config.max_entries == 0 {
            return;
        }

        // Acquire locks - if poisoned, silently skip logging (non-critical path)
        let Ok(mut entries) = self.entries.write() else { return };
        let Ok(mut last_hash) = self.last_hash.write() else { return };
        let Ok(mut next_id) = self.next_id.write() else { return };

        let id = *next_id;
        *next_id += 1;

        let mut details = builder.details;
        if self.config.redact_sensitive {
            details = Self::redact_details(details);
        }

        let prev_hash = hex::encode(*last_hash);
        let mut entry = AuditEntry {
            id,
            timestamp: current_timestamp_ms(),
            event_type,
            severity,
            request_id: builder.request_id,
            details,
            hash: String::new(),
            prev_hash,
        };

        if self.config.hash_chain_enabled {
            let hash = Self::compute_hash(&entry, &*last_hash);
            entry.hash = hex::encode(hash);
            *last_hash = hash;
        }

        if entries.len() >= self.config.max_entries {
            entries.pop_front();
        }

        entries.push_back(entry);
    }

    /// Compute hash for tamper detection
    fn compute_hash(entry: &AuditEntry, prev_hash: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(entry.id.to_le_bytes());
        hasher.update(entry.timestamp.to_le_bytes());
        hasher.update(format!("{:?}", entry.event_type).as_bytes());
        hasher.update(format!("{:?}", entry.severity).as_bytes());
        hasher.update(entry.request_id.as_deref().unwrap_or("").as_bytes());
        hasher.update(entry.details.result.as_deref().unwrap_or("").as_bytes());
        hasher.update(prev_hash);
        hasher.finalize().into()
    }

    /// Truncate fields that could carry full signatures or messages
    fn redact_details(mut details: AuditDetails) -> AuditDetails {
        details.signature = details.signature.map(|s| truncate_middle(&s, 10, 6));
        details.message = details.message.map(|m| truncate_middle(&m, 16, 0));
        details.public_key = details.public_key.map(|k| truncate_middle(&k, 10, 6));
        details.signer = details.signer.map(|s| truncate_middle(&s, 8, 4));
        details
    }

    /// Verify hash chain integrity of the retained entries
    ///
    /// After ring-buffer eviction the chain is checked from the oldest
    /// retained entry's recorded `prev_hash`.
    pub fn verify_integrity(&self) -> IntegrityResult {
        let Ok(entries) = self.entries.read() else {
            return IntegrityResult {
                is_valid: false,
                entries_checked: 0,
                first_invalid_id: None,
                message: "Failed to acquire lock".to_string(),
            };
        };

        let Some(first) = entries.front() else {
            return IntegrityResult {
                is_valid: true,
                entries_checked: 0,
                first_invalid_id: None,
                message: "No entries to verify".to_string(),
            };
        };

        if !self.config.hash_chain_enabled {
            return IntegrityResult {
                is_valid: true,
                entries_checked: entries.len(),
                first_invalid_id: None,
                message: "Hash chain disabled".to_string(),
            };
        }

        let mut prev_hash = [0u8; 32];
        if let Ok(bytes) = hex::decode(&first.prev_hash) {
            if bytes.len() == 32 {
                prev_hash.copy_from_slice(&bytes);
            }
        }

        let mut entries_checked = 0;
        for entry in entries.iter() {
            let expected_hash = Self::compute_hash(entry, &prev_hash);
            if entry.hash != hex::encode(expected_hash) {
                return IntegrityResult {
                    is_valid: false,
                    entries_checked,
                    first_invalid_id: Some(entry.id),
                    message: format!("Hash mismatch at entry {}", entry.id),
                };
            }
            prev_hash = expected_hash;
            entries_checked += 1;
        }

        IntegrityResult {
            is_valid: true,
            entries_checked,
            first_invalid_id: None,
            message: "All entries verified".to_string(),
        }
    }

    /// Query entries by event type
    pub fn query_by_type(&self, event_type: AuditEventType) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Query entries for one request, batch or transaction id
    pub fn query_by_request(&self, request_id: &str) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries
            .iter()
            .filter(|e| e.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }

    /// Query entries by severity (and above)
    pub fn query_by_severity(&self, min_severity: AuditSeverity) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries
            .iter()
            .filter(|e| e.severity >= min_severity)
            .cloned()
            .collect()
    }

    /// Get recent entries, newest first
    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries.iter().rev().take(count).cloned().collect()
    }

    /// Export all entries as JSON
    pub fn export_json(&self) -> SigningResult<String> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SigningError::unknown("Failed to acquire audit log lock"))?;
        let vec: Vec<_> = entries.iter().collect();
        Ok(serde_json::to_string_pretty(&vec)?)
    }

    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        let Ok(mut entries) = self.entries.write() else { return };
        entries.clear();

        let Ok(mut last_hash) = self.last_hash.write() else { return };
        *last_hash = [0u8; 32];
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Integrity verification result
#[derive(Debug, Clone)]
pub struct IntegrityResult {
    pub is_valid: bool,
    pub entries_checked: usize,
    pub first_invalid_id: Option<u64>,
    pub message: String,
}

/// Builder for audit entries
#[derive(Default)]
pub struct AuditBuilder {
    request_id: Option<String>,
    details: AuditDetails,
}

impl AuditBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn operation(mut self, op: &str) -> Self {
        self.details.operation = Some(op.to_string());
        self
    }

    pub fn result(mut self, result: &str) -> Self {
        self.details.result = Some(result.to_string());
        self
    }

    pub fn signer(mut self, signer: &str) -> Self {
        self.details.signer = Some(signer.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.details.signature = Some(signature.to_string());
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.details.message = Some(message.to_string());
        self
    }

    pub fn public_key(mut self, public_key: &str) -> Self {
        self.details.public_key = Some(public_key.to_string());
        self
    }

    pub fn algorithm(mut self, algorithm: &str) -> Self {
        self.details.algorithm = Some(algorithm.to_string());
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.details.error = Some(error.to_string());
        self
    }

    pub fn context(mut self, context: &str) -> Self {
        self.details.context = Some(context.to_string());
        self
    }
}
