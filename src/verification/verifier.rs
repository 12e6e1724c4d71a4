use super::{
    bls, decode_hex, ecdsa, eddsa, message_digest, personal_message_hash, SignatureAlgorithm,
    VerificationRequest, VerificationResult, VerificationStatistics,
};
use crate::config::VerificationConfig;
use crate::error::{SigningError, SigningResult};
use crate::utils::audit::{AuditBuilder, AuditConfig, AuditEntry, AuditEventType, AuditLog, AuditSeverity};
use crate::utils::current_timestamp_ms;
use crate::{log_debug, log_warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Minimum decoded signature length accepted by any scheme
const MIN_SIGNATURE_BYTES: usize = 64;

/// Verifies signatures and keeps a memo of every distinct request
pub struct SignatureVerifier {
    config: VerificationConfig,
    cache: RwLock<HashMap<VerificationRequest, VerificationResult>>,
    audit: AuditLog,
    total: AtomicU64,
    successful: AtomicU64,
    by_algorithm: RwLock<HashMap<SignatureAlgorithm, u64>>,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self::with_config(VerificationConfig::default())
    }

    pub fn with_config(config: VerificationConfig) -> Self {
        let audit = AuditLog::with_config(AuditConfig {
            max_entries: config.audit_max_entries,
            ..Default::default()
        });

        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            audit,
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            by_algorithm: RwLock::new(HashMap::new()),
        }
    }

    /// Verify one signature
    ///
    /// Empty inputs are a caller error. Malformed signatures or keys yield
    /// an invalid result carrying the reason in `error`.
    pub fn verify(&self, request: &VerificationRequest) -> SigningResult<VerificationResult> {
        if let Err(e) = validate(request) {
            self.audit.log(
                AuditEventType::ValidationFailed,
                AuditSeverity::Warning,
                AuditBuilder::new()
                    .operation("verify")
                    .algorithm(request.algorithm.as_str())
                    .error(&e.message),
            );
            return Err(e);
        }

        let cached = if self.config.enable_cache {
            self.cache.read().ok().and_then(|cache| cache.get(request).cloned())
        } else {
            None
        };

        let result = match cached {
            Some(result) => result,
            None => {
                let result = evaluate(request);
                if self.config.enable_cache {
                    if let Ok(mut cache) = self.cache.write() {
                        // A concurrent caller may have raced us; keep the first result
                        cache.entry(request.clone()).or_insert_with(|| result.clone());
                    }
                }
                result
            }
        };

        self.record(request, &result);
        Ok(result)
    }

    /// Counters and cache size
    pub fn statistics(&self) -> VerificationStatistics {
        let total = self.total.load(Ordering::SeqCst);
        let successful = self.successful.load(Ordering::SeqCst);

        VerificationStatistics {
            total_verifications: total,
            successful,
            failed: total.saturating_sub(successful),
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            by_algorithm: self
                .by_algorithm
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
            cache_entries: self.cache.read().map(|c| c.len()).unwrap_or(0),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    /// Most recent audit entries, newest first
    pub fn recent_audit(&self, count: usize) -> Vec<AuditEntry> {
        self.audit.recent(count)
    }

    pub fn export_audit_json(&self) -> SigningResult<String> {
        self.audit.export_json()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    fn record(&self, request: &VerificationRequest, result: &VerificationResult) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if result.is_valid {
            self.successful.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(mut counts) = self.by_algorithm.write() {
            *counts.entry(request.algorithm).or_insert(0) += 1;
        }

        let (event, severity) = if result.is_valid {
            (AuditEventType::SignatureVerified, AuditSeverity::Info)
        } else {
            (AuditEventType::VerificationFailed, AuditSeverity::Warning)
        };

        let mut builder = AuditBuilder::new()
            .operation("verify")
            .result(if result.is_valid { "valid" } else { "invalid" })
            .message(&request.message)
            .signature(&request.signature)
            .public_key(&request.public_key)
            .algorithm(request.algorithm.as_str());
        if let Some(address) = &result.recovered_address {
            builder = builder.signer(address);
        }
        if let Some(error) = &result.error {
            builder = builder.error(error);
        }
        self.audit.log(event, severity, builder);

        if result.is_valid {
            log_debug!(
                "verify",
                "Signature verified",
                algorithm = request.algorithm,
                public_key = request.public_key
            );
        } else {
            log_warn!(
                "verify",
                "Signature rejected",
                algorithm = request.algorithm,
                public_key = request.public_key,
                error = result.error.as_deref().unwrap_or("mismatch")
            );
        }
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(request: &VerificationRequest) -> SigningResult<()> {
    if request.message.is_empty() {
        return Err(SigningError::invalid_request("message is required"));
    }
    if request.signature.trim().is_empty() {
        return Err(SigningError::invalid_request("signature is required"));
    }
    if request.public_key.trim().is_empty() {
        return Err(SigningError::invalid_request("public key is required"));
    }
    Ok(())
}

/// Pure verification; the same request always yields the same verdict
fn evaluate(request: &VerificationRequest) -> VerificationResult {
    let algorithm = request.algorithm;
    let invalid = |error: String| VerificationResult {
        is_valid: false,
        recovered_address: None,
        verified_at: current_timestamp_ms(),
        algorithm,
        error: Some(error),
    };

    if !request.signature.starts_with("0x") {
        return invalid("signature must be 0x-prefixed hex".into());
    }
    let Some(signature) = decode_hex(&request.signature) else {
        return invalid("signature is not valid hex".into());
    };
    if signature.len() < MIN_SIGNATURE_BYTES {
        return invalid(format!(
            "signature must be at least {} bytes, got {}",
            MIN_SIGNATURE_BYTES,
            signature.len()
        ));
    }
    let Some(public_key) = decode_hex(&request.public_key) else {
        return invalid("public key is not valid hex".into());
    };

    let digest = message_digest(&request.message);

    let outcome = match algorithm {
        SignatureAlgorithm::Ecdsa => {
            let digest = digest.unwrap_or_else(|| personal_message_hash(request.message.as_bytes()));
            ecdsa::verify(&digest, &signature, &public_key)
                .map(|outcome| (outcome.is_valid, Some(outcome.recovered_address)))
        }
        SignatureAlgorithm::Eddsa | SignatureAlgorithm::Bls => {
            let message = match &digest {
                Some(d) => d.as_slice(),
                None => request.message.as_bytes(),
            };
            let checked = if algorithm == SignatureAlgorithm::Eddsa {
                eddsa::verify(message, &signature, &public_key)
            } else {
                bls::verify(message, &signature, &public_key)
            };
            checked.map(|valid| (valid, None))
        }
    };

    match outcome {
        Ok((is_valid, recovered_address)) => VerificationResult {
            is_valid,
            recovered_address,
            verified_at: current_timestamp_ms(),
            algorithm,
            error: if is_valid {
                None
            } else {
                Some("signature does not match public key".into())
            },
        },
        Err(e) => invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LocalKeyAgent;
    use crate::error::ErrorReason;
    use ed25519_dalek::{Signer, SigningKey};

    fn ecdsa_request(message: &str) -> (LocalKeyAgent, VerificationRequest) {
        let agent = LocalKeyAgent::random();
        let signature = agent.sign_digest(&personal_message_hash(message.as_bytes()));
        let request = VerificationRequest::new(
            message,
            &format!("0x{}", hex::encode(signature)),
            &agent.address(),
            SignatureAlgorithm::Ecdsa,
        );
        (agent, request)
    }

    #[test]
    fn test_ecdsa_personal_message() {
        let verifier = SignatureVerifier::new();
        let (agent, request) = ecdsa_request("Sign in to Example");

        let result = verifier.verify(&request).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.recovered_address, Some(agent.address()));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_ecdsa_precomputed_digest() {
        let verifier = SignatureVerifier::new();
        let agent = LocalKeyAgent::random();
        let digest = [0x5a; 32];
        let signature = agent.sign_digest(&digest);

        let request = VerificationRequest::new(
            &format!("0x{}", hex::encode(digest)),
            &format!("0x{}", hex::encode(signature)),
            &agent.public_key_hex(),
            SignatureAlgorithm::Ecdsa,
        );
        assert!(verifier.verify(&request).unwrap().is_valid);
    }

    #[test]
    fn test_result_is_memoized() {
        let verifier = SignatureVerifier::new();
        let (_, request) = ecdsa_request("hello");

        let first = verifier.verify(&request).unwrap();
        let second = verifier.verify(&request).unwrap();
        assert_eq!(first, second);

        let stats = verifier.statistics();
        assert_eq!(stats.total_verifications, 2);
        assert_eq!(stats.cache_entries, 1);

        verifier.clear_cache();
        assert_eq!(verifier.statistics().cache_entries, 0);
    }

    #[test]
    fn test_format_failures_are_invalid_results() {
        let verifier = SignatureVerifier::new();

        let unprefixed = VerificationRequest::new("m", &"ab".repeat(65), "0x01", SignatureAlgorithm::Ecdsa);
        let result = verifier.verify(&unprefixed).unwrap();
        assert!(!result.is_valid);
        assert!(result.recovered_address.is_none());

        let short = VerificationRequest::new("m", &format!("0x{}", "ab".repeat(32 + 31)), "0x01", SignatureAlgorithm::Ecdsa);
        assert!(!verifier.verify(&short).unwrap().is_valid);

        let wrong_len_bls = VerificationRequest::new(
            "m",
            &format!("0x{}", "ab".repeat(64)),
            &format!("0x{}", "cd".repeat(48)),
            SignatureAlgorithm::Bls,
        );
        let result = verifier.verify(&wrong_len_bls).unwrap();
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("96"));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let verifier = SignatureVerifier::new();
        let request = VerificationRequest::new("", "0x00", "0x00", SignatureAlgorithm::Ecdsa);
        let err = verifier.verify(&request).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);
        assert_eq!(verifier.statistics().total_verifications, 0);
    }

    #[test]
    fn test_eddsa_dispatch() {
        let verifier = SignatureVerifier::new();
        let key = SigningKey::from_bytes(&[11u8; 32]);
        let signature = key.sign(b"transfer 5").to_bytes();

        let request = VerificationRequest::new(
            "transfer 5",
            &format!("0x{}", hex::encode(signature)),
            &hex::encode(key.verifying_key().to_bytes()),
            SignatureAlgorithm::Eddsa,
        );
        let result = verifier.verify(&request).unwrap();
        assert!(result.is_valid);
        assert!(result.recovered_address.is_none());
    }

    #[test]
    fn test_statistics_and_audit() {
        let verifier = SignatureVerifier::new();
        let (_, good) = ecdsa_request("a");
        let (_, mut bad) = ecdsa_request("b");
        bad.message = "tampered".into();

        verifier.verify(&good).unwrap();
        verifier.verify(&bad).unwrap();

        let stats = verifier.statistics();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.by_algorithm.get(&SignatureAlgorithm::Ecdsa), Some(&2));

        let audit = verifier.recent_audit(10);
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].event_type, AuditEventType::VerificationFailed);
        assert_eq!(audit[1].event_type, AuditEventType::SignatureVerified);
        // Full signatures never land in the audit trail
        assert_ne!(audit[1].details.signature.as_deref(), Some(good.signature.as_str()));
        assert!(verifier.audit_log().verify_integrity().is_valid);
        assert!(verifier.export_audit_json().unwrap().contains("SignatureVerified"));
    }
}
