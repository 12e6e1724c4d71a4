use crate::agent::SigningAgent;
use crate::error::{SigningError, SigningResult};
use crate::types::{decode_payload, SigningResponse, TransactionSigningRequest};
use crate::utils::audit::{AuditBuilder, AuditEventType, AuditLog, AuditSeverity};
use crate::{log_debug, log_info, log_warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What a cached signature was produced over
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestFingerprint {
    chain_id: String,
    topic: String,
    account: Option<String>,
    payload: Vec<u8>,
}

impl RequestFingerprint {
    fn new(request: &TransactionSigningRequest, payload: &[u8]) -> Self {
        Self {
            chain_id: request.chain_id.trim().to_string(),
            topic: request.topic.trim().to_string(),
            account: request.account.as_deref().map(|a| a.trim().to_ascii_lowercase()),
            payload: payload.to_vec(),
        }
    }
}

struct CachedSignature {
    fingerprint: RequestFingerprint,
    response: SigningResponse,
}

/// Validates one transaction, has the agent sign it and memoizes the
/// response by request id together with what was signed
pub struct TransactionSigner {
    agent: Arc<dyn SigningAgent>,
    cache: RwLock<HashMap<String, CachedSignature>>,
    audit: Option<Arc<AuditLog>>,
}

impl TransactionSigner {
    pub fn new(agent: Arc<dyn SigningAgent>) -> Self {
        Self {
            agent,
            cache: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Sign a raw transaction
    ///
    /// A repeated request (same id, chain, topic, account and payload)
    /// returns the cached response without contacting the agent again. A
    /// reused id with anything else changed is signed afresh and replaces
    /// the cached entry.
    pub async fn sign_transaction(&self, request: &TransactionSigningRequest) -> SigningResult<SigningResponse> {
        let payload = validate(request).map_err(|e| e.for_request(&request.id))?;
        let fingerprint = RequestFingerprint::new(request, &payload);

        if let Some(cached) = self.lookup(&request.id, &fingerprint) {
            log_debug!("tx", "Returning cached signature", request_id = request.id);
            return Ok(cached);
        }

        let signature = match self.agent.sign_transaction(&request.topic, &payload).await {
            Ok(signature) => signature,
            Err(agent_error) => {
                let err = SigningError::from(agent_error).for_request(&request.id);
                log_warn!(
                    "tx",
                    "Agent failed to sign transaction",
                    request_id = request.id,
                    reason = err.reason,
                    retryable = err.retryable()
                );
                self.audit_event(
                    AuditEventType::TransactionFailed,
                    AuditSeverity::Warning,
                    AuditBuilder::new().request(&request.id).error(&err.to_string()),
                );
                return Err(err);
            }
        };

        let response = SigningResponse::from_signature(&request.id, &signature.bytes, signature.format)?;

        let response = self.store(&request.id, fingerprint, response);

        log_info!(
            "tx",
            "Transaction signed",
            request_id = request.id,
            chain_id = request.chain_id,
            signature = response.signature
        );
        self.audit_event(
            AuditEventType::TransactionSigned,
            AuditSeverity::Info,
            AuditBuilder::new()
                .request(&request.id)
                .operation("sign_transaction")
                .signature(&response.signature)
                .signer(request.account.as_deref().unwrap_or_default()),
        );

        Ok(response)
    }

    /// Latest response cached under `request_id`
    pub fn get_cached(&self, request_id: &str) -> Option<SigningResponse> {
        self.cache
            .read()
            .ok()?
            .get(request_id)
            .map(|entry| entry.response.clone())
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn lookup(&self, request_id: &str, fingerprint: &RequestFingerprint) -> Option<SigningResponse> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(request_id)?;
        if entry.fingerprint != *fingerprint {
            log_warn!("tx", "Request id reused for a different transaction", request_id = request_id);
            return None;
        }
        Some(entry.response.clone())
    }

    /// First writer wins among identical requests so concurrent duplicates
    /// observe one response; a different request under the same id replaces it
    fn store(&self, request_id: &str, fingerprint: RequestFingerprint, response: SigningResponse) -> SigningResponse {
        let Ok(mut cache) = self.cache.write() else {
            return response;
        };
        match cache.get(request_id) {
            Some(entry) if entry.fingerprint == fingerprint => entry.response.clone(),
            _ => {
                cache.insert(
                    request_id.to_string(),
                    CachedSignature {
                        fingerprint,
                        response: response.clone(),
                    },
                );
                response
            }
        }
    }

    fn audit_event(&self, event: AuditEventType, severity: AuditSeverity, builder: AuditBuilder) {
        if let Some(audit) = &self.audit {
            audit.log(event, severity, builder);
        }
    }
}

/// Check required fields and decode the payload
fn validate(request: &TransactionSigningRequest) -> SigningResult<Vec<u8>> {
    if request.id.trim().is_empty() {
        return Err(SigningError::invalid_request("request id is required"));
    }
    if request.chain_id.trim().is_empty() {
        return Err(SigningError::invalid_request("chain id is required"));
    }
    if request.topic.trim().is_empty() {
        return Err(SigningError::invalid_request("session topic is required"));
    }
    decode_payload(&request.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, LocalKeyAgent};
    use crate::error::ErrorReason;

    fn request(id: &str, payload: &str) -> TransactionSigningRequest {
        TransactionSigningRequest {
            id: id.into(),
            chain_id: "eip155:1".into(),
            topic: "topic-1".into(),
            payload: payload.into(),
            account: None,
        }
    }

    #[tokio::test]
    async fn test_repeated_id_hits_cache() {
        let agent = Arc::new(LocalKeyAgent::random());
        let signer = TransactionSigner::new(agent.clone());

        let first = signer.sign_transaction(&request("tx1", "0x02f801")).await.unwrap();
        let second = signer.sign_transaction(&request("tx1", "0x02f801")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(agent.call_count(), 1);
        assert_eq!(signer.get_cached("tx1"), Some(first));

        signer.clear_cache();
        assert_eq!(signer.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_reused_id_with_different_request_is_signed_again() {
        let agent = Arc::new(LocalKeyAgent::random());
        let signer = TransactionSigner::new(agent.clone());

        let first = signer.sign_transaction(&request("tx1", "0x02aaaa")).await.unwrap();
        let other_payload = signer.sign_transaction(&request("tx1", "0x02bbbb")).await.unwrap();
        assert_ne!(first.signature, other_payload.signature);
        assert_eq!(agent.call_count(), 2);
        assert_eq!(signer.get_cached("tx1"), Some(other_payload.clone()));

        // Same bytes in another spelling are the same request
        let again = signer.sign_transaction(&request("tx1", "02BBBB")).await.unwrap();
        assert_eq!(again, other_payload);
        assert_eq!(agent.call_count(), 2);

        let mut other_topic = request("tx1", "0x02bbbb");
        other_topic.topic = "topic-2".into();
        signer.sign_transaction(&other_topic).await.unwrap();
        assert_eq!(agent.call_count(), 3);
        assert_eq!(signer.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_before_agent() {
        let agent = Arc::new(LocalKeyAgent::random());
        let signer = TransactionSigner::new(agent.clone());

        for bad in [request("", "0x01"), request("tx", "0x"), request("tx", "0xnothex")] {
            let err = signer.sign_transaction(&bad).await.unwrap_err();
            assert_eq!(err.reason, ErrorReason::InvalidRequest);
        }

        let mut no_topic = request("tx", "0x01");
        no_topic.topic = " ".into();
        assert!(signer.sign_transaction(&no_topic).await.is_err());
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_agent_failure_is_classified_and_not_cached() {
        let agent = Arc::new(LocalKeyAgent::random().with_failure(&[0xaa], AgentError::untyped("network unreachable")));
        let signer = TransactionSigner::new(agent);

        let err = signer.sign_transaction(&request("tx9", "aa")).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::NetworkError);
        assert!(err.retryable());
        assert_eq!(err.request_id.as_deref(), Some("tx9"));
        assert!(signer.get_cached("tx9").is_none());
    }
}
