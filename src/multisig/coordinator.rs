//! Multi-sig coordinator
//!
//! Sessions live in a shared table; each session sits behind its own mutex
//! so that the checks, the insertion and the completion update of one
//! `add_signature` call happen atomically. Lock order is table, then
//! session; the table read lock is held while a session is updated so
//! `complete` cannot evict it mid-call. Nothing here holds a lock across
//! an agent call.

use super::session::*;
use crate::config::MultiSigConfig;
use crate::error::{SigningError, SigningResult};
use crate::tx::TransactionSigner;
use crate::types::{decode_payload, CollectedSignature, FailedAttempt, MultiSigRequest, MultiSigSigningResponse, TransactionSigningRequest};
use crate::utils::audit::{AuditBuilder, AuditEventType, AuditLog, AuditSeverity};
use crate::utils::current_timestamp_ms;
use crate::{log_info, log_warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type SessionRef = Arc<Mutex<MultiSigSession>>;

/// Outcome of submitting several signatures at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigBatchOutcome {
    /// Signers whose signature was accepted, in submission order
    pub accepted: Vec<String>,
    /// Rejected submissions; `request_id` holds the signer
    pub failures: Vec<FailedAttempt>,
    /// Session state after the last submission, if the session still exists
    pub session: Option<MultiSigSigningResponse>,
    /// Signer whose submission reached quorum
    pub completed_by: Option<String>,
}

/// Assembled result of a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSigCompletion {
    pub transaction_id: String,
    pub chain_id: String,
    pub payload: String,
    pub required_signatures: usize,
    /// Every accepted signature, late ones included, in insertion order
    pub signatures: Vec<CollectedSignature>,
    pub completed_at: u64,
}

pub struct MultiSigCoordinator {
    config: MultiSigConfig,
    signer: Option<Arc<TransactionSigner>>,
    sessions: RwLock<HashMap<String, SessionRef>>,
    audit: Option<Arc<AuditLog>>,
}

impl MultiSigCoordinator {
    pub fn new() -> Self {
        Self::with_config(MultiSigConfig::default())
    }

    pub fn with_config(config: MultiSigConfig) -> Self {
        Self {
            config,
            signer: None,
            sessions: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    /// Signing primitive used by `sign_as` and initiator signatures
    pub fn with_signer(mut self, signer: Arc<TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Open a session; with an initiator, their signature is collected first
    pub async fn initiate(&self, request: &MultiSigRequest) -> SigningResult<MultiSigSigningResponse> {
        self.validate(request).map_err(|e| {
            self.record(AuditEventType::ValidationFailed, AuditSeverity::Warning, &request.id, |b| {
                b.operation("initiate").error(&e.to_string())
            });
            e.for_request(&request.id)
        })?;

        let now = current_timestamp_ms();
        let lifetime_ms = request
            .timeout_ms
            .unwrap_or(self.config.default_timeout.as_millis() as u64);
        let session = MultiSigSession {
            transaction_id: request.id.clone(),
            chain_id: request.chain_id.clone(),
            topic: request.topic.clone(),
            payload: request.payload.clone(),
            required_signatures: request.required_signatures,
            signers: request.signers.iter().map(|s| s.trim().to_string()).collect(),
            signatures: Vec::new(),
            status: MultiSigStatus::Pending,
            created_at: now,
            expires_at: now.saturating_add(lifetime_ms),
            completed_at: None,
        };

        let response = self.insert_session(session, now)?;

        log_info!(
            "multisig",
            "Multi-sig session opened",
            transaction_id = request.id,
            required = request.required_signatures,
            signers = request.signers.len()
        );
        self.record(AuditEventType::MultiSigInitiated, AuditSeverity::Info, &request.id, |b| {
            b.operation("initiate").context(&format!(
                "{} of {}",
                request.required_signatures,
                request.signers.len()
            ))
        });

        let Some(initiator) = &request.initiator else {
            return Ok(response);
        };

        // Creation is all-or-nothing when the initiator must sign
        match self.sign_as(&request.id, initiator, &request.topic).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if let Ok(mut sessions) = self.sessions.write() {
                    sessions.remove(&request.id);
                }
                Err(e.for_request(&request.id))
            }
        }
    }

    /// Accept one signature. Checks run in order under the session mutex:
    /// live session, expiry, authorization, duplicate.
    pub fn add_signature(
        &self,
        transaction_id: &str,
        signer: &str,
        signature: &str,
    ) -> SigningResult<MultiSigSigningResponse> {
        if signature.trim().is_empty() {
            return Err(SigningError::invalid_request("signature is empty").for_request(transaction_id));
        }

        self.with_session(transaction_id, |session| {
            match session.status {
                MultiSigStatus::Cancelled => {
                    return Err(SigningError::invalid_request("multi-sig session was cancelled"));
                }
                MultiSigStatus::Expired => {
                    return Err(SigningError::timeout("multi-sig session expired"));
                }
                MultiSigStatus::Pending | MultiSigStatus::Completed => {}
            }

            let now = current_timestamp_ms();
            if now > session.expires_at {
                if session.refresh_expiry(now) {
                    self.record_expired(session);
                }
                return Err(SigningError::timeout("multi-sig session expired"));
            }

            if !session.is_authorized(signer) {
                return Err(SigningError::invalid_request(format!(
                    "{} is not an authorized signer",
                    signer
                )));
            }
            if session.has_signed(signer) {
                return Err(SigningError::invalid_request(format!("{} has already signed", signer)));
            }

            session.signatures.push(CollectedSignature {
                signer: signer.trim().to_string(),
                signature: signature.trim().to_string(),
                added_at: now,
            });

            let completed_by_this_call = session.status == MultiSigStatus::Pending && session.quorum_met();
            if completed_by_this_call {
                session.status = MultiSigStatus::Completed;
                session.completed_at = Some(now);
            }

            self.record(AuditEventType::MultiSigSignatureAdded, AuditSeverity::Info, transaction_id, |b| {
                b.operation("add_signature")
                    .signer(signer)
                    .signature(signature)
                    .context(&format!("{}/{}", session.signatures.len(), session.required_signatures))
            });
            if completed_by_this_call {
                log_info!(
                    "multisig",
                    "Multi-sig quorum reached",
                    transaction_id = transaction_id,
                    signer = signer,
                    collected = session.signatures.len()
                );
                self.record(AuditEventType::MultiSigCompleted, AuditSeverity::Info, transaction_id, |b| {
                    b.operation("add_signature").signer(signer).result("quorum")
                });
            }

            Ok(session.to_response(completed_by_this_call))
        })
    }

    /// Submit several signatures; a rejected one does not stop the rest
    pub fn add_signatures(&self, transaction_id: &str, submissions: &[(String, String)]) -> MultiSigBatchOutcome {
        let mut outcome = MultiSigBatchOutcome {
            accepted: Vec::new(),
            failures: Vec::new(),
            session: None,
            completed_by: None,
        };

        for (signer, signature) in submissions {
            match self.add_signature(transaction_id, signer, signature) {
                Ok(response) => {
                    if response.completed_by_this_call {
                        outcome.completed_by = Some(signer.clone());
                    }
                    outcome.accepted.push(signer.clone());
                    outcome.session = Some(response);
                }
                Err(e) => outcome.failures.push(FailedAttempt::from_error(signer, &e)),
            }
        }

        if outcome.session.is_none() {
            outcome.session = self.get_session(transaction_id).map(|s| s.to_response(false));
        }
        outcome
    }

    /// Obtain `signer`'s signature through the signing primitive and add it
    pub async fn sign_as(&self, transaction_id: &str, signer: &str, topic: &str) -> SigningResult<MultiSigSigningResponse> {
        let tx_signer = self
            .signer
            .clone()
            .ok_or_else(|| SigningError::invalid_request("no transaction signer configured").for_request(transaction_id))?;

        // Fail fast before involving the agent; add_signature re-checks
        let (chain_id, payload) = {
            let session_ref = self.session(transaction_id)?;
            let session = session_ref
                .lock()
                .map_err(|_| SigningError::unknown("session lock poisoned").for_request(transaction_id))?;
            if !session.is_authorized(signer) {
                return Err(SigningError::invalid_request(format!(
                    "{} is not an authorized signer",
                    signer
                ))
                .for_request(transaction_id));
            }
            if session.has_signed(signer) {
                return Err(SigningError::invalid_request(format!("{} has already signed", signer))
                    .for_request(transaction_id));
            }
            (session.chain_id.clone(), session.payload.clone())
        };

        let request = TransactionSigningRequest {
            id: format!("{}:{}", transaction_id, signer.trim().to_ascii_lowercase()),
            chain_id,
            topic: topic.to_string(),
            payload,
            account: Some(signer.to_string()),
        };
        let response = tx_signer
            .sign_transaction(&request)
            .await
            .map_err(|e| e.for_request(transaction_id))?;

        self.add_signature(transaction_id, signer, &response.signature)
    }

    /// Hand out the collected signatures and evict the session
    pub fn complete(&self, transaction_id: &str) -> SigningResult<MultiSigCompletion> {
        let mut sessions = self.sessions_write()?;
        let session_ref = sessions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| SigningError::not_found("multi-sig session", transaction_id))?;
        let mut session = session_ref
            .lock()
            .map_err(|_| SigningError::unknown("session lock poisoned").for_request(transaction_id))?;

        if session.refresh_expiry(current_timestamp_ms()) {
            self.record_expired(&session);
        }
        match session.status {
            MultiSigStatus::Completed => {}
            MultiSigStatus::Expired => {
                return Err(SigningError::timeout("multi-sig session expired").for_request(transaction_id));
            }
            MultiSigStatus::Cancelled => {
                return Err(SigningError::invalid_request("multi-sig session was cancelled").for_request(transaction_id));
            }
            MultiSigStatus::Pending => {
                return Err(SigningError::invalid_request(format!(
                    "quorum not met: {} of {} signatures",
                    session.signatures.len(),
                    session.required_signatures
                ))
                .for_request(transaction_id));
            }
        }

        let completion = MultiSigCompletion {
            transaction_id: session.transaction_id.clone(),
            chain_id: session.chain_id.clone(),
            payload: session.payload.clone(),
            required_signatures: session.required_signatures,
            signatures: session.signatures.clone(),
            completed_at: session.completed_at.unwrap_or_else(current_timestamp_ms),
        };
        drop(session);
        sessions.remove(transaction_id);

        log_info!(
            "multisig",
            "Multi-sig session completed",
            transaction_id = transaction_id,
            signatures = completion.signatures.len()
        );
        Ok(completion)
    }

    pub fn cancel(&self, transaction_id: &str) -> SigningResult<MultiSigSigningResponse> {
        self.with_session(transaction_id, |session| {
            if matches!(session.status, MultiSigStatus::Cancelled | MultiSigStatus::Expired) {
                return Err(SigningError::invalid_request(format!(
                    "multi-sig session is already {}",
                    session.status
                )));
            }
            session.status = MultiSigStatus::Cancelled;

            log_warn!("multisig", "Multi-sig session cancelled", transaction_id = transaction_id);
            self.record(AuditEventType::MultiSigCancelled, AuditSeverity::Warning, transaction_id, |b| {
                b.operation("cancel")
            });
            Ok(session.to_response(false))
        })
    }

    /// Snapshot of a session, with expiry applied
    pub fn get_session(&self, transaction_id: &str) -> Option<MultiSigSession> {
        self.with_session(transaction_id, |session| {
            if session.refresh_expiry(current_timestamp_ms()) {
                self.record_expired(session);
            }
            Ok(session.clone())
        })
        .ok()
    }

    /// Ids of sessions still held, sorted
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .map(|s| {
                let mut ids: Vec<_> = s.keys().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Drop expired and cancelled sessions; returns the removed ids
    pub fn cleanup_expired(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        let Ok(mut sessions) = self.sessions.write() else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        sessions.retain(|id, session_ref| {
            let Ok(mut session) = session_ref.lock() else {
                return true;
            };
            if session.refresh_expiry(now) {
                self.record_expired(&session);
            }
            let keep = matches!(session.status, MultiSigStatus::Pending | MultiSigStatus::Completed);
            if !keep {
                removed.push(id.clone());
            }
            keep
        });

        if !removed.is_empty() {
            log_info!("multisig", "Removed stale multi-sig sessions", count = removed.len());
        }
        removed.sort();
        removed
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate(&self, request: &MultiSigRequest) -> SigningResult<()> {
        if request.id.trim().is_empty() {
            return Err(SigningError::invalid_request("transaction id is required"));
        }
        if request.chain_id.trim().is_empty() {
            return Err(SigningError::invalid_request("chain id is required"));
        }
        if request.topic.trim().is_empty() {
            return Err(SigningError::invalid_request("session topic is required"));
        }
        decode_payload(&request.payload)?;

        if request.signers.is_empty() {
            return Err(SigningError::invalid_request("at least one signer is required"));
        }
        if request.signers.len() > self.config.max_signers {
            return Err(SigningError::invalid_request(format!(
                "at most {} signers are allowed",
                self.config.max_signers
            )));
        }
        for (i, signer) in request.signers.iter().enumerate() {
            if signer.trim().is_empty() {
                return Err(SigningError::invalid_request("signer identities must be non-empty"));
            }
            if request.signers[..i].iter().any(|s| same_signer(s, signer)) {
                return Err(SigningError::invalid_request(format!("duplicate signer {}", signer)));
            }
        }
        if request.required_signatures == 0 || request.required_signatures > request.signers.len() {
            return Err(SigningError::invalid_request(format!(
                "required signatures must be between 1 and {}",
                request.signers.len()
            )));
        }
        if request.timeout_ms == Some(0) {
            return Err(SigningError::invalid_request("timeout must be positive"));
        }
        if let Some(initiator) = &request.initiator {
            if !request.signers.iter().any(|s| same_signer(s, initiator)) {
                return Err(SigningError::invalid_request("initiator must be one of the signers"));
            }
            if self.signer.is_none() {
                return Err(SigningError::invalid_request(
                    "an initiator needs a transaction signer to be configured",
                ));
            }
        }
        Ok(())
    }

    /// Store a new session unless a live one holds the id
    fn insert_session(&self, session: MultiSigSession, now: u64) -> SigningResult<MultiSigSigningResponse> {
        let id = session.transaction_id.clone();
        let mut sessions = self.sessions_write()?;

        if let Some(existing) = sessions.get(&id) {
            let live = existing
                .lock()
                .map(|mut s| {
                    s.refresh_expiry(now);
                    matches!(s.status, MultiSigStatus::Pending | MultiSigStatus::Completed)
                })
                .unwrap_or(true);
            if live {
                return Err(
                    SigningError::invalid_request(format!("a multi-sig session already exists for {}", id))
                        .for_request(&id),
                );
            }
        }

        let response = session.to_response(false);
        sessions.insert(id, Arc::new(Mutex::new(session)));
        Ok(response)
    }

    fn session(&self, transaction_id: &str) -> SigningResult<SessionRef> {
        self.sessions
            .read()
            .map_err(|_| SigningError::unknown("session table lock poisoned"))?
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| SigningError::not_found("multi-sig session", transaction_id))
    }

    /// Run `f` on a session while the table read lock is held, so the
    /// session cannot be evicted by `complete` underneath it
    fn with_session<T, F>(&self, transaction_id: &str, f: F) -> SigningResult<T>
    where
        F: FnOnce(&mut MultiSigSession) -> SigningResult<T>,
    {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SigningError::unknown("session table lock poisoned").for_request(transaction_id))?;
        let session_ref = sessions
            .get(transaction_id)
            .ok_or_else(|| SigningError::not_found("multi-sig session", transaction_id))?;
        let mut session = session_ref
            .lock()
            .map_err(|_| SigningError::unknown("session lock poisoned").for_request(transaction_id))?;
        let result = f(&mut session);
        result.map_err(|e| e.for_request(transaction_id))
    }

    fn sessions_write(&self) -> SigningResult<std::sync::RwLockWriteGuard<'_, HashMap<String, SessionRef>>> {
        self.sessions
            .write()
            .map_err(|_| SigningError::unknown("session table lock poisoned"))
    }

    fn record_expired(&self, session: &MultiSigSession) {
        log_warn!(
            "multisig",
            "Multi-sig session expired",
            transaction_id = session.transaction_id,
            collected = session.signatures.len(),
            required = session.required_signatures
        );
        self.record(
            AuditEventType::MultiSigExpired,
            AuditSeverity::Warning,
            &session.transaction_id,
            |b| b.operation("expire"),
        );
    }

    fn record<F>(&self, event: AuditEventType, severity: AuditSeverity, transaction_id: &str, build: F)
    where
        F: FnOnce(AuditBuilder) -> AuditBuilder,
    {
        if let Some(audit) = &self.audit {
            audit.log(event, severity, build(AuditBuilder::new().request(transaction_id)));
        }
    }
}

impl Default for MultiSigCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
