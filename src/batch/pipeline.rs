use super::simulation::{PayloadSimulator, TransactionSimulator};
use crate::config::BatchConfig;
use crate::error::{SigningError, SigningResult};
use crate::tx::TransactionSigner;
use crate::types::{
    decode_payload, BatchProgress, BatchSigningRequest, BatchSigningResponse, BatchStatus,
    FailedAttempt, TransactionSigningRequest,
};
use crate::utils::audit::{AuditBuilder, AuditEventType, AuditLog, AuditSeverity};
use crate::utils::{current_timestamp_ms, generate_id};
use crate::{log_debug, log_info, log_warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Progress bands: simulation fills 0-25, signing 25-90, compilation 90-100
const SIMULATION_END: usize = 25;
const SIGNING_END: usize = 90;

/// In-flight state of one batch; dropped once its result is compiled
#[derive(Debug, Clone)]
struct BatchSession {
    request_id: String,
    status: BatchStatus,
    progress: u8,
    current_transaction: Option<String>,
    processed: usize,
    total: usize,
}

/// Signs every transaction of a batch in input order
///
/// Per-transaction failures become [`FailedAttempt`]s and never abort the
/// rest of the batch.
pub struct BatchSigningPipeline {
    signer: Arc<TransactionSigner>,
    simulator: Arc<dyn TransactionSimulator>,
    config: BatchConfig,
    sessions: RwLock<HashMap<String, BatchSession>>,
    results: RwLock<HashMap<String, BatchSigningResponse>>,
    audit: Option<Arc<AuditLog>>,
}

impl BatchSigningPipeline {
    pub fn new(signer: Arc<TransactionSigner>) -> Self {
        Self::with_config(signer, BatchConfig::default())
    }

    pub fn with_config(signer: Arc<TransactionSigner>, config: BatchConfig) -> Self {
        Self {
            signer,
            simulator: Arc::new(PayloadSimulator::new()),
            config,
            sessions: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    /// Replace the offline simulator (e.g. with an RPC-backed one)
    pub fn with_simulator(mut self, simulator: Arc<dyn TransactionSimulator>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn sign_batch(&self, request: &BatchSigningRequest) -> SigningResult<BatchSigningResponse> {
        self.sign_batch_with_progress(request, |_| {}).await
    }

    /// Sign a batch, reporting progress at every checkpoint
    ///
    /// The first callback carries the generated batch id, which is what
    /// [`Self::cancel_batch`] expects.
    pub async fn sign_batch_with_progress<F>(
        &self,
        request: &BatchSigningRequest,
        on_progress: F,
    ) -> SigningResult<BatchSigningResponse>
    where
        F: Fn(&BatchProgress) + Send + Sync,
    {
        self.validate(request).map_err(|e| e.for_request(&request.id))?;

        let total = request.transactions.len();
        let batch_id = generate_id("batch");
        let session = BatchSession {
            request_id: request.id.clone(),
            status: BatchStatus::Pending,
            progress: 0,
            current_transaction: None,
            processed: 0,
            total,
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(batch_id.clone(), session);
        }

        log_info!(
            "batch",
            "Batch started",
            batch_id = batch_id,
            request_id = request.id,
            transactions = total
        );
        self.audit_event(
            AuditEventType::BatchStarted,
            AuditSeverity::Info,
            AuditBuilder::new()
                .request(&batch_id)
                .operation("sign_batch")
                .context(&format!("{} transactions", total)),
        );

        on_progress(&self.checkpoint(&batch_id, BatchStatus::Pending, 0, None, 0)?);

        // Simulation: 0-25%
        let simulate = request.simulate.unwrap_or(self.config.simulate_by_default);
        if simulate {
            for (index, tx) in request.transactions.iter().enumerate() {
                let progress = band(0, SIMULATION_END, index, total);
                on_progress(&self.checkpoint(&batch_id, BatchStatus::Simulating, progress, Some(&tx.id), index)?);

                match self.simulator.simulate(tx, &request.chain_id).await {
                    Ok(report) => {
                        for warning in &report.warnings {
                            log_warn!(
                                "batch",
                                "Simulation warning",
                                batch_id = batch_id,
                                transaction_id = tx.id,
                                warning = warning.message
                            );
                        }
                    }
                    Err(e) => {
                        log_warn!(
                            "batch",
                            "Simulation failed, signing anyway",
                            batch_id = batch_id,
                            transaction_id = tx.id,
                            error = e
                        );
                    }
                }
            }
        }

        // Signing: 25-90%
        let mut signatures = Vec::with_capacity(total);
        let mut failed_transactions = Vec::new();

        for (index, tx) in request.transactions.iter().enumerate() {
            let progress = band(SIMULATION_END, SIGNING_END, index, total);
            on_progress(&self.checkpoint(&batch_id, BatchStatus::Signing, progress, Some(&tx.id), index)?);

            let single = TransactionSigningRequest {
                id: tx.id.clone(),
                chain_id: request.chain_id.clone(),
                topic: request.topic.clone(),
                payload: tx.payload.clone(),
                account: None,
            };

            match self.signer.sign_transaction(&single).await {
                Ok(response) => signatures.push(response),
                Err(e) => {
                    log_debug!(
                        "batch",
                        "Transaction failed",
                        batch_id = batch_id,
                        transaction_id = tx.id,
                        reason = e.reason
                    );
                    failed_transactions.push(FailedAttempt::from_error(&tx.id, &e));
                }
            }
        }

        // Compilation: 90-100%
        on_progress(&self.checkpoint(&batch_id, BatchStatus::Signing, SIGNING_END as u8, None, total)?);

        let response = BatchSigningResponse {
            batch_id: batch_id.clone(),
            total_signed: signatures.len(),
            total_failed: failed_transactions.len(),
            signatures,
            failed_transactions,
            timestamp: current_timestamp_ms(),
        };

        let final_status = if response.total_signed == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        };
        let finished = self.checkpoint(&batch_id, final_status, 100, None, total)?;

        if let Ok(mut results) = self.results.write() {
            results.insert(batch_id.clone(), response.clone());
        }
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&batch_id);
        }

        log_info!(
            "batch",
            "Batch completed",
            batch_id = batch_id,
            total_signed = response.total_signed,
            total_failed = response.total_failed
        );
        self.audit_event(
            AuditEventType::BatchCompleted,
            AuditSeverity::Info,
            AuditBuilder::new()
                .request(&batch_id)
                .operation("sign_batch")
                .result(&format!("{} signed, {} failed", response.total_signed, response.total_failed)),
        );

        on_progress(&finished);
        Ok(response)
    }

    /// Drop an in-flight batch; the running call fails at its next checkpoint
    pub fn cancel_batch(&self, batch_id: &str) -> SigningResult<()> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| SigningError::unknown("batch table lock poisoned"))?
            .remove(batch_id);

        match removed {
            Some(session) => {
                log_info!("batch", "Batch cancelled", batch_id = batch_id, request_id = session.request_id);
                self.audit_event(
                    AuditEventType::BatchCancelled,
                    AuditSeverity::Warning,
                    AuditBuilder::new().request(batch_id).operation("cancel_batch"),
                );
                Ok(())
            }
            None => Err(SigningError::not_found("batch", batch_id)),
        }
    }

    /// Compiled result of a finished batch
    pub fn get_batch_result(&self, batch_id: &str) -> Option<BatchSigningResponse> {
        self.results.read().ok()?.get(batch_id).cloned()
    }

    /// Ids of batches still in flight
    pub fn active_batches(&self) -> Vec<String> {
        self.sessions
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn batch_progress(&self, batch_id: &str) -> Option<BatchProgress> {
        let sessions = self.sessions.read().ok()?;
        sessions.get(batch_id).map(|s| snapshot(batch_id, s))
    }

    pub fn clear_results(&self) {
        if let Ok(mut results) = self.results.write() {
            results.clear();
        }
    }

    fn validate(&self, request: &BatchSigningRequest) -> SigningResult<()> {
        let limit = self.config.max_batch_size.min(crate::config::MAX_BATCH_SIZE);

        if request.transactions.is_empty() {
            return Err(SigningError::invalid_request("batch contains no transactions"));
        }
        if request.transactions.len() > limit {
            return Err(SigningError::invalid_request(format!(
                "batch of {} transactions exceeds the limit of {}",
                request.transactions.len(),
                limit
            )));
        }
        if request.chain_id.trim().is_empty() {
            return Err(SigningError::invalid_request("chain id is required"));
        }
        if request.topic.trim().is_empty() {
            return Err(SigningError::invalid_request("session topic is required"));
        }
        for (index, tx) in request.transactions.iter().enumerate() {
            if tx.id.trim().is_empty() {
                return Err(SigningError::invalid_request(format!(
                    "transaction at index {} has no id",
                    index
                )));
            }
            decode_payload(&tx.payload).map_err(|e| {
                SigningError::invalid_request(format!("transaction {}: {}", tx.id, e.message))
            })?;
        }
        Ok(())
    }

    /// Advance the session, or fail if it was cancelled
    fn checkpoint(
        &self,
        batch_id: &str,
        status: BatchStatus,
        progress: u8,
        current: Option<&str>,
        processed: usize,
    ) -> SigningResult<BatchProgress> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SigningError::unknown("batch table lock poisoned"))?;

        let Some(session) = sessions.get_mut(batch_id) else {
            return Err(SigningError::user_rejected("batch cancelled").for_request(batch_id));
        };

        session.status = status;
        session.progress = session.progress.max(progress);
        session.current_transaction = current.map(str::to_string);
        session.processed = processed;

        Ok(snapshot(batch_id, session))
    }

    fn audit_event(&self, event: AuditEventType, severity: AuditSeverity, builder: AuditBuilder) {
        if let Some(audit) = &self.audit {
            audit.log(event, severity, builder);
        }
    }
}

fn snapshot(batch_id: &str, session: &BatchSession) -> BatchProgress {
    BatchProgress {
        batch_id: batch_id.to_string(),
        status: session.status,
        progress: session.progress,
        current_transaction: session.current_transaction.clone(),
        processed: session.processed,
        total: session.total,
    }
}

/// Linear position of item `index` of `total` within [start, end)
fn band(start: usize, end: usize, index: usize, total: usize) -> u8 {
    (start + (end - start) * index / total.max(1)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, LocalKeyAgent};
    use crate::error::ErrorReason;
    use crate::types::BatchTransaction;
    use std::sync::Mutex;

    fn tx(id: &str, payload: &str) -> BatchTransaction {
        BatchTransaction {
            id: id.into(),
            payload: payload.into(),
            description: None,
        }
    }

    fn batch(transactions: Vec<BatchTransaction>, simulate: bool) -> BatchSigningRequest {
        BatchSigningRequest {
            id: "req-1".into(),
            chain_id: "eip155:1".into(),
            topic: "topic-1".into(),
            transactions,
            simulate: Some(simulate),
        }
    }

    fn pipeline(agent: LocalKeyAgent) -> BatchSigningPipeline {
        BatchSigningPipeline::new(Arc::new(TransactionSigner::new(Arc::new(agent))))
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let agent = LocalKeyAgent::random().with_failure(&[0x02, 0xbb, 0xbb], AgentError::untyped("nonce too low"));
        let pipeline = pipeline(agent);

        let response = pipeline
            .sign_batch(&batch(vec![tx("tx1", "0x02aaaa"), tx("tx2", "0x02bbbb")], true))
            .await
            .unwrap();

        assert_eq!(response.total_signed, 1);
        assert_eq!(response.total_failed, 1);
        assert_eq!(response.signatures[0].request_id, "tx1");
        assert_eq!(response.failed_transactions[0].request_id, "tx2");
        assert_eq!(response.failed_transactions[0].reason, ErrorReason::NonceConflict);
        assert!(!response.failed_transactions[0].retryable);

        assert_eq!(pipeline.get_batch_result(&response.batch_id), Some(response.clone()));
        assert!(pipeline.active_batches().is_empty());
    }

    #[tokio::test]
    async fn test_simulation_failure_does_not_block_signing() {
        // Two bytes: the offline simulator rejects it, the agent signs it
        let pipeline = pipeline(LocalKeyAgent::random());
        let response = pipeline
            .sign_batch(&batch(vec![tx("short", "0x0201")], true))
            .await
            .unwrap();
        assert_eq!(response.total_signed, 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_banded() {
        let pipeline = pipeline(LocalKeyAgent::random());
        let seen = Mutex::new(Vec::new());

        pipeline
            .sign_batch_with_progress(
                &batch(vec![tx("a", "0x02aa01"), tx("b", "0x02aa02"), tx("c", "0x02aa03")], false),
                |p| seen.lock().unwrap().push((p.status, p.progress)),
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
        // Simulation skipped: signing starts at 25
        assert_eq!(seen[1], (BatchStatus::Signing, 25));
        assert_eq!(seen.last(), Some(&(BatchStatus::Completed, 100)));
        assert!(!seen.iter().any(|(s, _)| *s == BatchStatus::Simulating));
    }

    #[tokio::test]
    async fn test_cancel_from_progress_callback() {
        let pipeline = pipeline(LocalKeyAgent::random());
        let transactions = (0..5).map(|i| tx(&format!("tx{}", i), "0x02aaaa")).collect();

        let err = pipeline
            .sign_batch_with_progress(&batch(transactions, false), |p| {
                if p.processed == 2 {
                    let _ = pipeline.cancel_batch(&p.batch_id);
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.reason, ErrorReason::UserRejected);
        assert_eq!(err.message, "batch cancelled");
        assert!(pipeline.active_batches().is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_whole_batch() {
        let pipeline = pipeline(LocalKeyAgent::random());

        let empty = pipeline.sign_batch(&batch(vec![], false)).await.unwrap_err();
        assert_eq!(empty.reason, ErrorReason::InvalidRequest);

        let too_many = (0..101).map(|i| tx(&format!("t{}", i), "0x02aa")).collect();
        assert!(pipeline.sign_batch(&batch(too_many, false)).await.is_err());

        let missing_payload = batch(vec![tx("ok", "0x02aa"), tx("bad", "")], false);
        assert!(pipeline.sign_batch(&missing_payload).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload_rejects_whole_batch() {
        let agent = Arc::new(LocalKeyAgent::random());
        let pipeline = BatchSigningPipeline::new(Arc::new(TransactionSigner::new(agent.clone())));

        let err = pipeline
            .sign_batch(&batch(vec![tx("tx0", "0x02aa"), tx("tx1", "0xzz")], true))
            .await
            .unwrap_err();

        assert_eq!(err.reason, ErrorReason::InvalidRequest);
        assert!(err.message.contains("tx1"));
        assert_eq!(agent.call_count(), 0);
        assert!(pipeline.active_batches().is_empty());
    }

    #[test]
    fn test_cancel_unknown_batch() {
        let pipeline = pipeline(LocalKeyAgent::random());
        let err = pipeline.cancel_batch("batch_missing").unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);
    }
}
