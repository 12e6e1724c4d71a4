//! Signing Engine
//!
//! Owns one instance of every component, wired to a single agent and a
//! shared audit log. Create as many engines as needed; nothing is global.

use crate::agent::SigningAgent;
use crate::batch::BatchSigningPipeline;
use crate::config::EngineConfig;
use crate::eip712::TypedDataSigner;
use crate::error::SigningResult;
use crate::hardware::HardwareSigningCoordinator;
use crate::log_info;
use crate::multisig::MultiSigCoordinator;
use crate::tx::TransactionSigner;
use crate::types::{SigningOutcome, SigningRequest};
use crate::utils::audit::AuditLog;
use crate::verification::{SignatureVerifier, VerificationRequest, VerificationResult};
use std::sync::Arc;

pub struct SigningEngine {
    config: EngineConfig,
    audit: Arc<AuditLog>,
    transactions: Arc<TransactionSigner>,
    batches: BatchSigningPipeline,
    typed_data: TypedDataSigner,
    hardware: HardwareSigningCoordinator,
    multisig: MultiSigCoordinator,
    verifier: SignatureVerifier,
}

impl SigningEngine {
    pub fn new(agent: Arc<dyn SigningAgent>) -> SigningResult<Self> {
        Self::with_config(agent, EngineConfig::default())
    }

    pub fn with_config(agent: Arc<dyn SigningAgent>, config: EngineConfig) -> SigningResult<Self> {
        config.validate()?;

        let audit = Arc::new(AuditLog::new());
        let transactions = Arc::new(TransactionSigner::new(Arc::clone(&agent)).with_audit_log(Arc::clone(&audit)));

        let batches = BatchSigningPipeline::with_config(Arc::clone(&transactions), config.batch.clone())
            .with_audit_log(Arc::clone(&audit));
        let typed_data = TypedDataSigner::new(Arc::clone(&agent)).with_audit_log(Arc::clone(&audit));
        let hardware = HardwareSigningCoordinator::with_config(Arc::clone(&agent), config.hardware.clone())
            .with_audit_log(Arc::clone(&audit));
        let multisig = MultiSigCoordinator::with_config(config.multisig.clone())
            .with_signer(Arc::clone(&transactions))
            .with_audit_log(Arc::clone(&audit));
        let verifier = SignatureVerifier::with_config(config.verification.clone());

        log_info!(
            "engine",
            "Signing engine ready",
            max_batch_size = config.batch.max_batch_size,
            devices = config.hardware.supported_devices.len()
        );

        Ok(Self {
            config,
            audit,
            transactions,
            batches,
            typed_data,
            hardware,
            multisig,
            verifier,
        })
    }

    /// Route a request to the component for its mode
    pub async fn dispatch(&self, request: &SigningRequest) -> SigningResult<SigningOutcome> {
        match request {
            SigningRequest::Transaction(r) => self.transactions.sign_transaction(r).await.map(SigningOutcome::Transaction),
            SigningRequest::Batch(r) => self.batches.sign_batch(r).await.map(SigningOutcome::Batch),
            SigningRequest::TypedData(r) => self.typed_data.sign_typed_data(r).await.map(SigningOutcome::TypedData),
            SigningRequest::Hardware(r) => self.hardware.sign_with_hardware(r).await.map(SigningOutcome::Hardware),
            SigningRequest::MultiSig(r) => self.multisig.initiate(r).await.map(SigningOutcome::MultiSig),
        }
    }

    pub fn verify(&self, request: &VerificationRequest) -> SigningResult<VerificationResult> {
        self.verifier.verify(request)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Signing events from every component except the verifier
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn transactions(&self) -> &TransactionSigner {
        &self.transactions
    }

    pub fn batches(&self) -> &BatchSigningPipeline {
        &self.batches
    }

    pub fn typed_data(&self) -> &TypedDataSigner {
        &self.typed_data
    }

    pub fn hardware(&self) -> &HardwareSigningCoordinator {
        &self.hardware
    }

    pub fn multisig(&self) -> &MultiSigCoordinator {
        &self.multisig
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }
}
