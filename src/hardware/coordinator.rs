//! Hardware signing coordinator
//!
//! Per request: queued -> displayed -> awaiting confirmation -> signing ->
//! signed. Display and confirmation only happen when the request asks for
//! them. A device session is opened lazily on the first request for a
//! (device type, derivation path) pair and then reused.

use super::derivation_path::DerivationPath;
use super::device::*;
use crate::agent::{DeviceHandle, SigningAgent};
use crate::config::HardwareConfig;
use crate::error::{SigningError, SigningResult};
use crate::types::{decode_payload, FailedAttempt, HardwareSigningRequest, HardwareSigningResponse, SigningResponse};
use crate::utils::audit::{AuditBuilder, AuditEventType, AuditLog, AuditSeverity};
use crate::utils::{current_timestamp_ms, generate_id};
use crate::{log_debug, log_info, log_warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Open device: its session record and the lock that serializes signing
struct DeviceSlot {
    session: RwLock<HardwareDeviceSession>,
    busy: AsyncMutex<()>,
}

impl DeviceSlot {
    fn snapshot(&self) -> Option<HardwareDeviceSession> {
        self.session.read().ok().map(|s| s.clone())
    }

    fn handle(&self) -> Option<DeviceHandle> {
        self.session.read().ok().map(|s| DeviceHandle {
            device_id: s.device_id.clone(),
            device_type: s.device_type,
            derivation_path: s.derivation_path.clone(),
        })
    }

    fn touch(&self) {
        if let Ok(mut session) = self.session.write() {
            session.last_used = current_timestamp_ms();
        }
    }
}

type DeviceKey = (DeviceType, String);

/// Removes a request from the in-flight table however the call ends
struct QueueEntry<'a> {
    table: &'a RwLock<HashMap<String, HardwareStage>>,
    request_id: String,
}

impl<'a> QueueEntry<'a> {
    fn enter(table: &'a RwLock<HashMap<String, HardwareStage>>, request_id: &str) -> SigningResult<Self> {
        let mut requests = table
            .write()
            .map_err(|_| SigningError::unknown("request table lock poisoned"))?;
        if requests.contains_key(request_id) {
            return Err(SigningError::invalid_request("request is already in flight").for_request(request_id));
        }
        requests.insert(request_id.to_string(), HardwareStage::Queued);
        Ok(Self {
            table,
            request_id: request_id.to_string(),
        })
    }

    fn set(&self, stage: HardwareStage) {
        if let Ok(mut requests) = self.table.write() {
            requests.insert(self.request_id.clone(), stage);
        }
    }
}

impl Drop for QueueEntry<'_> {
    fn drop(&mut self) {
        if let Ok(mut requests) = self.table.write() {
            requests.remove(&self.request_id);
        }
    }
}

/// Hardware wallet signing through the agent's device methods
pub struct HardwareSigningCoordinator {
    agent: Arc<dyn SigningAgent>,
    config: HardwareConfig,
    devices: RwLock<HashMap<DeviceKey, Arc<DeviceSlot>>>,
    requests: RwLock<HashMap<String, HardwareStage>>,
    audit: Option<Arc<AuditLog>>,
}

impl HardwareSigningCoordinator {
    pub fn new(agent: Arc<dyn SigningAgent>) -> Self {
        Self::with_config(agent, HardwareConfig::default())
    }

    pub fn with_config(agent: Arc<dyn SigningAgent>, config: HardwareConfig) -> Self {
        Self {
            agent,
            config,
            devices: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn sign_with_hardware(&self, request: &HardwareSigningRequest) -> SigningResult<HardwareSigningResponse> {
        self.sign_with_hardware_progress(request, |_| {}).await
    }

    /// Sign, reporting `queued`, `displayed`, `confirmed` and `signed`
    pub async fn sign_with_hardware_progress<F>(
        &self,
        request: &HardwareSigningRequest,
        on_progress: F,
    ) -> SigningResult<HardwareSigningResponse>
    where
        F: Fn(&HardwareProgress) + Send + Sync,
    {
        let (path, payload) = self.validate(request).map_err(|e| {
            self.record(AuditEventType::ValidationFailed, AuditSeverity::Warning, request, None, Some(&e));
            e.for_request(&request.id)
        })?;

        let result = self.run(request, &path, &payload, &on_progress).await;
        match &result {
            Ok(response) => {
                self.record(
                    AuditEventType::HardwareSigned,
                    AuditSeverity::Info,
                    request,
                    Some(&response.response.signature),
                    None,
                );
            }
            Err(e) => {
                log_warn!(
                    "hardware",
                    "Hardware signing failed",
                    request_id = request.id,
                    device = request.device.device_type,
                    reason = e.reason
                );
                self.record(AuditEventType::HardwareRejected, AuditSeverity::Warning, request, None, Some(e));
            }
        }
        result
    }

    async fn run<F>(
        &self,
        request: &HardwareSigningRequest,
        path: &DerivationPath,
        payload: &[u8],
        on_progress: &F,
    ) -> SigningResult<HardwareSigningResponse>
    where
        F: Fn(&HardwareProgress) + Send + Sync,
    {
        let fail = |e: SigningError| e.for_request(&request.id);
        let entry = QueueEntry::enter(&self.requests, &request.id)?;
        let emit = |device_id: Option<&str>, stage: HardwareStage| {
            on_progress(&HardwareProgress {
                request_id: request.id.clone(),
                device_id: device_id.map(str::to_string),
                stage,
            });
        };
        emit(None, HardwareStage::Queued);

        let descriptor = &request.device;
        let slot = self.open_device(&request.topic, descriptor.device_type, path).await.map_err(fail)?;

        // Single writer per device; held across every agent call below
        let _busy = slot.busy.lock().await;

        let device = slot
            .handle()
            .ok_or_else(|| fail(SigningError::unknown("device session lock poisoned")))?;
        if !self.is_open(&device.device_id) {
            return Err(fail(SigningError::hardware_error(format!(
                "device {} was disconnected",
                device.device_id
            ))));
        }

        if descriptor.require_confirmation {
            self.agent
                .display_on_device(&request.topic, &device, payload)
                .await
                .map_err(|e| fail(e.into()))?;
            entry.set(HardwareStage::Displayed);
            emit(Some(&device.device_id), HardwareStage::Displayed);

            entry.set(HardwareStage::AwaitingConfirmation);
            let wait = descriptor
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.default_confirmation_timeout);

            let confirmation = tokio::time::timeout(
                wait,
                self.agent.await_device_confirmation(&request.topic, &device),
            )
            .await;
            match confirmation {
                Err(_) => {
                    return Err(fail(SigningError::user_rejected(format!(
                        "no confirmation on device within {} ms",
                        wait.as_millis()
                    ))));
                }
                Ok(Err(e)) => return Err(fail(e.into())),
                Ok(Ok(false)) => return Err(fail(SigningError::user_rejected("declined on device"))),
                Ok(Ok(true)) => {}
            }
            entry.set(HardwareStage::Confirmed);
            emit(Some(&device.device_id), HardwareStage::Confirmed);
        }

        entry.set(HardwareStage::Signing);
        let signature = self
            .agent
            .sign_with_device(&request.topic, &device, payload)
            .await
            .map_err(|e| fail(e.into()))?;
        let response = SigningResponse::from_signature(&request.id, &signature.bytes, signature.format)?;

        slot.touch();
        entry.set(HardwareStage::Signed);
        emit(Some(&device.device_id), HardwareStage::Signed);

        log_info!(
            "hardware",
            "Signed on device",
            request_id = request.id,
            device_id = device.device_id,
            confirmed = descriptor.require_confirmation
        );

        Ok(HardwareSigningResponse {
            response,
            device_id: device.device_id,
            device_type: device.device_type,
            derivation_path: device.derivation_path,
            confirmed_on_device: descriptor.require_confirmation,
        })
    }

    /// Sign sequentially; stop after a failure on a confirmation-requiring item
    pub async fn batch_sign_with_hardware(&self, requests: &[HardwareSigningRequest]) -> HardwareBatchResult {
        let mut result = HardwareBatchResult::default();

        for (index, request) in requests.iter().enumerate() {
            match self.sign_with_hardware(request).await {
                Ok(response) => result.responses.push(response),
                Err(e) => {
                    result.failures.push(FailedAttempt::from_error(&request.id, &e));
                    if request.device.require_confirmation {
                        result.halted = true;
                        result.skipped = requests[index + 1..].iter().map(|r| r.id.clone()).collect();
                        break;
                    }
                }
            }
        }

        if result.halted {
            log_warn!(
                "hardware",
                "Hardware batch halted",
                signed = result.responses.len(),
                skipped = result.skipped.len()
            );
        }
        result
    }

    /// Open device sessions
    pub fn device_sessions(&self) -> Vec<HardwareDeviceSession> {
        let Ok(devices) = self.devices.read() else {
            return Vec::new();
        };
        let mut sessions: Vec<_> = devices.values().filter_map(|slot| slot.snapshot()).collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    /// Drop a device session; the next request for its path reconnects
    pub fn disconnect(&self, device_id: &str) -> SigningResult<HardwareDeviceSession> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| SigningError::unknown("device table lock poisoned"))?;

        let key = devices
            .iter()
            .find(|(_, slot)| slot.snapshot().map(|s| s.device_id == device_id).unwrap_or(false))
            .map(|(key, _)| key.clone())
            .ok_or_else(|| SigningError::not_found("device", device_id))?;

        let slot = devices
            .remove(&key)
            .ok_or_else(|| SigningError::not_found("device", device_id))?;
        drop(devices);

        let mut session = slot
            .snapshot()
            .ok_or_else(|| SigningError::unknown("device session lock poisoned"))?;
        session.connected = false;
        if let Ok(mut stored) = slot.session.write() {
            stored.connected = false;
        }

        if let Some(audit) = &self.audit {
            audit.log(
                AuditEventType::DeviceDisconnected,
                AuditSeverity::Info,
                AuditBuilder::new()
                    .operation("disconnect")
                    .context(&format!("{} {} {}", session.device_id, session.device_type, session.derivation_path)),
            );
        }
        log_info!("hardware", "Device disconnected", device_id = device_id);
        Ok(session)
    }

    /// Ids of requests queued or in progress
    pub fn queued_requests(&self) -> Vec<String> {
        self.requests
            .read()
            .map(|r| {
                let mut ids: Vec<_> = r.keys().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    pub fn request_state(&self, request_id: &str) -> Option<HardwareStage> {
        self.requests.read().ok()?.get(request_id).copied()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate(&self, request: &HardwareSigningRequest) -> SigningResult<(DerivationPath, Vec<u8>)> {
        if request.id.trim().is_empty() {
            return Err(SigningError::invalid_request("request id is required"));
        }
        if request.chain_id.trim().is_empty() {
            return Err(SigningError::invalid_request("chain id is required"));
        }
        if request.topic.trim().is_empty() {
            return Err(SigningError::invalid_request("session topic is required"));
        }
        if !self.config.supported_devices.contains(&request.device.device_type) {
            return Err(SigningError::invalid_request(format!(
                "unsupported device type: {}",
                request.device.device_type
            )));
        }
        if request.device.timeout_ms == Some(0) {
            return Err(SigningError::invalid_request("confirmation timeout must be positive"));
        }

        let path: DerivationPath = request.device.derivation_path.parse()?;
        for warning in path.warnings() {
            log_warn!(
                "hardware",
                "Unusual derivation path",
                request_id = request.id,
                path = path,
                warning = warning
            );
        }

        let payload = decode_payload(&request.payload)?;
        Ok((path, payload))
    }

    fn is_open(&self, device_id: &str) -> bool {
        self.devices
            .read()
            .map(|d| d.values().any(|slot| slot.snapshot().map(|s| s.device_id == device_id).unwrap_or(false)))
            .unwrap_or(false)
    }

    /// Existing session for the pair, or connect through the agent
    async fn open_device(&self, topic: &str, device_type: DeviceType, path: &DerivationPath) -> SigningResult<Arc<DeviceSlot>> {
        let key = (device_type, path.to_string());

        let existing = self
            .devices
            .read()
            .map_err(|_| SigningError::unknown("device table lock poisoned"))?
            .get(&key)
            .cloned();
        if let Some(slot) = existing {
            return Ok(slot);
        }

        log_debug!("hardware", "Connecting device", device = device_type, path = key.1);
        let info = self.agent.connect_device(topic, device_type, &key.1).await?;

        let now = current_timestamp_ms();
        let session = HardwareDeviceSession {
            device_id: generate_id(device_type.as_str()),
            device_type,
            derivation_path: key.1.clone(),
            connected: true,
            connected_at: now,
            last_used: now,
            firmware_version: info.firmware_version,
        };

        let mut devices = self
            .devices
            .write()
            .map_err(|_| SigningError::unknown("device table lock poisoned"))?;

        // A concurrent request may have connected the same pair meanwhile
        if let Some(existing) = devices.get(&key) {
            return Ok(Arc::clone(existing));
        }

        log_info!(
            "hardware",
            "Device connected",
            device_id = session.device_id,
            device = device_type,
            firmware = session.firmware_version
        );
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEventType::DeviceConnected,
                AuditSeverity::Info,
                AuditBuilder::new()
                    .operation("connect")
                    .context(&format!("{} {} {}", session.device_id, device_type, key.1)),
            );
        }

        let slot = Arc::new(DeviceSlot {
            session: RwLock::new(session),
            busy: AsyncMutex::new(()),
        });
        devices.insert(key, Arc::clone(&slot));
        Ok(slot)
    }

    fn record(
        &self,
        event: AuditEventType,
        severity: AuditSeverity,
        request: &HardwareSigningRequest,
        signature: Option<&str>,
        error: Option<&SigningError>,
    ) {
        let Some(audit) = &self.audit else { return };
        let mut builder = AuditBuilder::new()
            .request(&request.id)
            .operation("sign_with_hardware")
            .context(&format!("{} {}", request.device.device_type, request.device.derivation_path));
        if let Some(signature) = signature {
            builder = builder.signature(signature);
        }
        if let Some(error) = error {
            builder = builder.error(&error.to_string()).result(error.reason.as_str());
        }
        audit.log(event, severity, builder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, DeviceBehavior, LocalKeyAgent};
    use crate::error::ErrorReason;
    use crate::types::HardwareDescriptor;
    use std::sync::Mutex;

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn agent(device: DeviceBehavior) -> Arc<LocalKeyAgent> {
        Arc::new(LocalKeyAgent::from_hex(TEST_KEY).unwrap().with_device(device))
    }

    fn request(id: &str, path: &str, confirm: bool) -> HardwareSigningRequest {
        HardwareSigningRequest {
            id: id.into(),
            chain_id: "eip155:1".into(),
            topic: "topic-hw".into(),
            device: HardwareDescriptor {
                device_type: DeviceType::Ledger,
                derivation_path: path.into(),
                require_confirmation: confirm,
                timeout_ms: None,
            },
            payload: format!("0x02f8{}", hex::encode(id)),
        }
    }

    #[tokio::test]
    async fn test_sign_reuses_device_session() {
        let agent = agent(DeviceBehavior::default());
        let coordinator = HardwareSigningCoordinator::new(agent.clone());

        let first = coordinator
            .sign_with_hardware(&request("hw-1", "m/44'/60'/0'/0/0", false))
            .await
            .unwrap();
        let second = coordinator
            .sign_with_hardware(&request("hw-2", "m/44'/60'/0'/0/0", false))
            .await
            .unwrap();

        assert_eq!(first.device_id, second.device_id);
        assert_eq!(first.response.signature.len(), 2 + 130);
        assert!(!first.confirmed_on_device);

        let sessions = coordinator.device_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].firmware_version, "local-2.1.0");
        assert!(sessions[0].last_used >= sessions[0].connected_at);
        assert!(coordinator.queued_requests().is_empty());
    }

    #[tokio::test]
    async fn test_progress_stages_with_confirmation() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior::default()));
        let stages = Mutex::new(Vec::new());

        let response = coordinator
            .sign_with_hardware_progress(&request("hw-1", "m/44'/60'/0'/0/0", true), |p| {
                stages.lock().unwrap().push(p.stage);
            })
            .await
            .unwrap();

        assert!(response.confirmed_on_device);
        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                HardwareStage::Queued,
                HardwareStage::Displayed,
                HardwareStage::Confirmed,
                HardwareStage::Signed
            ]
        );
    }

    #[tokio::test]
    async fn test_request_state_visible_while_in_flight() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior {
            confirmation_delay: Duration::from_millis(50),
            ..Default::default()
        }));
        let req = request("hw-slow", "m/44'/60'/0'/0/0", true);

        let (result, observed) = tokio::join!(coordinator.sign_with_hardware(&req), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            (coordinator.request_state("hw-slow"), coordinator.queued_requests())
        });

        assert!(result.is_ok());
        assert_eq!(observed.0, Some(HardwareStage::AwaitingConfirmation));
        assert_eq!(observed.1, vec!["hw-slow".to_string()]);
        assert_eq!(coordinator.request_state("hw-slow"), None);
    }

    #[tokio::test]
    async fn test_same_device_is_single_writer() {
        let agent = agent(DeviceBehavior {
            signing_delay: Duration::from_millis(30),
            ..Default::default()
        });
        let coordinator = HardwareSigningCoordinator::new(agent.clone());
        let a = request("hw-a", "m/44'/60'/0'/0/0", false);
        let b = request("hw-b", "m/44'/60'/0'/0/0", false);

        let (ra, rb) = tokio::join!(coordinator.sign_with_hardware(&a), coordinator.sign_with_hardware(&b));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(agent.max_concurrent_device_calls(), 1);
    }

    #[tokio::test]
    async fn test_different_devices_run_concurrently() {
        let agent = agent(DeviceBehavior {
            signing_delay: Duration::from_millis(30),
            ..Default::default()
        });
        let coordinator = HardwareSigningCoordinator::new(agent.clone());

        // Warm both sessions so the signing calls overlap
        coordinator.sign_with_hardware(&request("w-0", "m/44'/60'/0'/0/0", false)).await.unwrap();
        coordinator.sign_with_hardware(&request("w-1", "m/44'/60'/0'/0/1", false)).await.unwrap();

        let a = request("hw-a", "m/44'/60'/0'/0/0", false);
        let b = request("hw-b", "m/44'/60'/0'/0/1", false);
        let (ra, rb) = tokio::join!(coordinator.sign_with_hardware(&a), coordinator.sign_with_hardware(&b));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(agent.max_concurrent_device_calls(), 2);
        assert_eq!(coordinator.device_sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_user_rejected() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior {
            confirmation_delay: Duration::from_millis(200),
            ..Default::default()
        }));
        let mut req = request("hw-1", "m/44'/60'/0'/0/0", true);
        req.device.timeout_ms = Some(20);

        let err = coordinator.sign_with_hardware(&req).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::UserRejected);
        assert_eq!(err.request_id.as_deref(), Some("hw-1"));
        assert!(coordinator.queued_requests().is_empty());
    }

    #[tokio::test]
    async fn test_decline_on_device() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior {
            approve: false,
            ..Default::default()
        }));
        let err = coordinator
            .sign_with_hardware(&request("hw-1", "m/44'/60'/0'/0/0", true))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::UserRejected);
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_agent() {
        let agent = agent(DeviceBehavior::default());
        let config = HardwareConfig {
            supported_devices: vec![DeviceType::Trezor],
            ..Default::default()
        };
        let coordinator = HardwareSigningCoordinator::with_config(agent.clone(), config);

        let err = coordinator
            .sign_with_hardware(&request("hw-1", "m/44'/60'/0'/0/0", false))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);

        let mut bad_path = request("hw-2", "44'/60'", false);
        bad_path.device.device_type = DeviceType::Trezor;
        let err = coordinator.sign_with_hardware(&bad_path).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);

        let mut no_payload = request("hw-3", "m/44'/60'/0'", false);
        no_payload.device.device_type = DeviceType::Trezor;
        no_payload.payload = String::new();
        let err = coordinator.sign_with_hardware(&no_payload).await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);

        assert_eq!(agent.call_count(), 0);
        assert!(coordinator.device_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_hardware_error() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior {
            connect_failure: Some(AgentError::device("device locked")),
            ..Default::default()
        }));
        let err = coordinator
            .sign_with_hardware(&request("hw-1", "m/44'/60'/0'/0/0", false))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::HardwareError);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn test_batch_halts_after_confirmation_failure() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior {
            approve: false,
            ..Default::default()
        }));
        let requests = vec![
            request("hw-1", "m/44'/60'/0'/0/0", false),
            request("hw-2", "m/44'/60'/0'/0/0", true),
            request("hw-3", "m/44'/60'/0'/0/0", false),
        ];

        let result = coordinator.batch_sign_with_hardware(&requests).await;
        assert_eq!(result.responses.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].request_id, "hw-2");
        assert!(result.halted);
        assert_eq!(result.skipped, vec!["hw-3".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_continues_past_plain_failures() {
        let coordinator = HardwareSigningCoordinator::new(agent(DeviceBehavior::default()));
        let mut bad = request("hw-2", "m/44'/60'/0'/0/0", false);
        bad.payload = "zz".into();
        let requests = vec![
            request("hw-1", "m/44'/60'/0'/0/0", false),
            bad,
            request("hw-3", "m/44'/60'/0'/0/0", false),
        ];

        let result = coordinator.batch_sign_with_hardware(&requests).await;
        assert_eq!(result.responses.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert!(!result.halted);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let audit = Arc::new(AuditLog::new());
        let coordinator =
            HardwareSigningCoordinator::new(agent(DeviceBehavior::default())).with_audit_log(audit.clone());
        let response = coordinator
            .sign_with_hardware(&request("hw-1", "m/44'/60'/0'/0/0", false))
            .await
            .unwrap();

        let session = coordinator.disconnect(&response.device_id).unwrap();
        assert!(!session.connected);
        assert!(coordinator.device_sessions().is_empty());

        let err = coordinator.disconnect(&response.device_id).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidRequest);

        assert_eq!(audit.query_by_type(AuditEventType::DeviceConnected).len(), 1);
        assert_eq!(audit.query_by_type(AuditEventType::HardwareSigned).len(), 1);
        assert_eq!(audit.query_by_type(AuditEventType::DeviceDisconnected).len(), 1);
    }
}
