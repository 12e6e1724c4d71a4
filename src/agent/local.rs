//! In-process reference agent
//!
//! Holds one secp256k1 key on the agent side of the boundary. Used for
//! local development, the CLI and tests; supports scripted failures and an
//! emulated hardware device.

use super::{AgentError, AgentErrorKind, AgentSignature, DeviceHandle, DeviceInfo, SigningAgent};
use crate::eip712::{addresses_equal, checksum_address, keccak256, public_key_to_address};
use crate::hardware::DeviceType;
use crate::types::SignatureFormat;
use async_trait::async_trait;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How the emulated device behaves
#[derive(Debug, Clone)]
pub struct DeviceBehavior {
    pub firmware_version: String,
    /// Answer given at the confirmation prompt
    pub approve: bool,
    pub confirmation_delay: Duration,
    pub signing_delay: Duration,
    pub connect_failure: Option<AgentError>,
}

impl Default for DeviceBehavior {
    fn default() -> Self {
        Self {
            firmware_version: "local-2.1.0".to_string(),
            approve: true,
            confirmation_delay: Duration::ZERO,
            signing_delay: Duration::ZERO,
            connect_failure: None,
        }
    }
}

pub struct LocalKeyAgent {
    secret: SecretKey,
    public_key: PublicKey,
    address: String,
    /// Payload bytes -> scripted failure
    payload_failures: HashMap<Vec<u8>, AgentError>,
    typed_data_failure: Option<AgentError>,
    device: DeviceBehavior,
    calls: AtomicUsize,
    device_in_flight: AtomicUsize,
    max_device_in_flight: AtomicUsize,
}

impl LocalKeyAgent {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, AgentError> {
        let secret = SecretKey::from_slice(secret)
            .map_err(|e| AgentError::new(AgentErrorKind::InvalidRequest, e.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    pub fn from_hex(secret: &str) -> Result<Self, AgentError> {
        let digits = secret.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits)
            .map_err(|e| AgentError::new(AgentErrorKind::InvalidRequest, e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Fresh random key
    pub fn random() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self::from_secret(secret)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret);
        let address = checksum_address(&public_key_to_address(&public_key));

        Self {
            secret,
            public_key,
            address,
            payload_failures: HashMap::new(),
            typed_data_failure: None,
            device: DeviceBehavior::default(),
            calls: AtomicUsize::new(0),
            device_in_flight: AtomicUsize::new(0),
            max_device_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail whenever this exact payload is signed
    pub fn with_failure(mut self, payload: &[u8], error: AgentError) -> Self {
        self.payload_failures.insert(payload.to_vec(), error);
        self
    }

    pub fn with_typed_data_failure(mut self, error: AgentError) -> Self {
        self.typed_data_failure = Some(error);
        self
    }

    pub fn with_device(mut self, device: DeviceBehavior) -> Self {
        self.device = device;
        self
    }

    /// EIP-55 address of the held key
    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// 0x-prefixed compressed public key
    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key.serialize()))
    }

    /// Signing calls received (transaction, typed data and device)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping device signing calls observed
    pub fn max_concurrent_device_calls(&self) -> usize {
        self.max_device_in_flight.load(Ordering::SeqCst)
    }

    /// Recoverable signature r || s || v (v = 27/28) over a 32-byte digest
    pub fn sign_digest(&self, digest: &[u8; 32]) -> [u8; 65] {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest);
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8 + 27;
        out
    }

    fn sign_payload(&self, payload: &[u8]) -> Result<AgentSignature, AgentError> {
        if let Some(error) = self.payload_failures.get(payload) {
            return Err(error.clone());
        }
        if payload.is_empty() {
            return Err(AgentError::new(AgentErrorKind::InvalidRequest, "empty payload"));
        }
        let signature = self.sign_digest(&keccak256(payload));
        Ok(AgentSignature::with_format(signature.to_vec(), SignatureFormat::EcdsaRecoverable))
    }
}

impl Drop for LocalKeyAgent {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

#[async_trait]
impl SigningAgent for LocalKeyAgent {
    async fn sign_transaction(&self, _topic: &str, payload: &[u8]) -> Result<AgentSignature, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sign_payload(payload)
    }

    async fn sign_typed_data_digest(
        &self,
        _topic: &str,
        digest: &[u8; 32],
        account: &str,
    ) -> Result<AgentSignature, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.typed_data_failure {
            return Err(error.clone());
        }
        if !addresses_equal(account, &self.address) {
            return Err(AgentError::new(
                AgentErrorKind::InvalidRequest,
                format!("account {} is not held by this agent", account),
            ));
        }
        Ok(AgentSignature::with_format(
            self.sign_digest(digest).to_vec(),
            SignatureFormat::EcdsaRecoverable,
        ))
    }

    async fn connect_device(
        &self,
        _topic: &str,
        _device_type: DeviceType,
        _derivation_path: &str,
    ) -> Result<DeviceInfo, AgentError> {
        if let Some(error) = &self.device.connect_failure {
            return Err(error.clone());
        }
        Ok(DeviceInfo {
            firmware_version: self.device.firmware_version.clone(),
        })
    }

    async fn display_on_device(
        &self,
        _topic: &str,
        _device: &DeviceHandle,
        _payload: &[u8],
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn await_device_confirmation(&self, _topic: &str, _device: &DeviceHandle) -> Result<bool, AgentError> {
        if !self.device.confirmation_delay.is_zero() {
            tokio::time::sleep(self.device.confirmation_delay).await;
        }
        Ok(self.device.approve)
    }

    async fn sign_with_device(
        &self,
        _topic: &str,
        _device: &DeviceHandle,
        payload: &[u8],
    ) -> Result<AgentSignature, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.device_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_device_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.device.signing_delay.is_zero() {
            tokio::time::sleep(self.device.signing_delay).await;
        }
        let result = self.sign_payload(payload);

        self.device_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_transaction_is_recoverable() {
        let agent = LocalKeyAgent::random();
        let sig = agent.sign_transaction("t", b"\x02\xf8payload").await.unwrap();
        assert_eq!(sig.bytes.len(), 65);
        assert!(sig.bytes[64] == 27 || sig.bytes[64] == 28);
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let agent = LocalKeyAgent::random().with_failure(b"bad", AgentError::untyped("nonce too low"));
        let err = agent.sign_transaction("t", b"bad").await.unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::Untyped);
        assert!(agent.sign_transaction("t", b"good").await.is_ok());
    }

    #[tokio::test]
    async fn test_typed_data_account_must_match() {
        let agent = LocalKeyAgent::random();
        let err = agent
            .sign_typed_data_digest("t", &[1u8; 32], "0x0000000000000000000000000000000000000001")
            .await
            .unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::InvalidRequest);

        let ok = agent
            .sign_typed_data_digest("t", &[1u8; 32], &agent.address().to_lowercase())
            .await;
        assert!(ok.is_ok());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(LocalKeyAgent::from_bytes(&[0u8; 32]).is_err());
        assert!(LocalKeyAgent::from_hex("zz").is_err());
    }
}
