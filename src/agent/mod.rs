//! Signing Agent Interface
//!
//! The engine never holds key material. Every signature comes from an
//! external agent (wallet extension, remote signer or hardware device)
//! reached through an opaque `topic`.
//!
//! Agents report failures as [`AgentError`] with a structured
//! [`AgentErrorKind`]; untyped failures are classified from their message
//! text as a last resort (see [`determine_error_reason`]).

mod classify;
mod local;

pub use classify::*;
pub use local::*;

use crate::error::{ErrorReason, SigningError};
use crate::hardware::DeviceType;
use crate::types::SignatureFormat;
use async_trait::async_trait;

/// Raw signature returned by an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSignature {
    pub bytes: Vec<u8>,
    /// Declared scheme; inferred from length when absent
    pub format: Option<SignatureFormat>,
}

impl AgentSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, format: None }
    }

    pub fn with_format(bytes: Vec<u8>, format: SignatureFormat) -> Self {
        Self {
            bytes,
            format: Some(format),
        }
    }
}

/// Category of an agent-side failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    /// The user declined on the agent or device
    Rejected,
    Timeout,
    /// Channel to the agent is down
    Network,
    /// Device fault (locked, disconnected, wrong app open)
    Device,
    InsufficientFunds,
    NonceConflict,
    /// The agent refused the request as malformed
    InvalidRequest,
    /// Agent gave no structure; classify from the message
    Untyped,
}

/// Failure reported by a signing agent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Rejected, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Network, message)
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Device, message)
    }

    pub fn untyped(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Untyped, message)
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::device(format!("agent does not support {}", operation))
    }

    /// Engine-level reason for this failure
    pub fn reason(&self) -> ErrorReason {
        determine_error_reason(self)
    }
}

impl From<AgentError> for SigningError {
    fn from(e: AgentError) -> Self {
        SigningError::new(e.reason(), e.message)
    }
}

/// Device identity passed to device-specific agent calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub device_id: String,
    pub device_type: DeviceType,
    pub derivation_path: String,
}

/// What a device reports when a session is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware_version: String,
}

/// External signing agent
///
/// Software agents only need the first two methods; the device methods
/// default to a `hardware_error` failure.
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Sign a raw transaction
    async fn sign_transaction(&self, topic: &str, payload: &[u8])
        -> Result<AgentSignature, AgentError>;

    /// Sign a precomputed 32-byte typed-data digest on behalf of `account`
    async fn sign_typed_data_digest(
        &self,
        topic: &str,
        digest: &[u8; 32],
        account: &str,
    ) -> Result<AgentSignature, AgentError>;

    /// Open a session with a hardware device
    async fn connect_device(
        &self,
        _topic: &str,
        _device_type: DeviceType,
        _derivation_path: &str,
    ) -> Result<DeviceInfo, AgentError> {
        Err(AgentError::unsupported("hardware devices"))
    }

    /// Show the transaction on the device screen
    async fn display_on_device(
        &self,
        _topic: &str,
        _device: &DeviceHandle,
        _payload: &[u8],
    ) -> Result<(), AgentError> {
        Err(AgentError::unsupported("on-device display"))
    }

    /// Wait for the user to approve (`true`) or decline (`false`) on the device
    async fn await_device_confirmation(
        &self,
        _topic: &str,
        _device: &DeviceHandle,
    ) -> Result<bool, AgentError> {
        Err(AgentError::unsupported("on-device confirmation"))
    }

    /// Sign with the key at the device's derivation path
    async fn sign_with_device(
        &self,
        _topic: &str,
        _device: &DeviceHandle,
        _payload: &[u8],
    ) -> Result<AgentSignature, AgentError> {
        Err(AgentError::unsupported("device signing"))
    }
}
