//! Unified error types for the signing engine
//!
//! Every failure that leaves a component carries an [`ErrorReason`] from one
//! closed taxonomy, plus a `retryable` flag derived purely from that reason.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all signing operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningError {
    pub reason: ErrorReason,
    pub message: String,
    /// Id of the request (or batch item) that failed, when known
    pub request_id: Option<String>,
    pub details: Option<String>,
}

impl SigningError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Whether a caller may retry the same request unchanged
    pub fn retryable(&self) -> bool {
        self.reason.is_retryable()
    }

    // Convenience constructors
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::InvalidRequest, msg)
    }

    pub fn user_rejected(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::UserRejected, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::Timeout, msg)
    }

    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::NetworkError, msg)
    }

    pub fn hardware_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::HardwareError, msg)
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::InsufficientFunds, msg)
    }

    pub fn nonce_conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::NonceConflict, msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(ErrorReason::Unknown, msg)
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::invalid_request(format!("{} not found: {}", what, id)).for_request(id)
    }
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason, self.message)?;
        if let Some(ref id) = self.request_id {
            write!(f, " (request {})", id)?;
        }
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for SigningError {}

/// Closed failure taxonomy shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Malformed input, caught before any agent call
    InvalidRequest,
    /// The agent or device declined
    UserRejected,
    /// The agent or device did not answer in time
    Timeout,
    /// The channel to the agent failed
    NetworkError,
    /// Device-level fault
    HardwareError,
    /// Requires user action before resubmitting
    InsufficientFunds,
    /// Caller must resequence
    NonceConflict,
    Unknown,
}

impl ErrorReason {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorReason::Timeout | ErrorReason::NetworkError | ErrorReason::HardwareError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::InvalidRequest => "invalid_request",
            ErrorReason::UserRejected => "user_rejected",
            ErrorReason::Timeout => "timeout",
            ErrorReason::NetworkError => "network_error",
            ErrorReason::HardwareError => "hardware_error",
            ErrorReason::InsufficientFunds => "insufficient_funds",
            ErrorReason::NonceConflict => "nonce_conflict",
            ErrorReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

// Conversions from common error types

impl From<serde_json::Error> for SigningError {
    fn from(e: serde_json::Error) -> Self {
        SigningError::invalid_request(format!("JSON error: {}", e))
    }
}

impl From<hex::FromHexError> for SigningError {
    fn from(e: hex::FromHexError) -> Self {
        SigningError::invalid_request(format!("Hex error: {}", e))
    }
}

impl From<secp256k1::Error> for SigningError {
    fn from(e: secp256k1::Error) -> Self {
        SigningError::invalid_request(format!("Secp256k1 error: {}", e))
    }
}
