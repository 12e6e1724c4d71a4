//! Agent error classification

use super::{AgentError, AgentErrorKind};
use crate::error::ErrorReason;

/// Map an agent failure onto the engine's reason taxonomy
pub fn determine_error_reason(error: &AgentError) -> ErrorReason {
    match error.kind {
        AgentErrorKind::Rejected => ErrorReason::UserRejected,
        AgentErrorKind::Timeout => ErrorReason::Timeout,
        AgentErrorKind::Network => ErrorReason::NetworkError,
        AgentErrorKind::Device => ErrorReason::HardwareError,
        AgentErrorKind::InsufficientFunds => ErrorReason::InsufficientFunds,
        AgentErrorKind::NonceConflict => ErrorReason::NonceConflict,
        AgentErrorKind::InvalidRequest => ErrorReason::InvalidRequest,
        AgentErrorKind::Untyped => classify_message(&error.message),
    }
}

/// Heuristic classification for agents that only return text
///
/// Order matters: the more specific patterns are checked first, so
/// "insufficient funds for gas" is not a network problem and "Ledger
/// device disconnected" is a hardware one.
pub fn classify_message(message: &str) -> ErrorReason {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["insufficient funds", "insufficient balance", "not enough funds"]) {
        ErrorReason::InsufficientFunds
    } else if has(&["nonce"]) {
        ErrorReason::NonceConflict
    } else if has(&["rejected", "denied", "declined", "cancelled", "canceled"]) {
        ErrorReason::UserRejected
    } else if has(&["timeout", "timed out"]) {
        ErrorReason::Timeout
    } else if has(&["device", "hardware", "ledger", "trezor", "usb"]) {
        ErrorReason::HardwareError
    } else if has(&["network", "connection", "disconnected", "unreachable"]) {
        ErrorReason::NetworkError
    } else {
        ErrorReason::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_kinds_bypass_heuristics() {
        // Message text would suggest a timeout; the kind wins
        let err = AgentError::rejected("request timed out while user was deciding");
        assert_eq!(determine_error_reason(&err), ErrorReason::UserRejected);

        let err = AgentError::device("locked");
        assert_eq!(determine_error_reason(&err), ErrorReason::HardwareError);
    }

    #[test]
    fn test_untyped_messages() {
        let cases = [
            ("User rejected the request", ErrorReason::UserRejected),
            ("Request timed out", ErrorReason::Timeout),
            ("WebSocket connection closed", ErrorReason::NetworkError),
            ("Ledger device locked", ErrorReason::HardwareError),
            ("Ledger device disconnected", ErrorReason::HardwareError),
            ("USB connection lost", ErrorReason::HardwareError),
            ("relay peer disconnected", ErrorReason::NetworkError),
            ("insufficient funds for gas * price + value", ErrorReason::InsufficientFunds),
            ("nonce too low", ErrorReason::NonceConflict),
            ("something odd happened", ErrorReason::Unknown),
        ];

        for (message, expected) in cases {
            assert_eq!(classify_message(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_agent_error_into_signing_error() {
        let err: crate::error::SigningError = AgentError::network("relay down").into();
        assert_eq!(err.reason, ErrorReason::NetworkError);
        assert!(err.retryable());
    }
}
