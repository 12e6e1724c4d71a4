//! Engine configuration
//!
//! Plain settings structs with sensible defaults. Each component takes its
//! own section through `with_config`; [`EngineConfig`] bundles them for
//! [`crate::engine::SigningEngine`].

use crate::error::{SigningError, SigningResult};
use crate::hardware::DeviceType;
use std::time::Duration;

/// Hard ceiling on transactions per batch
pub const MAX_BATCH_SIZE: usize = 100;

/// Settings for every component
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub batch: BatchConfig,
    pub hardware: HardwareConfig,
    pub multisig: MultiSigConfig,
    pub verification: VerificationConfig,
}

impl EngineConfig {
    /// Short timeouts suitable for tests and local development
    pub fn development() -> Self {
        Self {
            hardware: HardwareConfig {
                default_confirmation_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            multisig: MultiSigConfig {
                default_timeout: Duration::from_secs(60),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reject settings that would break component invariants
    pub fn validate(&self) -> SigningResult<()> {
        if self.batch.max_batch_size == 0 || self.batch.max_batch_size > MAX_BATCH_SIZE {
            return Err(SigningError::invalid_request(format!(
                "max_batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.hardware.default_confirmation_timeout.is_zero() {
            return Err(SigningError::invalid_request(
                "hardware confirmation timeout must be positive",
            ));
        }
        if self.hardware.supported_devices.is_empty() {
            return Err(SigningError::invalid_request(
                "at least one hardware device family must be supported",
            ));
        }
        if self.multisig.default_timeout.is_zero() {
            return Err(SigningError::invalid_request("multi-sig timeout must be positive"));
        }
        if self.multisig.max_signers == 0 {
            return Err(SigningError::invalid_request("max_signers must be positive"));
        }
        Ok(())
    }
}

/// Batch pipeline settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Capped at [`MAX_BATCH_SIZE`]
    pub max_batch_size: usize,
    /// Simulate when the request does not say
    pub simulate_by_default: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            simulate_by_default: true,
        }
    }
}

/// Hardware coordinator settings
#[derive(Debug, Clone)]
pub struct HardwareConfig {
    /// Used when a request carries no timeout
    pub default_confirmation_timeout: Duration,
    pub supported_devices: Vec<DeviceType>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            default_confirmation_timeout: Duration::from_secs(60),
            supported_devices: DeviceType::all().to_vec(),
        }
    }
}

/// Multi-sig coordinator settings
#[derive(Debug, Clone)]
pub struct MultiSigConfig {
    /// Session lifetime when a request carries no timeout
    pub default_timeout: Duration,
    pub max_signers: usize,
}

impl Default for MultiSigConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_signers: 20,
        }
    }
}

/// Signature verifier settings
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Entries retained in the verification audit log
    pub audit_max_entries: usize,
    /// Memoize results by (message, signature, public key, algorithm)
    pub enable_cache: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            audit_max_entries: 1000,
            enable_cache: true,
        }
    }
}
