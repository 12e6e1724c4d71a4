//! Device families and session records

use crate::error::SigningError;
use crate::types::{FailedAttempt, HardwareSigningResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported hardware wallet families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Ledger,
    Trezor,
    Keystone,
    GridPlus,
}

impl DeviceType {
    pub fn all() -> &'static [DeviceType] {
        &[
            DeviceType::Ledger,
            DeviceType::Trezor,
            DeviceType::Keystone,
            DeviceType::GridPlus,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Ledger => "ledger",
            DeviceType::Trezor => "trezor",
            DeviceType::Keystone => "keystone",
            DeviceType::GridPlus => "gridplus",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::all()
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SigningError::invalid_request(format!("unknown device type: {}", s)))
    }
}

/// An open device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareDeviceSession {
    pub device_id: String,
    pub device_type: DeviceType,
    pub derivation_path: String,
    pub connected: bool,
    /// Unix milliseconds
    pub connected_at: u64,
    pub last_used: u64,
    pub firmware_version: String,
}

/// Where a hardware request currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareStage {
    /// Waiting for the device to become free
    Queued,
    /// Shown on the device screen
    Displayed,
    AwaitingConfirmation,
    Confirmed,
    Signing,
    Signed,
}

/// Progress event for hardware signing callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProgress {
    pub request_id: String,
    pub device_id: Option<String>,
    pub stage: HardwareStage,
}

/// Outcome of a sequential hardware batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareBatchResult {
    pub responses: Vec<HardwareSigningResponse>,
    pub failures: Vec<FailedAttempt>,
    /// A confirmation-requiring item failed and the rest were skipped
    pub halted: bool,
    /// Ids never attempted because of the halt
    pub skipped: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_round_trip() {
        for device in DeviceType::all() {
            assert_eq!(device.as_str().parse::<DeviceType>().unwrap(), *device);
        }
        assert_eq!("GridPlus".parse::<DeviceType>().unwrap(), DeviceType::GridPlus);
        assert!("yubikey".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_device_type_serde() {
        let json = serde_json::to_string(&DeviceType::GridPlus).unwrap();
        assert_eq!(json, "\"gridplus\"");
    }
}
