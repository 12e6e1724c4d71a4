//! Hardware Wallet Signing
//!
//! Routes signing through a hardware device reached via the agent,
//! including on-device display and confirmation. One session is kept per
//! (device type, derivation path) and signing on a session is serialized.

mod coordinator;
pub mod derivation_path;
mod device;

pub use coordinator::*;
pub use derivation_path::{DerivationPath, DerivationPathError};
pub use device::*;
