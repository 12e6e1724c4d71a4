//! EIP-712 Typed Data Signing
//!
//! Canonical hashing of (domain, schema, message) triples and signing of
//! the resulting digest through a [`crate::agent::SigningAgent`].
//!
//! # Reference
//! - <https://eips.ethereum.org/EIPS/eip-712>
//!
//! # Example
//! ```rust,ignore
//! use signing_engine::eip712::{TypedData, hash_typed_data};
//!
//! let typed_data = TypedData::from_json(json_string)?;
//! let digest = hash_typed_data(&typed_data)?;
//! ```

pub mod encoder;
pub mod hasher;
pub mod signer;
pub mod types;

pub use encoder::*;
pub use hasher::*;
pub use signer::*;
pub use types::*;
