//! Signing Engine Library
//!
//! Orchestrates transaction signing requests against external signing
//! agents. The engine never holds key material; it validates, hashes,
//! sequences and audits, and asks an agent for every signature.
//!
//! # Architecture
//!
//! This crate provides:
//! - **tx**: Single-transaction signing with a response cache
//! - **batch**: Ordered batch signing with simulation, progress and cancellation
//! - **eip712**: Typed-data hashing and signing
//! - **hardware**: Hardware wallet sessions, on-device confirmation
//! - **multisig**: k-of-n signature collection
//! - **verification**: ECDSA, EdDSA and BLS signature verification
//! - **engine**: All of the above wired to one agent
//!
//! # Example
//!
//! ```rust,ignore
//! use signing_engine::{SigningEngine, SigningRequest};
//!
//! let engine = SigningEngine::new(agent)?;
//! let outcome = engine.dispatch(&SigningRequest::Transaction(request)).await?;
//! ```

pub mod agent;
pub mod batch;
pub mod config;
pub mod eip712;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod multisig;
pub mod tx;
pub mod types;
pub mod utils;
pub mod verification;

pub use agent::{AgentError, AgentErrorKind, AgentSignature, LocalKeyAgent, SigningAgent};
pub use config::EngineConfig;
pub use engine::SigningEngine;
pub use error::{ErrorReason, SigningError, SigningResult};
pub use types::*;
