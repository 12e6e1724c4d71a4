//! Multi-Signature Coordination
//!
//! k-of-n signature collection. A session is keyed by the transaction id,
//! accepts each authorized signer at most once and completes when the k-th
//! distinct signer is accepted.

mod coordinator;
mod session;

pub use coordinator::*;
pub use session::*;
