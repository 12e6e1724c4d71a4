//! Single-transaction signing primitive

mod signer;

pub use signer::*;
