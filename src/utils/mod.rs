//! Utilities Module
//!
//! Common utilities used across the crate.

mod ids;
pub mod audit;
pub mod logging;

pub use ids::*;
