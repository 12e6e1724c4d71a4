//! Batch Signing
//!
//! validate -> (optional) simulate -> sign -> aggregate, with fractional
//! progress and cooperative cancellation.

mod pipeline;
pub mod simulation;

pub use pipeline::*;
pub use simulation::{PayloadSimulator, SimulationReport, TransactionSimulator};
