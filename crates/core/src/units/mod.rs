//! Prediction units: branch direction, jump targets, return addresses.

/// Branch direction predictor (2-bit saturating counters).
pub mod bpu;
/// Branch target buffer.
pub mod btb;
/// Return address stack.
pub mod ras;

pub use bpu::BranchPredictor;
pub use btb::Btb;
pub use ras::ReturnAddressStack;
