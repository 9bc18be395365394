//! IdleSync State - Prediction between authoritative snapshots
//!
//! This crate implements the State Predictor:
//! - Predicted state (deep copy of the last snapshot plus synthesized work)
//! - Pluggable reward approximation for synthesized completions
//! - The prediction tick with its catch-up loop
//! - Wholesale replacement on every new snapshot

pub mod predicted;
pub mod reward;
pub mod predictor;

pub use predicted::*;
pub use reward::*;
pub use predictor::*;
