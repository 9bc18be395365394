//! IdleSync Test Harness - Prediction under skewed clocks and jittered delivery
//!
//! This crate provides:
//! - A simulated authoritative server that resolves activities on its own clock
//! - A latency model for the real-time channel
//! - A harness that runs the client engine core against the server and
//!   measures how far the predicted copy drifts from the truth

pub mod simulator;

pub use simulator::*;
