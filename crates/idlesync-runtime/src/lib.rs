//! IdleSync Runtime - Engine orchestration and timers
//!
//! This crate wires the engine together:
//! 1. Decode snapshot messages from the real-time channel
//! 2. Observe the clock offset at receipt
//! 3. Replace the predicted state wholesale
//! 4. Run the prediction timer (~500 ms) against adjusted now
//! 5. Publish predicted state and offset as reactive values
//! 6. Drive progress (~50 ms) and elapsed (~1000 ms) views for widgets
//!
//! Every timer is a cancellable scheduled task owned by the engine or the
//! orchestrator; dropping the owner cancels it.

pub mod config;
pub mod wire;
pub mod timer;
pub mod engine;
pub mod orchestrator;
pub mod logging;

pub use config::*;
pub use wire::*;
pub use timer::*;
pub use engine::*;
pub use orchestrator::*;
pub use logging::*;
