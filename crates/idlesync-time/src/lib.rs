//! IdleSync Time - the server clock as seen from the client
//!
//! This crate implements:
//! - Local clock sources (system and manual)
//! - ClockSync: server-minus-local offset, recomputed on every snapshot
//! - Progress estimation for timed activities (pure, cadence-independent)
//! - Elapsed-time math for combat and dungeon displays

pub mod clock;
pub mod progress;
pub mod elapsed;

pub use clock::*;
pub use progress::*;
pub use elapsed::*;
