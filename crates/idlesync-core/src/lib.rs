//! IdleSync Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every other IdleSync crate:
//! - Identifiers (ItemId, SkillId)
//! - Time primitives (ServerTime, LocalTime, ClockOffset)
//! - The authoritative snapshot and its sub-records
//! - The item content catalog (item -> skill/category lookup)

pub mod id;
pub mod time;
pub mod snapshot;
pub mod catalog;
pub mod error;

pub use id::*;
pub use time::*;
pub use snapshot::*;
pub use catalog::*;
pub use error::*;
