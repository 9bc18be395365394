//! Error types for IdleSync
//!
//! Only load and decode boundaries fail. Prediction and progress math are
//! total and never return these.

use thiserror::Error;

use crate::{ItemId, SkillId};

/// Core IdleSync errors
#[derive(Error, Debug)]
pub enum SyncError {
    // Content errors
    #[error("Duplicate catalog item: {0}")]
    DuplicateItem(ItemId),

    #[error("Catalog entry has an empty item identifier")]
    EmptyItemId,

    #[error("Item {item} maps to an empty skill identifier")]
    EmptySkill { item: ItemId },

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Skill {skill} is not trained by any catalog item")]
    UntrainedSkill { skill: SkillId },

    #[error("Invalid content file: {0}")]
    InvalidContent(String),

    // Wire errors
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // Setup errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for IdleSync operations
pub type SyncResult<T> = Result<T, SyncError>;
