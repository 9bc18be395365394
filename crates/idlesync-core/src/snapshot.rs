//! Authoritative snapshot data model
//!
//! A snapshot is what the remote simulation declares to be true at
//! `server_time`. The client never edits a snapshot; prediction works on a
//! separate copy.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ItemId, ServerTime, SkillId};

/// Kind of a repeating timed activity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Gathering,
    Refining,
    Crafting,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] = [
        ActivityKind::Gathering,
        ActivityKind::Refining,
        ActivityKind::Crafting,
    ];

    /// Parse the wire name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GATHERING" => Some(ActivityKind::Gathering),
            "REFINING" => Some(ActivityKind::Refining),
            "CRAFTING" => Some(ActivityKind::Crafting),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Gathering => "GATHERING",
            ActivityKind::Refining => "REFINING",
            ActivityKind::Crafting => "CRAFTING",
        }
    }
}

/// A scheduled repeating timed action
///
/// INVARIANT (as sent by the server): `actions_remaining <= initial_quantity`
/// and `next_action_at` never moves backwards while the activity runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub kind: ActivityKind,
    pub item_id: ItemId,
    /// Duration of one action; zero when the server left it out
    pub time_per_action_ms: u64,
    pub initial_quantity: u32,
    pub actions_remaining: u32,
    /// Server-clock time of the next completion, if scheduled
    pub next_action_at: Option<ServerTime>,
}

impl ActivityRecord {
    /// A fresh activity with nothing done yet
    pub fn new(
        kind: ActivityKind,
        item_id: impl Into<ItemId>,
        time_per_action_ms: u64,
        quantity: u32,
        next_action_at: ServerTime,
    ) -> Self {
        ActivityRecord {
            kind,
            item_id: item_id.into(),
            time_per_action_ms,
            initial_quantity: quantity,
            actions_remaining: quantity,
            next_action_at: Some(next_action_at),
        }
    }

    /// Completed actions (`initial_quantity - actions_remaining`, floored at 0)
    #[inline]
    pub fn actions_done(&self) -> u32 {
        self.initial_quantity.saturating_sub(self.actions_remaining)
    }

    #[inline]
    pub fn time_per_action(&self) -> Duration {
        Duration::from_millis(self.time_per_action_ms)
    }

    /// Counts and duration are internally consistent
    pub fn is_consistent(&self) -> bool {
        self.time_per_action_ms > 0 && self.actions_remaining <= self.initial_quantity
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.actions_remaining == 0
    }
}

/// Level/experience pair for one skill
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub level: u32,
    pub experience: u64,
}

impl SkillProgress {
    pub fn new(level: u32, experience: u64) -> Self {
        SkillProgress { level, experience }
    }
}

/// Combat sub-record; only its start time is used client-side
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRecord {
    pub started_at: ServerTime,
    pub opponent: Option<String>,
    pub round: Option<u32>,
}

/// Dungeon sub-record; only its start time is used client-side
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonRecord {
    pub started_at: ServerTime,
    pub dungeon_id: Option<String>,
    pub wave: Option<u32>,
}

/// Character sheet carried by every snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub inventory: HashMap<ItemId, u64>,
    pub skills: HashMap<SkillId, SkillProgress>,
    pub silver: u64,
    pub combat: Option<CombatRecord>,
    pub dungeon: Option<DungeonRecord>,
}

impl CharacterSheet {
    /// Count of an item, zero when absent
    pub fn inventory_count(&self, item: &ItemId) -> u64 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Experience of a skill, zero when absent
    pub fn experience(&self, skill: &SkillId) -> u64 {
        self.skills.get(skill).map(|s| s.experience).unwrap_or(0)
    }
}

/// Ground truth as last received from the remote simulation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeSnapshot {
    /// Server clock when the snapshot was produced
    pub server_time: ServerTime,
    pub activity: Option<ActivityRecord>,
    pub state: CharacterSheet,
}

impl AuthoritativeSnapshot {
    pub fn new(server_time: ServerTime) -> Self {
        AuthoritativeSnapshot {
            server_time,
            activity: None,
            state: CharacterSheet::default(),
        }
    }

    pub fn with_activity(mut self, activity: ActivityRecord) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_state(mut self, state: CharacterSheet) -> Self {
        self.state = state;
        self
    }
}
