//! Reward approximation for synthesized completions
//!
//! The amounts credited by prediction are local guesses. The next snapshot
//! overwrites them, so they only need to look right, not be right. They are
//! configurable so they can track server-side tuning without a rebuild.

use serde::{Deserialize, Serialize};

use idlesync_core::{ActivityKind, ActivityRecord, ItemInfo};

/// Per-completion reward
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionReward {
    /// Units of the activity's item added to the inventory
    pub quantity: u64,
    /// Experience added to the item's skill
    pub experience: u64,
}

/// Source of per-completion reward estimates
pub trait RewardModel: Send + Sync {
    fn reward(&self, activity: &ActivityRecord, item: &ItemInfo) -> ActionReward;
}

/// Default amounts for one activity kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReward {
    pub yield_per_action: u32,
    pub xp_per_action: u64,
}

impl KindReward {
    pub const fn new(yield_per_action: u32, xp_per_action: u64) -> Self {
        KindReward {
            yield_per_action,
            xp_per_action,
        }
    }
}

/// Per-kind reward defaults
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardTable {
    pub gathering: KindReward,
    pub refining: KindReward,
    pub crafting: KindReward,
}

impl Default for RewardTable {
    fn default() -> Self {
        RewardTable {
            gathering: KindReward::new(1, 10),
            refining: KindReward::new(1, 15),
            crafting: KindReward::new(1, 25),
        }
    }
}

impl RewardTable {
    pub fn for_kind(&self, kind: ActivityKind) -> KindReward {
        match kind {
            ActivityKind::Gathering => self.gathering,
            ActivityKind::Refining => self.refining,
            ActivityKind::Crafting => self.crafting,
        }
    }
}

/// Kind defaults from a table, overridden per item by the catalog
#[derive(Clone, Debug, Default)]
pub struct TableRewardModel {
    table: RewardTable,
}

impl TableRewardModel {
    pub fn new(table: RewardTable) -> Self {
        TableRewardModel { table }
    }

    pub fn table(&self) -> &RewardTable {
        &self.table
    }
}

impl RewardModel for TableRewardModel {
    fn reward(&self, activity: &ActivityRecord, item: &ItemInfo) -> ActionReward {
        let defaults = self.table.for_kind(activity.kind);
        ActionReward {
            quantity: item.yield_per_action.unwrap_or(defaults.yield_per_action) as u64,
            experience: item.xp_per_action.unwrap_or(defaults.xp_per_action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlesync_core::{ItemCategory, ServerTime};

    fn activity(kind: ActivityKind) -> ActivityRecord {
        ActivityRecord::new(kind, "OAK_PLANK", 4_000, 5, ServerTime::ZERO)
    }

    #[test]
    fn test_kind_defaults() {
        let model = TableRewardModel::default();
        let info = ItemInfo::new("carpentry", ItemCategory::Material);

        let r = model.reward(&activity(ActivityKind::Refining), &info);
        assert_eq!(r, ActionReward { quantity: 1, experience: 15 });

        let r = model.reward(&activity(ActivityKind::Crafting), &info);
        assert_eq!(r.experience, 25);
    }

    #[test]
    fn test_catalog_overrides() {
        let model = TableRewardModel::default();
        let info = ItemInfo::new("carpentry", ItemCategory::Material)
            .with_yield(2)
            .with_xp(40);

        let r = model.reward(&activity(ActivityKind::Refining), &info);
        assert_eq!(r, ActionReward { quantity: 2, experience: 40 });
    }

    #[test]
    fn test_custom_table() {
        let table = RewardTable {
            gathering: KindReward::new(3, 7),
            ..RewardTable::default()
        };
        let model = TableRewardModel::new(table);
        let info = ItemInfo::new("woodcutting", ItemCategory::Resource);

        let r = model.reward(&activity(ActivityKind::Gathering), &info);
        assert_eq!(r, ActionReward { quantity: 3, experience: 7 });
    }
}
