//! Item content catalog
//!
//! An explicit lookup table from item identifier to the skill that gains
//! experience and the item's category. Every item the predictor may credit
//! must be listed; nothing is inferred from the shape of an identifier.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{ItemId, SkillId, SyncError, SyncResult};

/// Broad item category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// Raw output of gathering
    Resource,
    /// Output of refining
    Material,
    Equipment,
    Consumable,
}

/// Content facts about one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Skill credited when this item is produced
    pub skill: SkillId,
    pub category: ItemCategory,
    /// Per-action yield override for the reward approximation
    #[serde(default)]
    pub yield_per_action: Option<u32>,
    /// Per-action experience override for the reward approximation
    #[serde(default)]
    pub xp_per_action: Option<u64>,
}

impl ItemInfo {
    pub fn new(skill: impl Into<SkillId>, category: ItemCategory) -> Self {
        ItemInfo {
            skill: skill.into(),
            category,
            yield_per_action: None,
            xp_per_action: None,
        }
    }

    pub fn with_yield(mut self, amount: u32) -> Self {
        self.yield_per_action = Some(amount);
        self
    }

    pub fn with_xp(mut self, xp: u64) -> Self {
        self.xp_per_action = Some(xp);
        self
    }
}

/// One catalog row as it appears in a content file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub info: ItemInfo,
}

/// Validated item lookup table
#[derive(Clone, Debug, Default)]
pub struct ItemCatalog {
    items: HashMap<ItemId, ItemInfo>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        ItemCatalog::default()
    }

    /// Build a catalog, rejecting duplicates and empty identifiers
    pub fn from_entries<I>(entries: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut catalog = ItemCatalog::new();
        for entry in entries {
            catalog.insert(entry.item_id, entry.info)?;
        }
        Ok(catalog)
    }

    /// Add one item, validating it the same way as `from_entries`
    pub fn insert(&mut self, item_id: ItemId, info: ItemInfo) -> SyncResult<()> {
        if item_id.is_empty() {
            return Err(SyncError::EmptyItemId);
        }
        if info.skill.is_empty() {
            return Err(SyncError::EmptySkill { item: item_id });
        }
        if self.items.contains_key(&item_id) {
            return Err(SyncError::DuplicateItem(item_id));
        }
        self.items.insert(item_id, info);
        Ok(())
    }

    /// Builder-style insert for tests and static content
    pub fn with_item(mut self, item_id: impl Into<ItemId>, info: ItemInfo) -> SyncResult<Self> {
        self.insert(item_id.into(), info)?;
        Ok(self)
    }

    pub fn get(&self, item: &ItemId) -> Option<&ItemInfo> {
        self.items.get(item)
    }

    /// Like `get`, but an unlisted item is an error
    pub fn lookup(&self, item: &ItemId) -> SyncResult<&ItemInfo> {
        self.items
            .get(item)
            .ok_or_else(|| SyncError::UnknownItem(item.clone()))
    }

    pub fn skill_for(&self, item: &ItemId) -> Option<&SkillId> {
        self.items.get(item).map(|info| &info.skill)
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.items.contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &ItemInfo)> {
        self.items.iter()
    }

    /// Every skill some item trains
    pub fn skills(&self) -> HashSet<&SkillId> {
        self.items.values().map(|info| &info.skill).collect()
    }

    /// Check that each of `skills` is trained by at least one item
    pub fn ensure_covers<'a, I>(&self, skills: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = &'a SkillId>,
    {
        let known = self.skills();
        for skill in skills {
            if !known.contains(skill) {
                return Err(SyncError::UntrainedSkill {
                    skill: skill.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(item: &str, skill: &str) -> CatalogEntry {
        CatalogEntry {
            item_id: ItemId::new(item),
            info: ItemInfo::new(skill, ItemCategory::Resource),
        }
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = ItemCatalog::from_entries(vec![
            entry("OAK_LOG", "woodcutting"),
            entry("COPPER_ORE", "mining"),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.skill_for(&ItemId::new("OAK_LOG")),
            Some(&SkillId::new("woodcutting"))
        );
        assert!(catalog.get(&ItemId::new("OAK_PLANK")).is_none());
        assert!(matches!(
            catalog.lookup(&ItemId::new("OAK_PLANK")),
            Err(SyncError::UnknownItem(_))
        ));
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let result = ItemCatalog::from_entries(vec![
            entry("OAK_LOG", "woodcutting"),
            entry("OAK_LOG", "mining"),
        ]);
        assert!(matches!(result, Err(SyncError::DuplicateItem(id)) if id.as_str() == "OAK_LOG"));
    }

    #[test]
    fn test_catalog_rejects_empty_identifiers() {
        assert!(matches!(
            ItemCatalog::from_entries(vec![entry("", "woodcutting")]),
            Err(SyncError::EmptyItemId)
        ));
        assert!(matches!(
            ItemCatalog::from_entries(vec![entry("OAK_LOG", " ")]),
            Err(SyncError::EmptySkill { .. })
        ));
    }

    #[test]
    fn test_catalog_skill_coverage() {
        let catalog = ItemCatalog::new()
            .with_item("OAK_LOG", ItemInfo::new("woodcutting", ItemCategory::Resource))
            .unwrap();

        assert!(catalog.ensure_covers([&SkillId::new("woodcutting")]).is_ok());
        assert!(matches!(
            catalog.ensure_covers([&SkillId::new("smithing")]),
            Err(SyncError::UntrainedSkill { .. })
        ));
    }

    #[test]
    fn test_catalog_entry_from_json() {
        let json = r#"[
            {"item_id": "OAK_PLANK", "skill": "carpentry", "category": "material", "xp_per_action": 12},
            {"item_id": "OAK_LOG", "skill": "woodcutting", "category": "resource"}
        ]"#;
        let entries: Vec<CatalogEntry> = serde_json::from_str(json).unwrap();
        let catalog = ItemCatalog::from_entries(entries).unwrap();

        let plank = catalog.get(&ItemId::new("OAK_PLANK")).unwrap();
        assert_eq!(plank.category, ItemCategory::Material);
        assert_eq!(plank.xp_per_action, Some(12));
        assert_eq!(plank.yield_per_action, None);
    }
}
