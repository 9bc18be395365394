//! Identity types for IdleSync
//!
//! Content identifiers are the string keys the remote simulation uses
//! (`"OAK_LOG"`, `"woodcutting"`). They are wrapped so an item can never be
//! passed where a skill is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Item identity - key into inventories and the content catalog
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::new(s)
    }
}

/// Skill identity - key into the character's skill map
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(pub String);

impl SkillId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        SkillId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Skill({})", self.0)
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SkillId {
    fn from(s: &str) -> Self {
        SkillId::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ids() {
        assert!(ItemId::new("").is_empty());
        assert!(ItemId::new("   ").is_empty());
        assert!(!ItemId::new("OAK_LOG").is_empty());
        assert!(SkillId::default().is_empty());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ItemId::new("OAK_LOG")).unwrap();
        assert_eq!(json, "\"OAK_LOG\"");

        let skill: SkillId = serde_json::from_str("\"woodcutting\"").unwrap();
        assert_eq!(skill, SkillId::new("woodcutting"));
    }
}
