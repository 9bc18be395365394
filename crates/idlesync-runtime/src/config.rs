//! Engine configuration and content loading

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use idlesync_core::{CatalogEntry, ItemCatalog, SyncError, SyncResult};
use idlesync_state::{PredictionConfig, RewardTable};

/// Engine configuration
///
/// Intervals are milliseconds so that a JSON config reads naturally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Progress display refresh
    pub progress_interval_ms: u64,
    /// Prediction tick
    pub prediction_interval_ms: u64,
    /// Combat/dungeon elapsed display refresh
    pub elapsed_interval_ms: u64,
    pub prediction: PredictionConfig,
    pub rewards: RewardTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            progress_interval_ms: 50,
            prediction_interval_ms: 500,
            elapsed_interval_ms: 1_000,
            prediction: PredictionConfig::default(),
            rewards: RewardTable::default(),
        }
    }
}

impl EngineConfig {
    /// Coarser refresh for battery-constrained clients
    pub fn low_power() -> Self {
        EngineConfig {
            progress_interval_ms: 200,
            prediction_interval_ms: 1_000,
            elapsed_interval_ms: 1_000,
            ..EngineConfig::default()
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn prediction_interval(&self) -> Duration {
        Duration::from_millis(self.prediction_interval_ms)
    }

    pub fn elapsed_interval(&self) -> Duration {
        Duration::from_millis(self.elapsed_interval_ms)
    }

    /// Reject settings the timers cannot run with
    pub fn validate(&self) -> SyncResult<()> {
        let intervals = [
            ("progress_interval_ms", self.progress_interval_ms),
            ("prediction_interval_ms", self.prediction_interval_ms),
            ("elapsed_interval_ms", self.elapsed_interval_ms),
            (
                "prediction.default_time_per_action_ms",
                self.prediction.default_time_per_action_ms,
            ),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.prediction.max_catch_up_per_tick == 0 {
            return Err(SyncError::InvalidConfig(
                "prediction.max_catch_up_per_tick must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Parse and validate a JSON item catalog (an array of entries)
pub fn catalog_from_json_str(json: &str) -> SyncResult<ItemCatalog> {
    let entries: Vec<CatalogEntry> =
        serde_json::from_str(json).map_err(|e| SyncError::InvalidContent(e.to_string()))?;
    ItemCatalog::from_entries(entries)
}

pub fn load_catalog(path: &Path) -> SyncResult<ItemCatalog> {
    let json = std::fs::read_to_string(path)?;
    catalog_from_json_str(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlesync_core::ItemId;

    #[test]
    fn test_default_intervals() {
        let config = EngineConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_millis(50));
        assert_eq!(config.prediction_interval(), Duration::from_millis(500));
        assert_eq!(config.elapsed_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert!(EngineConfig::low_power().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"prediction_interval_ms": 250, "rewards": {"crafting": {"yield_per_action": 1, "xp_per_action": 99}}}"#,
        )
        .unwrap();

        assert_eq!(config.prediction_interval_ms, 250);
        assert_eq!(config.progress_interval_ms, 50);
        assert_eq!(config.rewards.crafting.xp_per_action, 99);
        assert_eq!(config.rewards.gathering, RewardTable::default().gathering);
        assert_eq!(config.prediction, PredictionConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"progress_interval_ms": 0}"#),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"prediction": {"max_catch_up_per_tick": 0}}"#),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = catalog_from_json_str(
            r#"[{"item_id": "COPPER_ORE", "skill": "mining", "category": "resource"}]"#,
        )
        .unwrap();
        assert!(catalog.contains(&ItemId::new("COPPER_ORE")));

        assert!(matches!(
            catalog_from_json_str(r#"[{"item_id": "COPPER_ORE"}]"#),
            Err(SyncError::InvalidContent(_))
        ));
    }
}
