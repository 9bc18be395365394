//! State Predictor - optimistic simulation between snapshots
//!
//! Holds the last authoritative snapshot and a predicted copy of it. The
//! prediction tick synthesizes the completions the server will have performed
//! by "now". A new snapshot throws the predicted copy away and starts over,
//! so divergence from the server is bounded by the snapshot interval.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use idlesync_core::{
    ActivityRecord, AuthoritativeSnapshot, ItemCatalog, ItemId, ServerTime, SkillProgress,
};
use idlesync_time::{ClockSync, LocalClock};

use crate::{PredictedState, RewardModel, TableRewardModel};

/// Predictor configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Duration used when a record carries none (or zero)
    pub default_time_per_action_ms: u64,
    /// Most completions one tick may synthesize
    pub max_catch_up_per_tick: u32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            default_time_per_action_ms: 3_000,
            max_catch_up_per_tick: 10_000,
        }
    }
}

/// Why an activity was left untouched
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StallReason {
    /// No next completion is scheduled
    Unscheduled,
    /// More actions remaining than requested, or no usable duration
    Inconsistent,
    /// Item is missing from the content catalog
    UnknownItem(ItemId),
    /// A counter would overflow
    Overflow,
}

/// Result of one prediction tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No snapshot yet, or no activity
    Idle,
    /// Next completion has not fired yet
    Waiting { next_action_at: ServerTime },
    /// Completions were synthesized; `cleared` when the activity ended
    Advanced { completions: u32, cleared: bool },
    /// Activity cannot be advanced safely and was left untouched
    Stalled(StallReason),
}

/// Optimistic predictor over the last authoritative snapshot
pub struct StatePredictor {
    catalog: Arc<ItemCatalog>,
    rewards: Arc<dyn RewardModel>,
    config: PredictionConfig,
    authoritative: Option<AuthoritativeSnapshot>,
    predicted: Option<PredictedState>,
    /// Bumped on every snapshot
    generation: u64,
    /// Generation whose stall was already logged at warn level
    stall_warned: Option<u64>,
}

impl StatePredictor {
    /// Predictor with default rewards
    pub fn new(catalog: Arc<ItemCatalog>) -> Self {
        Self::with_rewards(
            catalog,
            Arc::new(TableRewardModel::default()),
            PredictionConfig::default(),
        )
    }

    pub fn with_rewards(
        catalog: Arc<ItemCatalog>,
        rewards: Arc<dyn RewardModel>,
        config: PredictionConfig,
    ) -> Self {
        StatePredictor {
            catalog,
            rewards,
            config,
            authoritative: None,
            predicted: None,
            generation: 0,
            stall_warned: None,
        }
    }

    /// Replace everything with a fresh copy of `snapshot`
    ///
    /// Returns the new generation. Any synthesized work is discarded.
    pub fn on_snapshot(&mut self, snapshot: AuthoritativeSnapshot) -> u64 {
        let mut predicted = PredictedState::from_snapshot(&snapshot);
        if let Some(activity) = predicted.activity.as_mut() {
            if activity.time_per_action_ms == 0 {
                activity.time_per_action_ms = self.config.default_time_per_action_ms;
            }
        }

        self.authoritative = Some(snapshot);
        self.predicted = Some(predicted);
        self.generation += 1;
        self.generation
    }

    /// Tick at the server "now" read from `clock` through `sync`
    pub fn tick_now<C: LocalClock + ?Sized>(&mut self, sync: &ClockSync, clock: &C) -> TickOutcome {
        self.tick(sync.adjusted_now(clock))
    }

    /// Synthesize every completion due by `adjusted_now`
    ///
    /// Either all computed completions are committed or nothing is.
    pub fn tick(&mut self, adjusted_now: ServerTime) -> TickOutcome {
        let Some(predicted) = self.predicted.as_mut() else {
            return TickOutcome::Idle;
        };
        let Some(activity) = predicted.activity.as_ref() else {
            return TickOutcome::Idle;
        };

        if activity.is_exhausted() {
            // Terminal state the server should already have cleared
            predicted.activity = None;
            return TickOutcome::Advanced {
                completions: 0,
                cleared: true,
            };
        }

        let Some(next_action_at) = activity.next_action_at else {
            return stalled(
                &mut self.stall_warned,
                self.generation,
                activity,
                StallReason::Unscheduled,
            );
        };
        if adjusted_now < next_action_at {
            return TickOutcome::Waiting { next_action_at };
        }
        if !activity.is_consistent() {
            return stalled(
                &mut self.stall_warned,
                self.generation,
                activity,
                StallReason::Inconsistent,
            );
        }
        let Some(item) = self.catalog.get(&activity.item_id) else {
            return stalled(
                &mut self.stall_warned,
                self.generation,
                activity,
                StallReason::UnknownItem(activity.item_id.clone()),
            );
        };

        // Catch-up loop on a scratch copy of the schedule
        let per_action = i64::try_from(activity.time_per_action_ms).unwrap_or(i64::MAX);
        let mut next = next_action_at;
        let mut remaining = activity.actions_remaining;
        let mut completions: u32 = 0;
        while adjusted_now >= next
            && remaining > 0
            && completions < self.config.max_catch_up_per_tick
        {
            let Some(advanced) = next.checked_add_millis(per_action) else {
                return stalled(
                    &mut self.stall_warned,
                    self.generation,
                    activity,
                    StallReason::Overflow,
                );
            };
            next = advanced;
            remaining -= 1;
            completions += 1;
        }

        let reward = self.rewards.reward(activity, item);
        let item_count = predicted.state.inventory_count(&activity.item_id);
        let skill_progress = predicted
            .state
            .skills
            .get(&item.skill)
            .copied()
            .unwrap_or(SkillProgress::new(1, 0));

        let new_count = reward
            .quantity
            .checked_mul(completions as u64)
            .and_then(|gain| item_count.checked_add(gain));
        let new_experience = reward
            .experience
            .checked_mul(completions as u64)
            .and_then(|gain| skill_progress.experience.checked_add(gain));
        let (Some(new_count), Some(new_experience)) = (new_count, new_experience) else {
            return stalled(
                &mut self.stall_warned,
                self.generation,
                activity,
                StallReason::Overflow,
            );
        };

        // Commit
        let item_id = activity.item_id.clone();
        let skill = item.skill.clone();
        predicted.state.inventory.insert(item_id.clone(), new_count);
        predicted.state.skills.insert(
            skill.clone(),
            SkillProgress::new(skill_progress.level, new_experience),
        );
        predicted.synthesized += completions as u64;

        let cleared = remaining == 0;
        if cleared {
            predicted.activity = None;
        } else if let Some(activity) = predicted.activity.as_mut() {
            activity.actions_remaining = remaining;
            activity.next_action_at = Some(next);
        }

        tracing::trace!(
            item = %item_id,
            skill = %skill,
            completions,
            remaining,
            cleared,
            "synthesized completions"
        );
        if completions == self.config.max_catch_up_per_tick && !cleared {
            tracing::debug!(completions, "catch-up capped, continuing next tick");
        }

        TickOutcome::Advanced {
            completions,
            cleared,
        }
    }

    /// Current predicted copy, if a snapshot has arrived
    pub fn predicted(&self) -> Option<&PredictedState> {
        self.predicted.as_ref()
    }

    /// Last snapshot exactly as received
    pub fn authoritative(&self) -> Option<&AuthoritativeSnapshot> {
        self.authoritative.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }
}

/// Warn once per snapshot generation, then only at debug level
fn stalled(
    warned: &mut Option<u64>,
    generation: u64,
    activity: &ActivityRecord,
    reason: StallReason,
) -> TickOutcome {
    if *warned == Some(generation) {
        tracing::debug!(item = %activity.item_id, ?reason, "activity still stalled");
    } else {
        *warned = Some(generation);
        tracing::warn!(
            item = %activity.item_id,
            kind = activity.kind.as_str(),
            ?reason,
            "activity cannot be advanced, leaving it untouched"
        );
    }
    TickOutcome::Stalled(reason)
}
