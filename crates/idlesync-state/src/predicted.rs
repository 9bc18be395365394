//! Predicted state - the local extrapolation of the last snapshot

use idlesync_core::{ActivityRecord, AuthoritativeSnapshot, CharacterSheet, ServerTime};

/// Deep copy of an authoritative snapshot with synthesized completions applied
///
/// Never merged into and never persisted. It is rebuilt from scratch on every
/// snapshot and mutated in place only by the prediction tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictedState {
    /// Server time of the snapshot this copy was built from
    pub based_on: ServerTime,
    pub activity: Option<ActivityRecord>,
    pub state: CharacterSheet,
    /// Completions synthesized since the snapshot
    pub synthesized: u64,
}

impl PredictedState {
    /// Structural copy of a snapshot
    pub fn from_snapshot(snapshot: &AuthoritativeSnapshot) -> Self {
        PredictedState {
            based_on: snapshot.server_time,
            activity: snapshot.activity.clone(),
            state: snapshot.state.clone(),
            synthesized: 0,
        }
    }

    /// Nothing has been synthesized on top of the snapshot yet
    pub fn is_pristine(&self) -> bool {
        self.synthesized == 0
    }

    pub fn has_activity(&self) -> bool {
        self.activity.is_some()
    }
}
