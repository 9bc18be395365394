//! Progress estimation for timed activities
//!
//! Pure functions of (record, adjusted now). No timers live here, so the
//! render layer may sample at any cadence and get the same answer.

use std::time::Duration;

use idlesync_core::{ActivityRecord, ServerTime};

/// Completion estimate for a whole activity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Completed share of the activity, always in [0, 1]
    pub fraction_done: f64,
    /// Time left until the last action completes
    pub remaining: Duration,
}

impl Progress {
    pub const NONE: Progress = Progress {
        fraction_done: 0.0,
        remaining: Duration::ZERO,
    };

    #[inline]
    pub fn remaining_ms(&self) -> u64 {
        u64::try_from(self.remaining.as_millis()).unwrap_or(u64::MAX)
    }

    /// Fraction as a percentage rounded to one decimal
    pub fn percent(&self) -> f64 {
        (self.fraction_done * 1000.0).round() / 10.0
    }
}

/// Milliseconds spent on the in-flight action, in [0, time_per_action]
fn elapsed_in_current_action(record: &ActivityRecord, adjusted_now: ServerTime) -> i128 {
    let per_action = record.time_per_action_ms as i128;
    match record.next_action_at {
        Some(next) => {
            let until_next = next.as_millis() as i128 - adjusted_now.as_millis() as i128;
            (per_action - until_next).clamp(0, per_action)
        }
        None => 0,
    }
}

/// Estimate how far along an activity is at `adjusted_now`
///
/// `fraction_done = (done + elapsed / per_action) / initial_quantity`,
/// clamped to [0, 1]; zero when the activity has no quantity.
pub fn estimate_progress(record: &ActivityRecord, adjusted_now: ServerTime) -> Progress {
    let per_action = record.time_per_action_ms as i128;
    let initial = record.initial_quantity as i128;
    let done = record.actions_done() as i128;
    let elapsed = elapsed_in_current_action(record, adjusted_now);

    let fraction_done = if initial == 0 || per_action == 0 {
        0.0
    } else {
        let raw = (done as f64 + elapsed as f64 / per_action as f64) / initial as f64;
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    };

    let remaining_ms = (initial * per_action - (done * per_action + elapsed)).max(0);
    let remaining = Duration::from_millis(u64::try_from(remaining_ms).unwrap_or(u64::MAX));

    Progress {
        fraction_done,
        remaining,
    }
}

/// Fraction of the in-flight action only, in [0, 1]
pub fn estimate_action_progress(record: &ActivityRecord, adjusted_now: ServerTime) -> f64 {
    if record.time_per_action_ms == 0 || record.is_exhausted() {
        return 0.0;
    }
    let elapsed = elapsed_in_current_action(record, adjusted_now);
    (elapsed as f64 / record.time_per_action_ms as f64).clamp(0.0, 1.0)
}
