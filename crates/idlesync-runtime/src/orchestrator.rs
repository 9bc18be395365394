//! Activity Orchestrator - the presentation side of the engine
//!
//! Subscribes to the engine's sync frame (clock offset and predicted state,
//! published together) and turns it into view values widgets can read. It is the only caller of the
//! progress estimator. Each display timer runs only while its record exists:
//! - progress (~50 ms) while an activity is present
//! - combat elapsed (~1000 ms) while a combat record is present
//! - dungeon elapsed (~1000 ms) while a dungeon record is present

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use idlesync_core::{ActivityRecord, CharacterSheet, ServerTime};
use idlesync_state::PredictedState;
use idlesync_time::{
    combat_elapsed, dungeon_elapsed, estimate_action_progress, estimate_progress, format_elapsed,
    LocalClock, Progress,
};

use crate::{ScheduledTask, SyncEngine, SyncFrameRx};

/// Progress of the current activity at one sample
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityView {
    pub activity: ActivityRecord,
    pub progress: Progress,
    /// Share of the in-flight action, for a per-action bar
    pub action_progress: f64,
    pub sampled_at: ServerTime,
}

impl ActivityView {
    pub fn sample(activity: &ActivityRecord, adjusted_now: ServerTime) -> Self {
        ActivityView {
            activity: activity.clone(),
            progress: estimate_progress(activity, adjusted_now),
            action_progress: estimate_action_progress(activity, adjusted_now),
            sampled_at: adjusted_now,
        }
    }
}

/// Elapsed time of a combat or dungeon run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElapsedView {
    pub elapsed: Duration,
    /// `m:ss` / `h:mm:ss`
    pub label: String,
}

impl ElapsedView {
    pub fn new(elapsed: Duration) -> Self {
        ElapsedView {
            elapsed,
            label: format_elapsed(elapsed),
        }
    }
}

type ElapsedFn = fn(&CharacterSheet, ServerTime) -> Option<Duration>;

/// Everything a display timer needs to sample on its own
#[derive(Clone)]
struct Sampler {
    frame_rx: SyncFrameRx,
    clock: Arc<dyn LocalClock>,
}

impl Sampler {
    /// Predicted state with adjusted now, both from the same frame
    fn latest(&self) -> Option<(Arc<PredictedState>, ServerTime)> {
        let frame = self.frame_rx.borrow();
        let state = frame.predicted.clone()?;
        Some((state, self.clock.now() + frame.offset))
    }
}

struct Views {
    activity: watch::Sender<Option<ActivityView>>,
    combat: watch::Sender<Option<ElapsedView>>,
    dungeon: watch::Sender<Option<ElapsedView>>,
}

#[derive(Default)]
struct DisplayTimers {
    progress: Option<ScheduledTask>,
    combat: Option<ScheduledTask>,
    dungeon: Option<ScheduledTask>,
}

fn is_armed(timer: &Option<ScheduledTask>) -> bool {
    timer.as_ref().is_some_and(ScheduledTask::is_active)
}

fn progress_timer(
    sampler: Sampler,
    period: Duration,
    tx: watch::Sender<Option<ActivityView>>,
) -> ScheduledTask {
    ScheduledTask::every("progress", period, move || {
        let view = sampler.latest().and_then(|(state, now)| {
            state
                .activity
                .as_ref()
                .map(|activity| ActivityView::sample(activity, now))
        });
        let present = view.is_some();
        tx.send_replace(view);
        if present {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    })
}

fn elapsed_timer(
    name: &'static str,
    sampler: Sampler,
    period: Duration,
    elapsed: ElapsedFn,
    tx: watch::Sender<Option<ElapsedView>>,
) -> ScheduledTask {
    ScheduledTask::every(name, period, move || {
        let view = sampler
            .latest()
            .and_then(|(state, now)| elapsed(&state.state, now))
            .map(ElapsedView::new);
        let present = view.is_some();
        tx.send_replace(view);
        if present {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    })
}

#[derive(Clone, Copy)]
struct Intervals {
    progress: Duration,
    elapsed: Duration,
}

/// Arm timers for present records, disarm the rest
fn rearm(
    timers: &mut DisplayTimers,
    state: Option<&PredictedState>,
    sampler: &Sampler,
    intervals: Intervals,
    views: &Views,
) {
    let has_activity = state.is_some_and(|s| s.activity.is_some());
    let has_combat = state.is_some_and(|s| s.state.combat.is_some());
    let has_dungeon = state.is_some_and(|s| s.state.dungeon.is_some());

    if has_activity && !is_armed(&timers.progress) {
        timers.progress = Some(progress_timer(
            sampler.clone(),
            intervals.progress,
            views.activity.clone(),
        ));
    } else if !has_activity {
        timers.progress = None;
        views.activity.send_replace(None);
    }

    if has_combat && !is_armed(&timers.combat) {
        timers.combat = Some(elapsed_timer(
            "combat_elapsed",
            sampler.clone(),
            intervals.elapsed,
            combat_elapsed,
            views.combat.clone(),
        ));
    } else if !has_combat {
        timers.combat = None;
        views.combat.send_replace(None);
    }

    if has_dungeon && !is_armed(&timers.dungeon) {
        timers.dungeon = Some(elapsed_timer(
            "dungeon_elapsed",
            sampler.clone(),
            intervals.elapsed,
            dungeon_elapsed,
            views.dungeon.clone(),
        ));
    } else if !has_dungeon {
        timers.dungeon = None;
        views.dungeon.send_replace(None);
    }
}

async fn supervise(sampler: Sampler, intervals: Intervals, views: Views) {
    let mut frame_rx = sampler.frame_rx.clone();
    // Dropped (and so cancelled) when this task ends or is aborted
    let mut timers = DisplayTimers::default();

    loop {
        let state = frame_rx.borrow_and_update().predicted.clone();
        rearm(&mut timers, state.as_deref(), &sampler, intervals, &views);
        if frame_rx.changed().await.is_err() {
            tracing::debug!("engine gone, orchestrator stopping");
            break;
        }
    }
}

/// Drives progress and elapsed views from an engine
///
/// Dropping the orchestrator cancels every display timer.
pub struct ActivityOrchestrator {
    supervisor: Option<JoinHandle<()>>,
    activity_rx: watch::Receiver<Option<ActivityView>>,
    combat_rx: watch::Receiver<Option<ElapsedView>>,
    dungeon_rx: watch::Receiver<Option<ElapsedView>>,
}

impl ActivityOrchestrator {
    /// Attach to an engine. Must be called from within a tokio runtime.
    pub fn attach(engine: &SyncEngine) -> Self {
        let sampler = Sampler {
            frame_rx: engine.subscribe_frame(),
            clock: engine.clock(),
        };
        let intervals = Intervals {
            progress: engine.config().progress_interval(),
            elapsed: engine.config().elapsed_interval(),
        };

        let (activity, activity_rx) = watch::channel(None);
        let (combat, combat_rx) = watch::channel(None);
        let (dungeon, dungeon_rx) = watch::channel(None);
        let views = Views {
            activity,
            combat,
            dungeon,
        };

        let supervisor = tokio::spawn(supervise(sampler, intervals, views));
        ActivityOrchestrator {
            supervisor: Some(supervisor),
            activity_rx,
            combat_rx,
            dungeon_rx,
        }
    }

    pub fn activity(&self) -> watch::Receiver<Option<ActivityView>> {
        self.activity_rx.clone()
    }

    pub fn combat(&self) -> watch::Receiver<Option<ElapsedView>> {
        self.combat_rx.clone()
    }

    pub fn dungeon(&self) -> watch::Receiver<Option<ElapsedView>> {
        self.dungeon_rx.clone()
    }

    /// Latest activity view without subscribing
    pub fn current_activity(&self) -> Option<ActivityView> {
        self.activity_rx.borrow().clone()
    }

    /// Cancel all display timers; idempotent
    pub fn detach(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
    }
}

impl Drop for ActivityOrchestrator {
    fn drop(&mut self) {
        self.detach();
    }
}
