//! Sync Engine - owns clock sync, the predictor and the prediction timer
//!
//! The engine is an explicit object constructed and torn down by its owner.
//! Snapshot handling and the prediction tick both run under one lock, and
//! each publishes while holding it, so a snapshot always wins: a tick either
//! completes before the snapshot replaces the predicted copy, or starts after
//! it and works on the new copy.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use idlesync_core::{
    AuthoritativeSnapshot, ClockOffset, ItemCatalog, LocalTime, ServerTime, SyncResult,
};
use idlesync_state::{PredictedState, StatePredictor, TableRewardModel, TickOutcome};
use idlesync_time::{ClockSync, LocalClock, SystemClock};

use crate::{decode_snapshot, EngineConfig, ScheduledTask, SnapshotMessage};

/// Reactive predicted state; `None` until the first snapshot
pub type PredictedStateRx = watch::Receiver<Option<Arc<PredictedState>>>;

/// Reactive clock offset
pub type ClockOffsetRx = watch::Receiver<ClockOffset>;

/// Reactive offset and predicted state, published together
pub type SyncFrameRx = watch::Receiver<SyncFrame>;

/// Clock offset and predicted state taken under the same lock
///
/// Readers that need both (to place the predicted state on the server
/// timeline) use this instead of two separate channels, which can be
/// observed between updates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncFrame {
    pub offset: ClockOffset,
    pub predicted: Option<Arc<PredictedState>>,
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub snapshots: u64,
    pub rejected_messages: u64,
    pub completions: u64,
    pub stalls: u64,
}

struct EngineCore {
    sync: ClockSync,
    predictor: StatePredictor,
    stats: RuntimeStats,
}

struct Shared {
    core: Mutex<EngineCore>,
    clock: Arc<dyn LocalClock>,
    state_tx: watch::Sender<Option<Arc<PredictedState>>>,
    offset_tx: watch::Sender<ClockOffset>,
    frame_tx: watch::Sender<SyncFrame>,
}

impl Shared {
    /// Publish the current offset and predicted state; caller holds the lock
    fn publish(&self, core: &EngineCore) {
        let offset = core.sync.offset();
        let predicted = core.predictor.predicted().cloned().map(Arc::new);

        self.offset_tx.send_if_modified(|current| {
            let changed = *current != offset;
            *current = offset;
            changed
        });
        self.state_tx.send_replace(predicted.clone());
        self.frame_tx.send_replace(SyncFrame { offset, predicted });
    }

    fn apply_snapshot(&self, snapshot: AuthoritativeSnapshot, received_at: LocalTime) -> u64 {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        core.sync.observe(snapshot.server_time, received_at);
        self.commit(core, snapshot)
    }

    /// Apply a decoded message; without a server time the offset is kept
    fn apply_message(&self, message: SnapshotMessage, received_at: LocalTime) -> u64 {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        let server_time = match message.server_time {
            Some(server_time) => {
                core.sync.observe(server_time, received_at);
                server_time
            }
            None => {
                tracing::debug!(
                    offset = core.sync.offset().as_millis(),
                    "message without serverTime, keeping current offset"
                );
                core.sync.to_server(received_at)
            }
        };
        self.commit(core, message.into_snapshot(server_time))
    }

    fn commit(&self, core: &mut EngineCore, snapshot: AuthoritativeSnapshot) -> u64 {
        let generation = core.predictor.on_snapshot(snapshot);
        core.stats.snapshots += 1;
        self.publish(core);

        tracing::debug!(
            generation,
            offset = core.sync.offset().as_millis(),
            "snapshot applied"
        );
        generation
    }

    fn run_tick(&self) -> TickOutcome {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        // Read at call time, never cached across ticks
        let now = core.sync.adjusted_now(&*self.clock);
        let outcome = core.predictor.tick(now);
        core.stats.ticks += 1;

        match &outcome {
            TickOutcome::Advanced { completions, cleared } => {
                core.stats.completions += *completions as u64;
                self.publish(core);
                tracing::debug!(completions, cleared, "prediction advanced");
            }
            TickOutcome::Stalled(_) => core.stats.stalls += 1,
            TickOutcome::Idle | TickOutcome::Waiting { .. } => {}
        }
        outcome
    }
}

/// Client-side prediction engine
pub struct SyncEngine {
    shared: Arc<Shared>,
    config: EngineConfig,
    prediction_timer: Option<ScheduledTask>,
}

impl SyncEngine {
    /// Engine on the system wall clock
    pub fn new(config: EngineConfig, catalog: Arc<ItemCatalog>) -> SyncResult<Self> {
        Self::with_clock(config, catalog, Arc::new(SystemClock))
    }

    /// Engine on a caller-provided local clock
    pub fn with_clock(
        config: EngineConfig,
        catalog: Arc<ItemCatalog>,
        clock: Arc<dyn LocalClock>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let rewards = Arc::new(TableRewardModel::new(config.rewards.clone()));
        let predictor = StatePredictor::with_rewards(catalog, rewards, config.prediction.clone());
        let (state_tx, _) = watch::channel(None);
        let (offset_tx, _) = watch::channel(ClockOffset::ZERO);
        let (frame_tx, _) = watch::channel(SyncFrame::default());

        Ok(SyncEngine {
            shared: Arc::new(Shared {
                core: Mutex::new(EngineCore {
                    sync: ClockSync::new(),
                    predictor,
                    stats: RuntimeStats::default(),
                }),
                clock,
                state_tx,
                offset_tx,
                frame_tx,
            }),
            config,
            prediction_timer: None,
        })
    }

    /// Arm the prediction timer; no-op if already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        self.prediction_timer = Some(ScheduledTask::every(
            "prediction",
            self.config.prediction_interval(),
            move || match shared.upgrade() {
                Some(shared) => {
                    shared.run_tick();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
        ));
        tracing::info!(
            interval = %humantime::format_duration(self.config.prediction_interval()),
            "sync engine started"
        );
    }

    /// Cancel the prediction timer; no tick fires afterwards
    pub fn stop(&mut self) {
        if let Some(mut timer) = self.prediction_timer.take() {
            timer.cancel();
            tracing::info!("sync engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.prediction_timer
            .as_ref()
            .is_some_and(ScheduledTask::is_active)
    }

    /// Apply a snapshot received now
    pub fn handle_snapshot(&self, snapshot: AuthoritativeSnapshot) -> u64 {
        let received_at = self.shared.clock.now();
        self.shared.apply_snapshot(snapshot, received_at)
    }

    /// Apply a snapshot received at `received_at` on the local clock
    pub fn handle_snapshot_at(&self, snapshot: AuthoritativeSnapshot, received_at: LocalTime) -> u64 {
        self.shared.apply_snapshot(snapshot, received_at)
    }

    /// Decode and apply a raw snapshot message
    ///
    /// Only text that is not a JSON object is rejected, and a rejected
    /// message leaves the current predicted state in place. A message
    /// without `serverTime` is applied on the current offset.
    pub fn handle_message(&self, text: &str) -> SyncResult<u64> {
        let received_at = self.shared.clock.now();
        match decode_snapshot(text) {
            Ok(message) => Ok(self.shared.apply_message(message, received_at)),
            Err(e) => {
                self.shared.core.lock().stats.rejected_messages += 1;
                tracing::warn!(error = %e, "rejected snapshot message");
                Err(e)
            }
        }
    }

    /// Run one prediction tick immediately
    pub fn tick(&self) -> TickOutcome {
        self.shared.run_tick()
    }

    /// Server "now" as estimated at call time
    pub fn adjusted_now(&self) -> ServerTime {
        self.shared.core.lock().sync.adjusted_now(&*self.shared.clock)
    }

    pub fn offset(&self) -> ClockOffset {
        *self.shared.offset_tx.borrow()
    }

    pub fn predicted(&self) -> Option<Arc<PredictedState>> {
        self.shared.state_tx.borrow().clone()
    }

    /// Snapshots applied so far
    pub fn generation(&self) -> u64 {
        self.shared.core.lock().predictor.generation()
    }

    pub fn subscribe_state(&self) -> PredictedStateRx {
        self.shared.state_tx.subscribe()
    }

    pub fn subscribe_offset(&self) -> ClockOffsetRx {
        self.shared.offset_tx.subscribe()
    }

    pub fn subscribe_frame(&self) -> SyncFrameRx {
        self.shared.frame_tx.subscribe()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.shared.core.lock().stats.clone()
    }

    pub fn clock(&self) -> Arc<dyn LocalClock> {
        Arc::clone(&self.shared.clock)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use idlesync_core::{ActivityKind, ActivityRecord, ItemCategory, ItemId, ItemInfo};
    use idlesync_time::ManualClock;

    const SERVER_NOW: i64 = 1_700_000_000_000;
    const LOCAL_NOW: i64 = 1_699_999_990_000;

    fn catalog() -> Arc<ItemCatalog> {
        Arc::new(
            ItemCatalog::new()
                .with_item("OAK_LOG", ItemInfo::new("woodcutting", ItemCategory::Resource))
                .unwrap(),
        )
    }

    fn engine() -> (SyncEngine, ManualClock) {
        let clock = ManualClock::new(LocalTime::from_millis(LOCAL_NOW));
        let engine =
            SyncEngine::with_clock(EngineConfig::default(), catalog(), Arc::new(clock.clone()))
                .unwrap();
        (engine, clock)
    }

    fn snapshot(quantity: u32) -> AuthoritativeSnapshot {
        AuthoritativeSnapshot::new(ServerTime::from_millis(SERVER_NOW)).with_activity(
            ActivityRecord::new(
                ActivityKind::Gathering,
                "OAK_LOG",
                3_000,
                quantity,
                ServerTime::from_millis(SERVER_NOW + 3_000),
            ),
        )
    }

    fn remaining(engine: &SyncEngine) -> Option<u32> {
        engine
            .predicted()
            .and_then(|p| p.activity.as_ref().map(|a| a.actions_remaining))
    }

    #[test]
    fn test_offset_defaults_to_zero() {
        let (engine, _clock) = engine();
        assert_eq!(engine.offset(), ClockOffset::ZERO);
        assert_eq!(engine.adjusted_now(), ServerTime::from_millis(LOCAL_NOW));
        assert!(engine.predicted().is_none());
        assert_eq!(engine.tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_snapshot_sets_offset_and_state() {
        let (engine, _clock) = engine();
        let mut offsets = engine.subscribe_offset();
        let mut states = engine.subscribe_state();

        assert_eq!(engine.handle_snapshot(snapshot(10)), 1);

        assert_eq!(engine.offset().as_millis(), SERVER_NOW - LOCAL_NOW);
        assert_eq!(engine.adjusted_now(), ServerTime::from_millis(SERVER_NOW));
        assert!(offsets.has_changed().unwrap());
        assert!(states.has_changed().unwrap());
        assert_eq!(
            states.borrow_and_update().as_ref().unwrap().activity.as_ref().unwrap().actions_remaining,
            10
        );
        let _ = offsets.borrow_and_update();
    }

    #[test]
    fn test_manual_tick_uses_adjusted_now() {
        let (engine, clock) = engine();
        engine.handle_snapshot(snapshot(10));

        clock.advance(Duration::from_millis(2_999));
        assert!(matches!(engine.tick(), TickOutcome::Waiting { .. }));

        clock.advance(Duration::from_millis(1));
        assert_eq!(
            engine.tick(),
            TickOutcome::Advanced { completions: 1, cleared: false }
        );
        assert_eq!(remaining(&engine), Some(9));

        let stats = engine.stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.snapshots, 1);
    }

    #[test]
    fn test_new_snapshot_discards_prediction() {
        let (engine, clock) = engine();
        engine.handle_snapshot(snapshot(10));
        clock.advance(Duration::from_millis(9_000));
        engine.tick();
        assert_eq!(remaining(&engine), Some(7));

        // Server says only one action happened (e.g. a slow tool)
        let mut truth = snapshot(10);
        truth.server_time = ServerTime::from_millis(SERVER_NOW + 9_000);
        if let Some(a) = truth.activity.as_mut() {
            a.actions_remaining = 9;
            a.next_action_at = Some(ServerTime::from_millis(SERVER_NOW + 10_000));
        }
        assert_eq!(engine.handle_snapshot(truth), 2);

        let predicted = engine.predicted().unwrap();
        assert!(predicted.is_pristine());
        assert_eq!(remaining(&engine), Some(9));
    }

    #[test]
    fn test_rejected_message_keeps_state() {
        let (engine, _clock) = engine();
        engine.handle_snapshot(snapshot(10));
        let before = engine.predicted();

        assert!(engine.handle_message("{not json").is_err());
        assert_eq!(engine.predicted(), before);
        assert_eq!(engine.stats().rejected_messages, 1);
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_handle_message() {
        let (engine, _clock) = engine();
        let generation = engine
            .handle_message(&format!(
                r#"{{"serverTime": {SERVER_NOW}, "current_activity": {{"type": "GATHERING", "itemId": "OAK_LOG", "timePerActionMs": 3000, "initialQuantity": 5, "actionsRemaining": 5, "nextActionAt": {}}}}}"#,
                SERVER_NOW + 3_000
            ))
            .unwrap();

        assert_eq!(generation, 1);
        assert_eq!(remaining(&engine), Some(5));
        assert_eq!(engine.predicted().unwrap().state.inventory_count(&ItemId::new("OAK_LOG")), 0);
    }

    #[test]
    fn test_message_without_server_time_keeps_offset() {
        let (engine, clock) = engine();
        engine.handle_snapshot(snapshot(10));
        let offset = engine.offset();
        assert_eq!(offset.as_millis(), SERVER_NOW - LOCAL_NOW);

        clock.advance(Duration::from_millis(4_000));
        let generation = engine
            .handle_message(
                r#"{"current_activity": {"type": "GATHERING", "itemId": "OAK_LOG", "timePerActionMs": 3000, "initialQuantity": 10, "actionsRemaining": 5}, "state": {"silver": 3}}"#,
            )
            .unwrap();

        assert_eq!(generation, 2);
        assert_eq!(engine.offset(), offset);
        assert_eq!(remaining(&engine), Some(5));
        let predicted = engine.predicted().unwrap();
        assert_eq!(predicted.state.silver, 3);
        assert_eq!(predicted.based_on, ServerTime::from_millis(SERVER_NOW + 4_000));
        assert_eq!(engine.stats().rejected_messages, 0);
    }

    #[test]
    fn test_frame_pairs_offset_with_state() {
        let (engine, clock) = engine();
        let mut frames = engine.subscribe_frame();
        assert_eq!(*frames.borrow(), SyncFrame::default());

        engine.handle_snapshot(snapshot(10));
        assert!(frames.has_changed().unwrap());
        let frame = frames.borrow_and_update().clone();
        assert_eq!(frame.offset, engine.offset());
        assert_eq!(frame.predicted, engine.predicted());

        clock.advance(Duration::from_millis(3_000));
        engine.tick();
        let frame = frames.borrow_and_update().clone();
        assert_eq!(frame.offset.as_millis(), SERVER_NOW - LOCAL_NOW);
        assert_eq!(
            frame.predicted.unwrap().activity.as_ref().unwrap().actions_remaining,
            9
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            prediction_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(SyncEngine::new(config, catalog()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prediction_timer_advances_state() {
        let (mut engine, clock) = engine();
        engine.handle_snapshot(snapshot(10));
        engine.start();
        assert!(engine.is_running());

        clock.advance(Duration::from_millis(6_000));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(remaining(&engine), Some(8));
        assert!(engine.stats().ticks >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let (mut engine, clock) = engine();
        engine.handle_snapshot(snapshot(10));
        engine.start();
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        engine.stop();
        assert!(!engine.is_running());
        let ticks = engine.stats().ticks;

        clock.advance(Duration::from_millis(30_000));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(engine.stats().ticks, ticks);
        assert_eq!(remaining(&engine), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_sees_timer_updates() {
        let (mut engine, clock) = engine();
        let mut states = engine.subscribe_state();
        engine.handle_snapshot(snapshot(1));
        engine.start();
        states.borrow_and_update();

        clock.advance(Duration::from_millis(3_000));
        states.changed().await.unwrap();

        let latest = states.borrow_and_update().clone().unwrap();
        assert!(latest.activity.is_none());
        assert_eq!(latest.state.inventory_count(&ItemId::new("OAK_LOG")), 1);
    }
}
