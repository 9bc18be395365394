//! Snapshot Simulator - End-to-end harness for prediction
//!
//! Simulates:
//! - An authoritative server resolving a timed activity on its own clock
//! - A client whose local clock is skewed from the server's
//! - A real-time channel with random, in-order delivery latency
//! - The client engine core (clock sync + predictor) ticking between snapshots
//!
//! Every step compares the predicted copy against the server's truth.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use idlesync_core::{
    ActivityKind, ActivityRecord, AuthoritativeSnapshot, CharacterSheet, ItemCatalog, ItemId,
    LocalTime, ServerTime, SkillProgress, SyncResult,
};
use idlesync_state::{RewardModel, RewardTable, StatePredictor, TableRewardModel, TickOutcome};
use idlesync_time::{ClockSync, ManualClock};

/// Delivery delay of the real-time channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyModel {
    /// Fixed part of every delivery (ms)
    pub base_ms: u64,
    /// Uniform random extra delay, 0..=jitter_ms
    pub jitter_ms: u64,
}

impl LatencyModel {
    pub const fn new(base_ms: u64, jitter_ms: u64) -> Self {
        LatencyModel { base_ms, jitter_ms }
    }

    pub const fn instant() -> Self {
        Self::new(0, 0)
    }

    pub const fn lan() -> Self {
        Self::new(5, 5)
    }

    pub const fn mobile() -> Self {
        Self::new(120, 250)
    }

    /// Long stalls, well above a typical action duration's share
    pub const fn hostile() -> Self {
        Self::new(300, 2_000)
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_ms + jitter)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.base_ms + self.jitter_ms)
    }
}

/// Authoritative game server holding one character
pub struct SimulatedServer {
    catalog: Arc<ItemCatalog>,
    rewards: Arc<dyn RewardModel>,
    activity: Option<ActivityRecord>,
    sheet: CharacterSheet,
    now: ServerTime,
    completions: u64,
}

impl SimulatedServer {
    pub fn new(catalog: Arc<ItemCatalog>, rewards: Arc<dyn RewardModel>, start: ServerTime) -> Self {
        SimulatedServer {
            catalog,
            rewards,
            activity: None,
            sheet: CharacterSheet::default(),
            now: start,
            completions: 0,
        }
    }

    /// Start an activity whose first completion is one action from now
    pub fn start_activity(
        &mut self,
        kind: ActivityKind,
        item_id: impl Into<ItemId>,
        time_per_action_ms: u64,
        quantity: u32,
    ) {
        let first = self.now + Duration::from_millis(time_per_action_ms);
        self.activity = Some(ActivityRecord::new(
            kind,
            item_id,
            time_per_action_ms,
            quantity,
            first,
        ));
    }

    /// Resolve every completion due by `now`; returns how many fired
    ///
    /// Time never moves backwards; an earlier `now` is ignored.
    pub fn advance_to(&mut self, now: ServerTime) -> u32 {
        if now <= self.now {
            return 0;
        }
        self.now = now;

        let mut fired = 0;
        while let Some(activity) = self.activity.as_mut() {
            let Some(next) = activity.next_action_at else {
                break;
            };
            if next > now || activity.actions_remaining == 0 {
                break;
            }

            if let Some(info) = self.catalog.get(&activity.item_id) {
                let reward = self.rewards.reward(activity, info);
                let count = self
                    .sheet
                    .inventory
                    .entry(activity.item_id.clone())
                    .or_insert(0);
                *count = count.saturating_add(reward.quantity);
                let skill = self
                    .sheet
                    .skills
                    .entry(info.skill.clone())
                    .or_insert(SkillProgress::new(1, 0));
                skill.experience = skill.experience.saturating_add(reward.experience);
            }

            activity.actions_remaining -= 1;
            activity.next_action_at = Some(next + activity.time_per_action());
            fired += 1;

            if activity.actions_remaining == 0 {
                self.activity = None;
            }
        }

        self.completions += fired as u64;
        fired
    }

    pub fn snapshot(&self) -> AuthoritativeSnapshot {
        AuthoritativeSnapshot {
            server_time: self.now,
            activity: self.activity.clone(),
            state: self.sheet.clone(),
        }
    }

    pub fn activity(&self) -> Option<&ActivityRecord> {
        self.activity.as_ref()
    }

    pub fn sheet(&self) -> &CharacterSheet {
        &self.sheet
    }

    pub fn now(&self) -> ServerTime {
        self.now
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }
}

/// Harness settings
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Client prediction tick
    pub tick_interval: Duration,
    /// How often the server pushes a snapshot
    pub snapshot_interval: Duration,
    pub latency: LatencyModel,
    /// Client local clock minus server clock (ms)
    pub clock_skew_ms: i64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_interval: Duration::from_millis(500),
            snapshot_interval: Duration::from_secs(5),
            latency: LatencyModel::lan(),
            clock_skew_ms: 0,
            seed: 42,
        }
    }
}

struct InFlight {
    sent_at: Duration,
    deliver_at: Duration,
    snapshot: AuthoritativeSnapshot,
}

/// What the client last applied, for the divergence bound
#[derive(Clone, Copy, Debug)]
struct Applied {
    server_time: ServerTime,
    remaining: u32,
    time_per_action_ms: u64,
}

/// Simulation statistics
#[derive(Clone, Debug, Default)]
pub struct SimulationReport {
    pub steps: u64,
    pub snapshots_sent: u64,
    pub snapshots_applied: u64,
    /// Completions synthesized by the client
    pub synthesized: u64,
    pub stalls: u64,
    /// Largest number of actions the client trailed the server by
    pub max_lag_actions: u32,
    /// Steps where the client was ahead of the server
    pub overshoots: u64,
    /// Steps where more completions were synthesized than time allows
    pub bound_violations: u64,
    /// Largest |offset - true offset| seen (ms)
    pub max_offset_error_ms: i64,
    lag_samples: Vec<u32>,
}

impl SimulationReport {
    pub fn avg_lag_actions(&self) -> f64 {
        if self.lag_samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.lag_samples.iter().map(|&lag| lag as u64).sum();
        sum as f64 / self.lag_samples.len() as f64
    }

    pub fn is_sound(&self) -> bool {
        self.overshoots == 0 && self.bound_violations == 0
    }
}

/// Server, channel and client core stepped together in virtual time
pub struct SnapshotSimulator {
    config: SimulationConfig,
    server: SimulatedServer,
    predictor: StatePredictor,
    sync: ClockSync,
    clock: ManualClock,
    rng: StdRng,
    in_flight: VecDeque<InFlight>,
    start: ServerTime,
    elapsed: Duration,
    last_sent: Option<Duration>,
    applied: Option<Applied>,
}

impl SnapshotSimulator {
    /// Server and client share the default reward table
    pub fn new(config: SimulationConfig, catalog: Arc<ItemCatalog>, start: ServerTime) -> Self {
        Self::with_server_rewards(config, catalog, start, RewardTable::default())
    }

    /// Server credits from its own table; the client still guesses defaults
    pub fn with_server_rewards(
        config: SimulationConfig,
        catalog: Arc<ItemCatalog>,
        start: ServerTime,
        server_rewards: RewardTable,
    ) -> Self {
        let clock = ManualClock::new(LocalTime::from_millis(
            start.as_millis().saturating_add(config.clock_skew_ms),
        ));
        SnapshotSimulator {
            rng: StdRng::seed_from_u64(config.seed),
            server: SimulatedServer::new(
                Arc::clone(&catalog),
                Arc::new(TableRewardModel::new(server_rewards)),
                start,
            ),
            predictor: StatePredictor::new(catalog),
            sync: ClockSync::new(),
            clock,
            in_flight: VecDeque::new(),
            start,
            elapsed: Duration::ZERO,
            last_sent: None,
            applied: None,
            config,
        }
    }

    pub fn server(&self) -> &SimulatedServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut SimulatedServer {
        &mut self.server
    }

    pub fn predictor(&self) -> &StatePredictor {
        &self.predictor
    }

    pub fn sync(&self) -> &ClockSync {
        &self.sync
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Actions left in the client's predicted copy
    pub fn predicted_remaining(&self) -> u32 {
        remaining_of(
            self.predictor
                .predicted()
                .and_then(|predicted| predicted.activity.as_ref()),
        )
    }

    /// Run for `duration` of virtual time
    pub fn run(&mut self, duration: Duration) -> SimulationReport {
        let mut report = SimulationReport::default();
        let steps = duration.as_millis() / self.config.tick_interval.as_millis().max(1);
        for _ in 0..steps {
            self.step(&mut report);
        }
        report
    }

    fn server_time_at(&self, elapsed: Duration) -> ServerTime {
        self.start + elapsed
    }

    fn local_time_at(&self, elapsed: Duration) -> LocalTime {
        LocalTime::from_millis(self.start.as_millis().saturating_add(self.config.clock_skew_ms))
            + elapsed
    }

    fn step(&mut self, report: &mut SimulationReport) {
        self.elapsed += self.config.tick_interval;
        self.server.advance_to(self.server_time_at(self.elapsed));
        self.clock.set(self.local_time_at(self.elapsed));

        self.send_due(report);
        self.deliver_due(report);

        match self.predictor.tick_now(&self.sync, &self.clock) {
            TickOutcome::Advanced { completions, .. } => report.synthesized += completions as u64,
            TickOutcome::Stalled(_) => report.stalls += 1,
            TickOutcome::Idle | TickOutcome::Waiting { .. } => {}
        }

        report.steps += 1;
        self.record(report);
    }

    fn send_due(&mut self, report: &mut SimulationReport) {
        let due = self
            .last_sent
            .map_or(true, |sent| self.elapsed - sent >= self.config.snapshot_interval);
        if !due {
            return;
        }

        let latency = self.config.latency.sample(&mut self.rng);
        // The channel is ordered: never overtake an earlier message
        let earliest = self
            .in_flight
            .back()
            .map_or(Duration::ZERO, |msg| msg.deliver_at);
        self.in_flight.push_back(InFlight {
            sent_at: self.elapsed,
            deliver_at: (self.elapsed + latency).max(earliest),
            snapshot: self.server.snapshot(),
        });
        self.last_sent = Some(self.elapsed);
        report.snapshots_sent += 1;
    }

    fn deliver_due(&mut self, report: &mut SimulationReport) {
        while self
            .in_flight
            .front()
            .is_some_and(|msg| msg.deliver_at <= self.elapsed)
        {
            let Some(msg) = self.in_flight.pop_front() else {
                break;
            };
            let received_at = self.local_time_at(msg.deliver_at);
            let offset = self.sync.observe(msg.snapshot.server_time, received_at);

            let true_offset = -self.config.clock_skew_ms;
            let error = (offset.as_millis() - true_offset).abs();
            report.max_offset_error_ms = report.max_offset_error_ms.max(error);

            self.predictor.on_snapshot(msg.snapshot);
            let activity = self
                .predictor
                .predicted()
                .and_then(|predicted| predicted.activity.as_ref());
            self.applied = self.predictor.authoritative().map(|snapshot| Applied {
                server_time: snapshot.server_time,
                remaining: remaining_of(activity),
                time_per_action_ms: activity.map_or(0, |a| a.time_per_action_ms),
            });
            report.snapshots_applied += 1;

            tracing::debug!(
                latency_ms = (msg.deliver_at - msg.sent_at).as_millis() as u64,
                offset = offset.as_millis(),
                "snapshot delivered"
            );
        }
    }

    fn record(&self, report: &mut SimulationReport) {
        let Some(applied) = self.applied else {
            return;
        };
        let predicted = self.predicted_remaining();
        let truth = remaining_of(self.server.activity());

        if predicted < truth {
            report.overshoots += 1;
        }
        let lag = predicted.saturating_sub(truth);
        report.max_lag_actions = report.max_lag_actions.max(lag);
        report.lag_samples.push(lag);

        // remaining >= applied - ceil(delta / per_action)
        if applied.time_per_action_ms > 0 {
            let adjusted_now = self.sync.adjusted_now(&self.clock);
            let delta_ms = u64::try_from((adjusted_now - applied.server_time).as_millis())
                .unwrap_or(u64::MAX);
            let allowed = delta_ms.div_ceil(applied.time_per_action_ms);
            let floor = (applied.remaining as u64).saturating_sub(allowed);
            if (predicted as u64) < floor {
                report.bound_violations += 1;
            }
        }
    }
}

fn remaining_of(activity: Option<&ActivityRecord>) -> u32 {
    activity.map_or(0, |a| a.actions_remaining)
}

/// Predefined scenarios, each running one gathering activity
pub mod scenarios {
    use super::*;

    use idlesync_core::{ItemCategory, ItemInfo};

    pub const START: ServerTime = ServerTime(1_700_000_000_000);
    pub const ITEM: &str = "OAK_LOG";
    pub const TIME_PER_ACTION_MS: u64 = 3_000;

    pub fn catalog() -> SyncResult<Arc<ItemCatalog>> {
        ItemCatalog::new()
            .with_item(ITEM, ItemInfo::new("woodcutting", ItemCategory::Resource))
            .map(Arc::new)
    }

    fn gathering(config: SimulationConfig, quantity: u32) -> SyncResult<SnapshotSimulator> {
        let mut sim = SnapshotSimulator::new(config, catalog()?, START);
        sim.server_mut()
            .start_activity(ActivityKind::Gathering, ITEM, TIME_PER_ACTION_MS, quantity);
        Ok(sim)
    }

    /// Zero latency, aligned clocks
    pub fn ideal(quantity: u32) -> SyncResult<SnapshotSimulator> {
        gathering(
            SimulationConfig {
                latency: LatencyModel::instant(),
                ..SimulationConfig::default()
            },
            quantity,
        )
    }

    /// Phone on a cellular link, clock a few minutes fast
    pub fn mobile(quantity: u32, seed: u64) -> SyncResult<SnapshotSimulator> {
        gathering(
            SimulationConfig {
                latency: LatencyModel::mobile(),
                clock_skew_ms: 4 * 60 * 1_000,
                seed,
                ..SimulationConfig::default()
            },
            quantity,
        )
    }

    /// Multi-second stalls and a clock an hour behind
    pub fn hostile(quantity: u32, seed: u64) -> SyncResult<SnapshotSimulator> {
        gathering(
            SimulationConfig {
                latency: LatencyModel::hostile(),
                clock_skew_ms: -60 * 60 * 1_000,
                snapshot_interval: Duration::from_secs(3),
                seed,
                ..SimulationConfig::default()
            },
            quantity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lag_bound(latency: LatencyModel) -> u32 {
        let max_ms = latency.max().as_millis() as u64;
        max_ms.div_ceil(scenarios::TIME_PER_ACTION_MS) as u32
    }

    #[test]
    fn test_server_resolves_on_schedule() {
        let mut server = SimulatedServer::new(
            scenarios::catalog().unwrap(),
            Arc::new(TableRewardModel::default()),
            scenarios::START,
        );
        server.start_activity(ActivityKind::Gathering, scenarios::ITEM, 3_000, 5);

        assert_eq!(server.advance_to(scenarios::START + Duration::from_millis(2_999)), 0);
        assert_eq!(server.advance_to(scenarios::START + Duration::from_millis(9_000)), 3);
        assert_eq!(server.activity().unwrap().actions_remaining, 2);
        assert_eq!(server.sheet().inventory_count(&ItemId::new(scenarios::ITEM)), 3);

        // Backwards time is ignored
        assert_eq!(server.advance_to(scenarios::START), 0);

        assert_eq!(server.advance_to(scenarios::START + Duration::from_secs(60)), 2);
        assert!(server.activity().is_none());
        assert_eq!(server.completions(), 5);
    }

    #[test]
    fn test_ideal_channel_tracks_exactly() {
        let mut sim = scenarios::ideal(20).unwrap();
        let report = sim.run(Duration::from_secs(30));

        assert!(report.is_sound());
        assert_eq!(report.max_lag_actions, 0);
        assert_eq!(report.max_offset_error_ms, 0);
        assert!(report.synthesized > 0);
    }

    #[test]
    fn test_mobile_link_bounded_lag() {
        let mut sim = scenarios::mobile(30, 7).unwrap();
        let report = sim.run(Duration::from_secs(60));

        assert!(report.is_sound());
        assert!(report.max_lag_actions <= lag_bound(LatencyModel::mobile()));
        assert!(report.max_offset_error_ms <= LatencyModel::mobile().max().as_millis() as i64);
        assert!(report.snapshots_applied >= 10);
    }

    #[test]
    fn test_hostile_link_bounded_lag() {
        let mut sim = scenarios::hostile(50, 1234).unwrap();
        let report = sim.run(Duration::from_secs(120));

        println!(
            "Hostile link - max lag: {} actions, avg lag: {:.2}",
            report.max_lag_actions,
            report.avg_lag_actions()
        );
        assert!(report.is_sound());
        assert!(report.max_lag_actions <= lag_bound(LatencyModel::hostile()));
        assert_eq!(report.stalls, 0);
    }

    #[test]
    fn test_finished_activity_converges() {
        let mut sim = scenarios::hostile(10, 99).unwrap();
        // 10 actions take 30s; leave room for a late final snapshot
        let report = sim.run(Duration::from_secs(60));

        assert!(report.is_sound());
        assert!(sim.server().activity().is_none());
        assert_eq!(sim.predicted_remaining(), 0);
        let predicted = sim.predictor().predicted().unwrap();
        assert_eq!(&predicted.state, sim.server().sheet());
    }

    #[test]
    fn test_reward_guess_is_overwritten() {
        let mut server_rewards = RewardTable::default();
        server_rewards.gathering.yield_per_action = 3;
        let mut sim = SnapshotSimulator::with_server_rewards(
            SimulationConfig::default(),
            scenarios::catalog().unwrap(),
            scenarios::START,
            server_rewards,
        );
        sim.server_mut().start_activity(
            ActivityKind::Gathering,
            scenarios::ITEM,
            scenarios::TIME_PER_ACTION_MS,
            5,
        );

        sim.run(Duration::from_secs(40));
        let item = ItemId::new(scenarios::ITEM);
        assert_eq!(sim.server().sheet().inventory_count(&item), 15);
        let predicted = sim.predictor().predicted().unwrap();
        assert_eq!(predicted.state.inventory_count(&item), 15);
    }

    #[test]
    fn test_scenario_catalog() {
        let catalog = scenarios::catalog().unwrap();
        let item = catalog.get(&ItemId::new(scenarios::ITEM)).unwrap();
        assert_eq!(item.skill.as_str(), "woodcutting");

        let sim = scenarios::ideal(3).unwrap();
        assert_eq!(sim.server().activity().unwrap().actions_remaining, 3);
    }

    #[test]
    fn test_latency_model() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = LatencyModel::mobile();
        for _ in 0..100 {
            let sample = model.sample(&mut rng);
            assert!(sample >= Duration::from_millis(model.base_ms));
            assert!(sample <= model.max());
        }
        assert_eq!(LatencyModel::instant().sample(&mut rng), Duration::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_prediction_never_overshoots(
            seed in any::<u64>(),
            base_ms in 0u64..500,
            jitter_ms in 0u64..3_000,
            skew_ms in -86_400_000i64..86_400_000,
            snapshot_secs in 1u64..10,
        ) {
            let latency = LatencyModel::new(base_ms, jitter_ms);
            let config = SimulationConfig {
                latency,
                clock_skew_ms: skew_ms,
                snapshot_interval: Duration::from_secs(snapshot_secs),
                seed,
                ..SimulationConfig::default()
            };
            let mut sim = SnapshotSimulator::new(config, scenarios::catalog().unwrap(), scenarios::START);
            sim.server_mut().start_activity(
                ActivityKind::Gathering,
                scenarios::ITEM,
                scenarios::TIME_PER_ACTION_MS,
                25,
            );

            let report = sim.run(Duration::from_secs(90));
            prop_assert!(report.is_sound());
            prop_assert!(report.max_lag_actions <= lag_bound(latency));
        }
    }
}
