//! Local clocks and server clock synchronization

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use idlesync_core::{ClockOffset, LocalTime, ServerTime};

/// Offset jumps larger than this are logged
const JUMP_LOG_THRESHOLD_MS: i64 = 1_000;

/// Source of local wall-clock time
pub trait LocalClock: Send + Sync {
    fn now(&self) -> LocalTime;
}

/// OS wall clock, milliseconds since the Unix epoch
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now(&self) -> LocalTime {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        LocalTime::from_millis(millis)
    }
}

/// Settable clock shared between clones; for tests and simulation
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: LocalTime) -> Self {
        ManualClock {
            now: Arc::new(AtomicI64::new(start.as_millis())),
        }
    }

    pub fn set(&self, t: LocalTime) {
        self.now.store(t.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: Duration) {
        let millis = i64::try_from(dt.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl LocalClock for ManualClock {
    fn now(&self) -> LocalTime {
        LocalTime::from_millis(self.now.load(Ordering::SeqCst))
    }
}

/// One (server, local) pairing taken at snapshot receipt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockObservation {
    pub server: ServerTime,
    pub local: LocalTime,
}

/// Server clock estimate
///
/// The offset is taken verbatim from the latest observation. There is no
/// smoothing: one snapshot delayed by unusual jitter skews every timer until
/// the next snapshot replaces it.
#[derive(Clone, Debug, Default)]
pub struct ClockSync {
    offset: ClockOffset,
    last: Option<ClockObservation>,
    /// Offset change caused by the latest observation
    last_jump: Option<i64>,
    observations: u64,
}

impl ClockSync {
    /// Unsynchronized: zero offset, i.e. trust the local clock
    pub fn new() -> Self {
        ClockSync::default()
    }

    /// Record a snapshot's server time and the local time it arrived at
    pub fn observe(&mut self, server: ServerTime, local: LocalTime) -> ClockOffset {
        let offset = ClockOffset::between(server, local);

        if self.last.is_some() {
            let jump = offset.as_millis().saturating_sub(self.offset.as_millis());
            if jump.abs() > JUMP_LOG_THRESHOLD_MS {
                tracing::debug!(
                    previous = self.offset.as_millis(),
                    current = offset.as_millis(),
                    jump,
                    "clock offset jumped"
                );
            }
            self.last_jump = Some(jump);
        }

        self.offset = offset;
        self.last = Some(ClockObservation { server, local });
        self.observations += 1;
        offset
    }

    pub fn offset(&self) -> ClockOffset {
        self.offset
    }

    /// At least one snapshot has been observed
    pub fn is_established(&self) -> bool {
        self.last.is_some()
    }

    pub fn last_observation(&self) -> Option<ClockObservation> {
        self.last
    }

    /// Change in offset from the previous observation to the latest one
    pub fn last_jump(&self) -> Option<i64> {
        self.last_jump
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Map a local timestamp onto the server clock
    #[inline]
    pub fn to_server(&self, local: LocalTime) -> ServerTime {
        local + self.offset
    }

    /// Server "now", read from `clock` at call time. Do not cache across ticks.
    pub fn adjusted_now<C: LocalClock + ?Sized>(&self, clock: &C) -> ServerTime {
        self.to_server(clock.now())
    }
}
