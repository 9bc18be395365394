//! Time primitives for IdleSync
//!
//! Two wall clocks are in play and they are never aligned:
//! - ServerTime: the remote simulation's clock, in which every scheduled
//!   timestamp of a snapshot is expressed
//! - LocalTime: this client's wall clock
//!
//! A ClockOffset bridges them: `adjusted_now = local_now + offset`.
//! All three are milliseconds since the Unix epoch (or a signed difference).

use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server-clock timestamp in milliseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTime(pub i64);

impl ServerTime {
    pub const ZERO: ServerTime = ServerTime(0);
    pub const MAX: ServerTime = ServerTime(i64::MAX);

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        ServerTime(millis)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn saturating_add_millis(self, millis: i64) -> Self {
        ServerTime(self.0.saturating_add(millis))
    }

    #[inline]
    pub fn checked_add_millis(self, millis: i64) -> Option<Self> {
        self.0.checked_add(millis).map(ServerTime)
    }

    /// Signed distance `self - earlier` in milliseconds
    #[inline]
    pub fn millis_since(self, earlier: ServerTime) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for ServerTime {
    type Output = ServerTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let millis = i64::try_from(rhs.as_millis()).unwrap_or(i64::MAX);
        self.saturating_add_millis(millis)
    }
}

impl Sub<Duration> for ServerTime {
    type Output = ServerTime;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        let millis = i64::try_from(rhs.as_millis()).unwrap_or(i64::MAX);
        ServerTime(self.0.saturating_sub(millis))
    }
}

impl Sub<ServerTime> for ServerTime {
    type Output = Duration;

    /// Non-negative span; a later `rhs` yields zero
    #[inline]
    fn sub(self, rhs: ServerTime) -> Self::Output {
        let diff = self.millis_since(rhs);
        if diff >= 0 {
            Duration::from_millis(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for ServerTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server({}ms)", self.0)
    }
}

/// Local wall-clock timestamp in milliseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalTime(pub i64);

impl LocalTime {
    pub const ZERO: LocalTime = LocalTime(0);

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        LocalTime(millis)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl Add<Duration> for LocalTime {
    type Output = LocalTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let millis = i64::try_from(rhs.as_millis()).unwrap_or(i64::MAX);
        LocalTime(self.0.saturating_add(millis))
    }
}

impl Add<ClockOffset> for LocalTime {
    type Output = ServerTime;

    #[inline]
    fn add(self, rhs: ClockOffset) -> Self::Output {
        ServerTime(self.0.saturating_add(rhs.0))
    }
}

impl std::fmt::Debug for LocalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local({}ms)", self.0)
    }
}

/// Server-minus-local clock difference in milliseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockOffset(pub i64);

impl ClockOffset {
    /// Trust the local clock
    pub const ZERO: ClockOffset = ClockOffset(0);

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        ClockOffset(millis)
    }

    /// Offset that maps `local` onto `server`
    #[inline]
    pub fn between(server: ServerTime, local: LocalTime) -> Self {
        ClockOffset(server.0.saturating_sub(local.0))
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl std::fmt::Debug for ClockOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset({:+}ms)", self.0)
    }
}
