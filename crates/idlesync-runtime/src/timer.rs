//! Cancellable scheduled tasks
//!
//! A `ScheduledTask` is a fixed-interval loop on the tokio runtime. It is
//! re-armed after every firing and stops when its callback breaks, when it
//! is cancelled, or when the handle is dropped. No callback runs after any of
//! those.

use std::fmt;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a recurring timer; dropping it cancels the timer
pub struct ScheduledTask {
    name: &'static str,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `f` now and then every `period` until it returns `Break`
    ///
    /// Must be called from within a tokio runtime.
    pub fn every<F>(name: &'static str, period: Duration, mut f: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A late firing is not followed by a burst of catch-up firings
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if f().is_break() {
                    tracing::trace!(timer = name, "timer finished");
                    break;
                }
            }
        });

        tracing::trace!(timer = name, period = %humantime::format_duration(period), "timer armed");
        ScheduledTask {
            name,
            period,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Armed and not yet finished
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the timer; idempotent
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::trace!(timer = self.name, "timer cancelled");
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("active", &self.is_active())
            .finish()
    }
}
