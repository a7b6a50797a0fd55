#[cfg(test)]
#[path = "countdown_test.rs"]
mod tests;

use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::Clock;

/// Countdown against an absolute deadline. Remaining time is always derived
/// from the wall clock, never from counted ticks.
#[derive(Clone, Debug)]
pub struct Countdown {
    duration: Duration,
    deadline: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    fired: bool,
}

impl Countdown {
    pub fn new(duration: Duration) -> Countdown {
        return Countdown {
            duration,
            deadline: None,
            paused_at: None,
            fired: false,
        };
    }

    /// Arms the countdown. Deadlines past the calendar's end clamp to it.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(
            now.checked_add_signed(self.duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        self.paused_at = None;
        self.fired = false;
    }

    pub fn is_started(&self) -> bool {
        return self.deadline.is_some();
    }

    pub fn is_paused(&self) -> bool {
        return self.paused_at.is_some();
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => return self.duration,
        };

        let reference = self.paused_at.unwrap_or(now);
        let remaining = deadline - reference;
        if remaining < Duration::zero() {
            return Duration::zero();
        }

        return remaining;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.deadline.is_none() || self.paused_at.is_some() {
            return;
        }

        self.paused_at = Some(now);
    }

    /// Shifts the deadline forward by however long the countdown was paused.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        let paused_at = match self.paused_at.take() {
            Some(paused_at) => paused_at,
            None => return,
        };

        if let Some(deadline) = self.deadline {
            self.deadline = Some(
                deadline
                    .checked_add_signed(now - paused_at)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
        }
    }

    /// Returns true exactly once, on the first tick at or past the deadline.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.fired || self.deadline.is_none() || self.is_paused() {
            return false;
        }

        if self.remaining(now) > Duration::zero() {
            return false;
        }

        tracing::debug!(duration_ms = self.duration.num_milliseconds(), "Countdown expired");
        self.fired = true;
        return true;
    }

    /// Disarms the countdown with a new duration. It runs again after the
    /// next `start`.
    pub fn reset(&mut self, duration: Duration) {
        self.duration = duration;
        self.deadline = None;
        self.paused_at = None;
        self.fired = false;
    }
}

/// Drives a countdown on a polling interval until it fires or is cancelled.
/// Returns whether `on_timeout` ran.
pub async fn run_countdown<F>(
    mut countdown: Countdown,
    clock: Arc<dyn Clock + Send + Sync>,
    interval: std::time::Duration,
    cancel: CancellationToken,
    on_timeout: F,
) -> bool
where
    F: FnOnce(),
{
    if !countdown.is_started() {
        countdown.start(clock.now());
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return false;
            }
            _ = ticker.tick() => {
                if countdown.tick(clock.now()) {
                    on_timeout();
                    return true;
                }
            }
        }
    }
}
