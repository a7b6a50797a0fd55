use std::sync::Mutex;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

/// Wall-clock source. Timers read it instead of counting ticks so that
/// suspended hosts catch up on wake.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Default)]
pub struct SystemClock {}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        return Utc::now();
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> ManualClock {
        return ManualClock::new(Utc::now());
    }
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> ManualClock {
        return ManualClock {
            now: Mutex::new(start),
        };
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|err| return err.into_inner());
        *now = *now + duration;
    }

    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        return *self.now.lock().unwrap_or_else(|err| return err.into_inner());
    }
}
