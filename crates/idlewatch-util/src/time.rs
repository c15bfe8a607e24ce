//! Time utilities for idlewatch
//!
//! Provides monotonic time for the uptime and idle clocks plus duration
//! formatting for log output. Decision logic only ever looks at monotonic
//! instants obtained through a [`Clock`], so tests can drive it with a
//! [`ManualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Whole minutes contained in `duration`, truncating any remainder.
///
/// Thresholds are expressed in minutes, and comparisons happen at that
/// granularity so a decision cannot flap at sub-minute boundaries.
pub fn whole_minutes(duration: Duration) -> u64 {
    duration.as_secs() / 60
}

/// Render a duration rounded to the second, e.g. `1h02m05s`, `4m00s`, `12s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs() + u64::from(duration.subsec_millis() >= 500);
    let (hours, rem) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Represents a point in monotonic time.
/// This is immune to wall-clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Duration since `earlier`, or zero if `earlier` is actually later
    pub fn saturating_duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> MonotonicInstant;
}

/// Clock backed by the operating system's monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<MonotonicInstant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(MonotonicInstant::now())
    }

    pub fn starting_at(start: MonotonicInstant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = *current + by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MonotonicInstant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
