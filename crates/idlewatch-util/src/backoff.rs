//! Exponential backoff for reconnect attempts

use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default ceiling for the retry delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling backoff with a ceiling.
///
/// Each call to [`Backoff::next_delay`] returns the delay to sleep before the
/// next attempt and doubles the stored delay, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a new backoff
    ///
    /// # Arguments
    /// * `initial` - Delay returned by the first call to `next_delay`
    /// * `max` - Upper bound for any returned delay
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to sleep now; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay the next call to `next_delay` will return
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Start the schedule over from the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_ceiling() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn delay_for_attempt_k_matches_closed_form() {
        let mut backoff = Backoff::default();
        for k in 1..=20u32 {
            let expected = 2u64.saturating_pow(k - 1).min(30);
            assert_eq!(backoff.next_delay(), Duration::from_secs(expected), "attempt {k}");
        }
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_millis(400));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn initial_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }
}
