//! Reconnect delay schedule.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

/// Doubling delay between reconnect attempts, capped at `max`.
///
/// Each delay is jittered into [0.5, 1.0) of its nominal value so several
/// monitors watching one device do not reconnect in lockstep.
#[derive(Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    jitter_state: RandomState,
    jitter_step: u64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
            jitter_state: RandomState::new(),
            jitter_step: 0,
        }
    }

    /// Delay before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.current;
        self.current = (self.current * 2).min(self.max);

        let mut hasher = self.jitter_state.build_hasher();
        hasher.write_u64(self.jitter_step);
        self.jitter_step = self.jitter_step.wrapping_add(1);
        let jitter = 0.5 + (hasher.finish() as f64 / u64::MAX as f64) * 0.5;

        nominal.mul_f64(jitter)
    }

    /// Back to the initial delay, after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(delay: Duration, nominal: Duration) -> bool {
        delay >= nominal / 2 && delay <= nominal
    }

    #[test]
    fn delays_double_until_capped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(1));

        assert!(within(backoff.next_delay(), Duration::from_millis(250)));
        assert!(within(backoff.next_delay(), Duration::from_millis(500)));
        assert!(within(backoff.next_delay(), Duration::from_secs(1)));
        assert!(within(backoff.next_delay(), Duration::from_secs(1)));
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(8));
        for _ in 0..4 {
            backoff.next_delay();
        }

        backoff.reset();
        assert!(within(backoff.next_delay(), Duration::from_millis(250)));
    }
}
