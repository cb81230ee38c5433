//! Jittered exponential backoff
//!
//! Replaces fixed-sleep retry loops: delays double up to a cap, with uniform
//! jitter in [half, full] so concurrent retries against the same endpoint
//! decorrelate.

use rand::Rng;
use std::time::Duration;

pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Next delay: jittered exponential, capped at `max`
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX));
        let capped = std::cmp::min(exp, self.max);
        self.attempt = self.attempt.saturating_add(1);

        let full = capped.as_millis() as u64;
        if full <= 1 {
            return capped;
        }
        let jittered = rand::thread_rng().gen_range(full / 2..=full);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_stay_within_jitter_bounds() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));

        for attempt in 0..5u32 {
            let expected_full = 100u64 << attempt;
            let delay = backoff.next_delay().as_millis() as u64;
            assert!(
                delay >= expected_full / 2 && delay <= expected_full,
                "attempt {}: delay {} outside [{}, {}]",
                attempt,
                delay,
                expected_full / 2,
                expected_full
            );
        }
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));

        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_millis(400));
        }
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        for _ in 0..6 {
            backoff.next_delay();
        }
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }

    #[test]
    fn shift_overflow_saturates_at_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30));
        for _ in 0..40 {
            backoff.next_delay();
        }
        // Past 32 doublings the shift would overflow; the cap must hold
        assert!(backoff.next_delay() <= Duration::from_secs(30));
    }
}
