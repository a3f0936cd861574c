//! Reconnect delay for the broker connection
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max) + jitter
//! ```
//!
//! Unlike a retry budget this never gives up: the print worker has nothing
//! better to do than wait for its broker.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    /// Upper bound of the random fraction added to each delay
    jitter: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max.max(initial),
            multiplier: multiplier.max(1.0),
            jitter: 0.1,
        }
    }

    /// Call once the connection is back
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
    }

    /// Delay before the next attempt
    pub fn next_sleep(&mut self) -> Duration {
        let base = self.current_delay;

        let next = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next.min(self.max_delay.as_secs_f64()));

        if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            base + base.mul_f64(extra)
        } else {
            base
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(initial: Duration, max: Duration) -> Backoff {
        Backoff {
            jitter: 0.0,
            ..Backoff::new(initial, max, 2.0)
        }
    }

    #[test]
    fn test_grows_until_cap() {
        let mut backoff = steady(Duration::from_secs(1), Duration::from_secs(4));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_sleep().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 4, 4]);
    }

    #[test]
    fn test_reset() {
        let mut backoff = steady(Duration::from_secs(1), Duration::from_secs(30));
        backoff.next_sleep();
        backoff.next_sleep();
        backoff.reset();
        assert_eq!(backoff.next_sleep(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(2), 1.0);
        for _ in 0..50 {
            let d = backoff.next_sleep();
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2200));
        }
    }
}
