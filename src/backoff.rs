//! Capped exponential backoff shared by the prober and the provisioner.

use std::time::Duration;

/// Default ceiling, as a multiple of the base delay.
pub const DEFAULT_CEILING_FACTOR: u32 = 8;

/// Tracks the delay before the next retry.
///
/// Starts at `base` and doubles after every [`Backoff::next_delay`] call,
/// never exceeding `base * ceiling_factor`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling_factor: u32) -> Self {
        Self {
            base,
            current: base,
            max: base.saturating_mul(ceiling_factor.max(1)),
        }
    }

    /// Return the delay to wait now and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay the next call to [`Backoff::next_delay`] would return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Upper bound of any single delay.
    pub fn ceiling(&self) -> Duration {
        self.max
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 8);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
    }

    #[test]
    fn caps_at_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 8);
        for _ in 0..10 {
            backoff.next_delay();
        }
        // 100 → 200 → 400 → 800 → 800 ...
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.ceiling(), Duration::from_millis(800));
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_secs(1), 8);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_secs(4));

        backoff.reset();
        assert_eq!(backoff.peek(), Duration::from_secs(1));
    }

    #[test]
    fn zero_factor_means_constant_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(50), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }
}
