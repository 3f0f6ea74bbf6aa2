//! Bounded exponential backoff.
//!
//! One `Backoff` tracks a single operation's retry budget: the delay
//! doubles after every failure up to a cap, and `next_delay` returns
//! `None` once the attempt budget is spent.

use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug)]
pub struct Backoff {
    attempts_left: u32,
    delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            // The first attempt is not a retry.
            attempts_left: attempts.saturating_sub(1),
            delay: base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay to sleep before the next retry, or `None` when the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_left == 0 {
            return None;
        }
        self.attempts_left -= 1;
        let delay = self.delay;
        self.delay = (self.delay * 2).min(self.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = Backoff::new(5, Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut backoff = Backoff::new(1, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), None);
    }
}
