//! Exponential reconnect backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Doubling delay, capped, with uniform random jitter added on top
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    delay_initial: Duration,
    delay_max: Duration,
    delay_current: Duration,
    jitter_ms: u64,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(delay_initial: Duration, delay_max: Duration, jitter_ms: u64) -> Self {
        Self {
            delay_initial,
            delay_max,
            delay_current: delay_initial,
            jitter_ms,
            attempts: 0,
        }
    }

    /// Delay before the next attempt; advances the backoff
    pub fn next_duration(&mut self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        let delay = self.delay_current + Duration::from_millis(jitter);

        self.delay_current = (self.delay_current * 2).min(self.delay_max);
        self.attempts = self.attempts.saturating_add(1);

        delay
    }

    /// Back to the initial delay after a healthy connection
    pub fn reset(&mut self) {
        self.delay_current = self.delay_initial;
        self.attempts = 0;
    }

    /// Attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Base delay of the next attempt, without jitter
    pub fn current_delay(&self) -> Duration {
        self.delay_current
    }
}
