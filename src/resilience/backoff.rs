//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Un-jittered delay for `attempt` (0-based): `base * factor^attempt`, capped at `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, factor: f64) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let delay = base.as_nanos() as f64 * factor.powi(exponent);
    let capped = delay.min(max.as_nanos() as f64);

    if capped.is_finite() && capped > 0.0 {
        Duration::from_nanos(capped.round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Randomized, capped exponential delay sequence for one retry loop.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    factor: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max,
            factor,
            attempt: 0,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.factor,
        )
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Next delay in the sequence.
    ///
    /// Adds jitter uniformly drawn from `[0, 10%)` of the capped delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_backoff(self.attempt, self.base, self.max, self.factor);
        let jitter = delay.mul_f64(rand::thread_rng().gen_range(0.0..0.1));
        self.attempt = self.attempt.saturating_add(1);

        delay + jitter
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Sleep for [`next_delay`](Self::next_delay).
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
