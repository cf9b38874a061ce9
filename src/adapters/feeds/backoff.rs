//! Reconnect backoff policy.
//!
//! `delay(n) = min(initial × multiplierⁿ × (1 + u·jitter), max)` with
//! `u ∈ [0, 1)`. Keeping `jitter < multiplier − 1` makes every jittered
//! delay smaller than the next attempt's un-jittered base, so delays
//! strictly increase until they reach the cap and then stay there.

use std::time::Duration;

use rand::Rng;

use crate::config::FeedConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.backoff_initial_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.backoff_jitter,
        }
    }

    /// Delay for the zero-based `attempt`, with `unit ∈ [0, 1)` as the
    /// jitter draw.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let exponent = i32::try_from(attempt.min(64)).unwrap_or(64);
        let base_ms = self.initial.as_secs_f64() * 1000.0 * self.multiplier.powi(exponent);
        let jittered_ms = base_ms * (1.0 + unit.clamp(0.0, 1.0) * self.jitter);
        let max_ms = self.max.as_secs_f64() * 1000.0;
        Duration::from_secs_f64(jittered_ms.min(max_ms) / 1000.0)
    }

    /// Jittered delay for the zero-based `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let unit: f64 = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with(attempt, unit)
    }
}
