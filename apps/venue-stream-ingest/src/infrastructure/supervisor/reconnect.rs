//! Reconnection Policy
//!
//! Exponential backoff between failed dial (or poll) attempts. The delay
//! before attempt `n + 1` is `min(initial * multiplier^n, max)`, optionally
//! randomized by a jitter fraction, and drops back to `initial` on reset.
//!
//! Supervisors retry indefinitely; only cancellation ends the loop.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

/// Backoff state for one supervisor.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use venue_stream_ingest::infrastructure::supervisor::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert_eq!(policy.next_delay(), Duration::from_secs(2));
/// assert_eq!(policy.next_delay(), Duration::from_secs(4));
///
/// // Streaming again
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    failures: u32,
}

impl ReconnectPolicy {
    /// Create a policy starting at the initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            failures: 0,
        }
    }

    /// Delay to wait after one more consecutive failure.
    ///
    /// Advances the internal delay for the next call.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.apply_jitter(self.current_delay.min(self.config.max_delay));
        self.current_delay = self.grow(self.current_delay);
        delay
    }

    /// Reset after a successful connection or poll.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.failures = 0;
    }

    /// Number of consecutive failures since the last reset.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    fn grow(&self, delay: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * self.config.multiplier).round();
        let max_millis = self.config.max_delay.as_millis();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };
        Duration::from_millis(u64::try_from(next_millis).unwrap_or(u64::MAX))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = delay.as_millis() as f64;
        let spread = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-spread..=spread);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted = (base_millis + jitter).max(1.0) as u64;
        Duration::from_millis(adjusted)
    }
}
