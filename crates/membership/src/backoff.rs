//! Bounded exponential backoff between reconnection attempts.
//!
//! # Schedule
//!
//! Starting from `initial_ms`, each unsuccessful cycle multiplies the delay by
//! `growth` and truncates to whole milliseconds, clamped to `max_ms`. With the
//! default policy (50 ms, x1.5, 15 s) the delays run:
//!
//! ```text
//! 50, 75, 112, 168, 252, 378, 567, 850, 1275, 1912,
//! 2868, 4302, 6453, 9679, 14518, 15000, 15000, ...
//! ```
//!
//! There is no "give up" step: the cap is held until the caller stops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 15_000;
pub const DEFAULT_BACKOFF_GROWTH: f64 = 1.5;

/// Parameters of the backoff schedule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first attempt.
    pub initial_ms: u64,
    /// Upper bound on any delay.
    pub max_ms: u64,
    /// Multiplicative growth per cycle; must be > 1.
    pub growth: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_ms: DEFAULT_MAX_BACKOFF_MS,
            growth: DEFAULT_BACKOFF_GROWTH,
        }
    }
}

impl BackoffPolicy {
    /// Reject policies whose schedule would not grow or would start above the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_ms == 0 {
            return Err(ConfigError::InvalidBackoff("initial_ms must be positive".into()));
        }
        if self.initial_ms > self.max_ms {
            return Err(ConfigError::InvalidBackoff(format!(
                "initial_ms {} exceeds max_ms {}",
                self.initial_ms, self.max_ms
            )));
        }
        if !self.growth.is_finite() || self.growth <= 1.0 {
            return Err(ConfigError::InvalidBackoff(format!(
                "growth {} must be a finite factor above 1",
                self.growth
            )));
        }
        // Truncation to whole milliseconds must still make progress.
        if grow(self.initial_ms, self.growth) <= self.initial_ms {
            return Err(ConfigError::InvalidBackoff(format!(
                "growth {} does not increase {} ms",
                self.growth, self.initial_ms
            )));
        }
        Ok(())
    }
}

#[inline]
fn grow(current_ms: u64, growth: f64) -> u64 {
    (current_ms as f64 * growth) as u64
}

/// Backoff state for one retry loop.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current_ms: u64,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current_ms: policy.initial_ms,
        }
    }

    /// Delay to wait in the current cycle.
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Move to the next cycle's delay.
    ///
    /// # Panics
    /// If growth fails to increase the delay before clamping. That means the
    /// policy bypassed `validate` or float precision broke down; either way
    /// the loop would spin at a fixed delay forever.
    pub fn advance(&mut self) -> Duration {
        let grown = grow(self.current_ms, self.policy.growth);
        assert!(
            grown > self.current_ms,
            "backoff growth stalled at {} ms (factor {})",
            self.current_ms,
            self.policy.growth
        );
        self.current_ms = grown.min(self.policy.max_ms);
        self.current()
    }

    /// Infinite iterator over the delays of successive cycles.
    pub fn schedule(policy: BackoffPolicy) -> impl Iterator<Item = Duration> {
        let mut backoff = Backoff::new(policy);
        let mut first = true;
        std::iter::from_fn(move || {
            if first {
                first = false;
                Some(backoff.current())
            } else {
                Some(backoff.advance())
            }
        })
    }
}
