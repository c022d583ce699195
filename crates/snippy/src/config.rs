//! Policy configuration.
//!
//! Every knob has a default matching production tuning:
//!
//! | policy       | attempts | initial delay | max delay |
//! |--------------|----------|---------------|-----------|
//! | short ID     | 5        | 10 ms         | 100 ms    |
//! | username     | 10       | 5 ms          | 50 ms     |
//! | connection   | 3        | 50 ms         | 500 ms    |
//!
//! The connection breaker opens after 5 consecutive connectivity failures
//! and lets a trial call through after 10 s.

use crate::{Backoff, Error, Result};
use core::time::Duration;

/// Shape of one retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl RetryConfig {
    /// Tuning for snippet short IDs.
    pub const SHORT_ID: Self = Self::exponential(5, 10, 100);
    /// Tuning for usernames. More attempts than short IDs because a username
    /// fallback is visible to the user.
    pub const USERNAME: Self = Self::exponential(10, 5, 50);
    /// Tuning for store connectivity errors.
    pub const CONNECTION: Self = Self::exponential(3, 50, 500);

    /// A doubling backoff between `initial_delay_ms` and `max_delay_ms`.
    #[must_use]
    pub const fn exponential(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2,
        }
    }

    /// The backoff this configuration describes.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_delay_ms),
            max: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if there are no attempts, the multiplier
    /// is zero, or the initial delay exceeds the maximum.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation(format!(
                "{name}: max_attempts must be at least 1"
            )));
        }
        if self.multiplier == 0 {
            return Err(Error::validation(format!(
                "{name}: multiplier must be at least 1"
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(Error::validation(format!(
                "{name}: initial delay ({} ms) exceeds max delay ({} ms)",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Shape of the connection circuit breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerConfig {
    /// Consecutive connectivity failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a trial call.
    pub recovery_ms: u64,
}

impl BreakerConfig {
    #[must_use]
    pub const fn recovery(&self) -> Duration {
        Duration::from_millis(self.recovery_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_ms: 10_000,
        }
    }
}

/// Everything a [`ServiceContext`](crate::ServiceContext) needs to build its
/// policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentityConfig {
    pub short_id: RetryConfig,
    pub username: RetryConfig,
    pub connection: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            short_id: RetryConfig::SHORT_ID,
            username: RetryConfig::USERNAME,
            connection: RetryConfig::CONNECTION,
            breaker: BreakerConfig::default(),
        }
    }
}

impl IdentityConfig {
    /// Checks every policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first bad policy.
    pub fn validate(&self) -> Result<()> {
        self.short_id.validate("short-id")?;
        self.username.validate("username")?;
        self.connection.validate("connection")?;
        if self.breaker.failure_threshold == 0 {
            return Err(Error::validation(
                "breaker: failure_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}
