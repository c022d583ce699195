use core::time::Duration;

/// Exponential backoff without jitter.
///
/// The delay before retry number `attempt` (0-based) is
/// `min(max, initial * multiplier^attempt)`, computed with saturating
/// arithmetic so large attempt numbers settle at `max` instead of
/// overflowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Backoff {
    /// A doubling backoff.
    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2,
        }
    }

    /// Returns the delay to wait after failed attempt `attempt`.
    ///
    /// # Example
    /// ```
    /// use core::time::Duration;
    /// use snippy::Backoff;
    ///
    /// let backoff = Backoff::exponential(Duration::from_millis(10), Duration::from_millis(100));
    /// assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(10));
    /// assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(80));
    /// assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(100));
    /// ```
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
