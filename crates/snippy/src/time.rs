use std::time::{SystemTime, UNIX_EPOCH};

/// A trait for time sources that return a wall-clock timestamp.
///
/// The unit is **milliseconds** since the Unix epoch. Fallback identifiers
/// and entity creation times are derived from it, so tests plug in a fixed
/// clock to make them predictable.
///
/// # Example
///
/// ```
/// use snippy::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource<u64> for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource<T> {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> T;
}

/// Wall-clock time source backed by [`SystemTime`].
///
/// A clock set before 1970 reads as `0` rather than failing; the value is
/// only ever used as entropy and as a creation timestamp.
#[derive(Default, Clone, Copy, Debug)]
pub struct SystemClock;

impl TimeSource<u64> for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

impl<C: TimeSource<u64> + ?Sized> TimeSource<u64> for &C {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2025() {
        // Wednesday, January 1, 2025 00:00:00 UTC
        assert!(SystemClock.current_millis() > 1_735_689_600_000);
    }
}
