use core::{future::Future, pin::Pin, time::Duration};

/// A trait that abstracts over how to wait for a given [`Duration`] between
/// retry attempts.
///
/// Retry policies are generic over it so tests and latency-sensitive callers
/// can swap the timer for a plain scheduler yield.
pub trait SleepProvider {
    /// We require `Send` so that the future can be safely moved across threads
    type Sleep: Future<Output = ()> + Send;

    fn sleep_for(dur: Duration) -> Self::Sleep;
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the default provider; it honours paused time in tests.
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

/// An implementation of [`SleepProvider`] using Tokio's yield.
///
/// Backoff delays are skipped entirely; the task only yields to the
/// scheduler. Waiting does not make an independent random draw any less
/// likely to collide, so callers that only retry collisions may prefer this.
pub struct TokioYield;

impl SleepProvider for TokioYield {
    /// Tokio's `yield_now()` returns a private future type, so we must use a
    /// boxed `dyn Future` to abstract over it.
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep_for(_dur: Duration) -> Self::Sleep {
        Box::pin(tokio::task::yield_now())
    }
}
