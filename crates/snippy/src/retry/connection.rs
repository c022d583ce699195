use core::future::Future;
use std::sync::Arc;

use crate::{
    BreakerConfig, BreakerStatus, CircuitBreaker, ConnectivityErrors, Observer, Result,
    RetryConfig, RetryPolicy, SleepProvider,
};

/// Retry policy for store connectivity, wrapped around a circuit breaker.
///
/// Every attempt passes through the breaker. Once the breaker opens, the
/// attempt fails with [`Error::CircuitOpen`](crate::Error::CircuitOpen),
/// which the connectivity classifier does not retry, so callers get the
/// failure immediately instead of queueing behind a dead store.
///
/// This policy owns its own breaker and shares no state with the collision
/// policies.
pub struct ConnectionPolicy {
    retry: RetryPolicy<ConnectivityErrors>,
    breaker: CircuitBreaker,
}

impl ConnectionPolicy {
    pub fn new(retry: &RetryConfig, breaker: &BreakerConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            retry: RetryPolicy::new(
                "connection",
                retry,
                ConnectivityErrors,
                Arc::clone(&observer),
            ),
            breaker: CircuitBreaker::new(breaker, observer),
        }
    }

    #[must_use]
    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    /// Runs `op` under the breaker, retrying connectivity failures.
    ///
    /// # Errors
    ///
    /// - [`Error::CircuitOpen`](crate::Error::CircuitOpen) when the breaker
    ///   rejects an attempt.
    /// - [`Error::Exhausted`](crate::Error::Exhausted) when every attempt
    ///   failed to connect.
    /// - Any other error from `op`, unchanged.
    pub async fn execute<S, T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        S: SleepProvider,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute::<S, _, _, _>(|_| self.breaker.call(op()))
            .await
    }
}
