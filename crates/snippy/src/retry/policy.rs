use core::future::Future;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Backoff, Classifier, Error, Event, Observer, Result, RetryConfig, SleepProvider};

/// Retries a fallible async operation on classified errors, with
/// exponential backoff, up to a fixed number of attempts.
///
/// A policy is immutable once built and holds no per-call state, so one
/// instance is shared by every concurrent caller.
///
/// ## Behaviour
/// - `Ok` is returned as soon as an attempt succeeds.
/// - An error the [`Classifier`] rejects is returned untouched, without
///   retrying.
/// - A retryable error schedules another attempt after
///   [`Backoff::delay_for_attempt`] and emits [`Event::RetryScheduled`].
/// - When the last attempt fails with a retryable error the policy emits
///   [`Event::RetriesExhausted`] and returns [`Error::Exhausted`] wrapping
///   that error.
pub struct RetryPolicy<C> {
    name: &'static str,
    max_attempts: u32,
    backoff: Backoff,
    classifier: C,
    observer: Arc<dyn Observer>,
}

impl<C: Classifier> RetryPolicy<C> {
    /// Creates a new [`RetryPolicy`].
    ///
    /// # Parameters
    /// - `name`: label carried by events and by [`Error::Exhausted`]
    /// - `config`: attempts and backoff shape; zero attempts is treated as
    ///   one
    /// - `classifier`: which errors are retried
    /// - `observer`: where retry and exhaustion events go
    pub fn new(
        name: &'static str,
        config: &RetryConfig,
        classifier: C,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            name,
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
            classifier,
            observer,
        }
    }

    /// The label given at construction.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the 0-based attempt number.
    ///
    /// # Errors
    ///
    /// - The first non-retryable error returned by `op`.
    /// - [`Error::Exhausted`] if every attempt failed with a retryable error.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(policy = self.name)))]
    pub async fn execute<S, T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        S: SleepProvider,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !self.classifier.is_retryable(&err) {
                return Err(err);
            }

            let attempts = attempt + 1;
            if attempts >= self.max_attempts {
                self.observer.on_event(&Event::RetriesExhausted {
                    policy: self.name,
                    attempts,
                });
                return Err(Error::Exhausted {
                    policy: self.name,
                    attempts,
                    source: Box::new(err),
                });
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            self.observer.on_event(&Event::RetryScheduled {
                policy: self.name,
                attempt: attempts,
                delay,
                kind: err.kind(),
            });
            S::sleep_for(delay).await;
            attempt = attempts;
        }
    }
}
