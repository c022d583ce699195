//! Observability port.
//!
//! The retry engine, the circuit breaker, the identifier assigners and the
//! counter maintainer report what they do through an injected [`Observer`]
//! instead of a global logger. Observers are fire-and-forget: `on_event`
//! returns nothing and must not block, so a broken sink can never fail the
//! operation being observed.

use crate::{Counter, ErrorKind, Field, SnippetId};
use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something worth counting or logging happened.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event<'a> {
    /// An attempt failed with a retryable error; the next one starts after
    /// `delay`.
    RetryScheduled {
        policy: &'static str,
        attempt: u32,
        delay: Duration,
        kind: ErrorKind,
    },
    /// A policy ran out of attempts.
    RetriesExhausted { policy: &'static str, attempts: u32 },
    /// An identifier was assigned from the emergency fallback.
    FallbackIssued { field: Field, value: &'a str },
    /// The connection breaker opened.
    BreakerOpened { consecutive_failures: u32 },
    /// The connection breaker let a trial call through.
    BreakerHalfOpened,
    /// The connection breaker closed again.
    BreakerClosed,
    /// A decrement hit a counter that was already zero.
    CounterClamped { snippet: SnippetId, counter: Counter },
}

/// Sink for [`Event`]s.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event<'_>);
}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn on_event(&self, event: &Event<'_>) {
        (**self).on_event(event);
    }
}

impl<A: Observer, B: Observer> Observer for (A, B) {
    fn on_event(&self, event: &Event<'_>) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

/// Discards every event.
#[derive(Default, Clone, Copy, Debug)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event<'_>) {}
}

/// Point-in-time totals kept by a [`CountingObserver`].
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventCounts {
    pub retries: u64,
    pub exhaustions: u64,
    pub fallbacks: u64,
    pub breaker_opened: u64,
    pub breaker_half_opened: u64,
    pub breaker_closed: u64,
    pub counter_clamps: u64,
}

/// Lock-free event counters, used to watch collision rates.
#[derive(Default, Debug)]
pub struct CountingObserver {
    retries: AtomicU64,
    exhaustions: AtomicU64,
    fallbacks: AtomicU64,
    breaker_opened: AtomicU64,
    breaker_half_opened: AtomicU64,
    breaker_closed: AtomicU64,
    counter_clamps: AtomicU64,
}

impl CountingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current totals.
    #[must_use]
    pub fn snapshot(&self) -> EventCounts {
        EventCounts {
            retries: self.retries.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            breaker_opened: self.breaker_opened.load(Ordering::Relaxed),
            breaker_half_opened: self.breaker_half_opened.load(Ordering::Relaxed),
            breaker_closed: self.breaker_closed.load(Ordering::Relaxed),
            counter_clamps: self.counter_clamps.load(Ordering::Relaxed),
        }
    }
}

impl Observer for CountingObserver {
    fn on_event(&self, event: &Event<'_>) {
        let counter = match event {
            Event::RetryScheduled { .. } => &self.retries,
            Event::RetriesExhausted { .. } => &self.exhaustions,
            Event::FallbackIssued { .. } => &self.fallbacks,
            Event::BreakerOpened { .. } => &self.breaker_opened,
            Event::BreakerHalfOpened => &self.breaker_half_opened,
            Event::BreakerClosed => &self.breaker_closed,
            Event::CounterClamped { .. } => &self.counter_clamps,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Logs every event through `tracing`.
///
/// Retries are `debug`, anything that means the system is degraded is
/// `warn`.
#[cfg_attr(docsrs, doc(cfg(feature = "tracing")))]
#[cfg(feature = "tracing")]
#[derive(Default, Clone, Copy, Debug)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::RetryScheduled {
                policy,
                attempt,
                delay,
                kind,
            } => tracing::debug!(policy, attempt, ?delay, ?kind, "retry scheduled"),
            Event::RetriesExhausted { policy, attempts } => {
                tracing::warn!(policy, attempts, "retries exhausted");
            }
            Event::FallbackIssued { field, value } => {
                tracing::warn!(%field, value, "issued fallback identifier");
            }
            Event::BreakerOpened {
                consecutive_failures,
            } => tracing::warn!(consecutive_failures, "connection breaker opened"),
            Event::BreakerHalfOpened => tracing::info!("connection breaker half-open"),
            Event::BreakerClosed => tracing::info!("connection breaker closed"),
            Event::CounterClamped { snippet, counter } => {
                tracing::warn!(%snippet, ?counter, "decrement clamped at zero");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_observer_tallies_each_kind() {
        let observer = CountingObserver::new();
        observer.on_event(&Event::RetryScheduled {
            policy: "short-id",
            attempt: 1,
            delay: Duration::from_millis(10),
            kind: ErrorKind::Collision(Field::ShortId),
        });
        observer.on_event(&Event::RetryScheduled {
            policy: "short-id",
            attempt: 2,
            delay: Duration::from_millis(20),
            kind: ErrorKind::Collision(Field::ShortId),
        });
        observer.on_event(&Event::FallbackIssued {
            field: Field::ShortId,
            value: "e-abcdefgh3f",
        });

        let counts = observer.snapshot();
        assert_eq!(counts.retries, 2);
        assert_eq!(counts.fallbacks, 1);
        assert_eq!(counts.exhaustions, 0);
    }

    #[test]
    fn pair_forwards_to_both() {
        let left = Arc::new(CountingObserver::new());
        let right = Arc::new(CountingObserver::new());
        let pair = (Arc::clone(&left), Arc::clone(&right));
        pair.on_event(&Event::BreakerClosed);
        assert_eq!(left.snapshot().breaker_closed, 1);
        assert_eq!(right.snapshot().breaker_closed, 1);
    }
}
