use core::{future::Future, time::Duration};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

use crate::{BreakerConfig, Error, ErrorKind, Event, Observer, Result};

/// Externally visible state of a [`CircuitBreaker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Calls flow; consecutive connectivity failures are being counted.
    Closed,
    /// Calls are rejected with [`Error::CircuitOpen`] until the recovery
    /// delay elapses.
    Open,
    /// One trial call is allowed through; its outcome closes or reopens the
    /// breaker.
    HalfOpen,
}

#[derive(Clone, Copy, Debug)]
enum State {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// Consecutive-failure circuit breaker for store connectivity.
///
/// Only [`Error::Connectivity`] counts as a failure. Any other outcome,
/// including domain errors, proves the store answered and resets the count.
///
/// Time is read from [`tokio::time::Instant`], so paused-clock tests can step
/// through the recovery window.
pub struct CircuitBreaker {
    threshold: u32,
    recovery: Duration,
    state: Mutex<State>,
    observer: Arc<dyn Observer>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            recovery: config.recovery(),
            state: Mutex::new(State::Closed { failures: 0 }),
            observer,
        }
    }

    /// Returns the current status. An open breaker whose recovery delay has
    /// elapsed reports [`BreakerStatus::HalfOpen`].
    pub fn status(&self) -> BreakerStatus {
        match *self.state.lock() {
            State::Closed { .. } => BreakerStatus::Closed,
            State::Open { until } if Instant::now() < until => BreakerStatus::Open,
            State::Open { .. } | State::HalfOpen { .. } => BreakerStatus::HalfOpen,
        }
    }

    /// Runs `call` if the breaker allows it and records the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::CircuitOpen`] without polling `call` when the breaker is
    ///   open, or half-open with a trial already in flight.
    /// - Whatever `call` returns otherwise.
    pub async fn call<T, Fut>(&self, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.acquire()?;
        let mut pending = PendingCall {
            breaker: self,
            settled: false,
        };
        let outcome = call.await;
        pending.settled = true;
        match &outcome {
            Err(err) if err.kind() == ErrorKind::Connectivity => self.on_failure(),
            _ => self.on_success(),
        }
        outcome
    }

    fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { until } => {
                if Instant::now() < until {
                    return Err(Error::CircuitOpen);
                }
                *state = State::HalfOpen {
                    trial_in_flight: true,
                };
                drop(state);
                self.observer.on_event(&Event::BreakerHalfOpened);
                Ok(())
            }
            State::HalfOpen { trial_in_flight } => {
                if trial_in_flight {
                    return Err(Error::CircuitOpen);
                }
                *state = State::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        let was_closed = matches!(*state, State::Closed { .. });
        *state = State::Closed { failures: 0 };
        drop(state);
        if !was_closed {
            self.observer.on_event(&Event::BreakerClosed);
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        let failures = match *state {
            State::Closed { failures } => failures.saturating_add(1),
            // A failed trial reopens immediately.
            State::HalfOpen { .. } => self.threshold,
            State::Open { .. } => return,
        };
        if failures < self.threshold {
            *state = State::Closed { failures };
            return;
        }
        *state = State::Open {
            until: Instant::now() + self.recovery,
        };
        drop(state);
        self.observer.on_event(&Event::BreakerOpened {
            consecutive_failures: failures,
        });
    }
}

/// Frees the half-open trial slot if the call future is dropped before it
/// settles.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.breaker.state.lock();
        if let State::HalfOpen { .. } = *state {
            *state = State::HalfOpen {
                trial_in_flight: false,
            };
        }
    }
}
