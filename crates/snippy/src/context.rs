use core::future::Future;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    CollisionOn, ConnectionPolicy, CounterMaintainer, Error, Event, Field, IdentityConfig,
    Observer, RandSource, Result, RetryPolicy, ShortIdGenerator, SleepProvider, SystemClock,
    ThreadRandom, TimeSource, TokioSleep, UniquenessProbe, UsernameGenerator,
};

/// How an [`Assignment`] was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Origin {
    /// The entity already had a value; nothing was generated or probed.
    Existing,
    /// A generated candidate was accepted after `attempts` probes.
    Generated { attempts: u32 },
    /// Every candidate collided; the value is an unprobed fallback.
    Fallback { attempts: u32 },
}

/// An identifier ready to be written to an entity before it is inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub value: String,
    pub origin: Origin,
}

impl Assignment {
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.origin, Origin::Fallback { .. })
    }

    #[must_use]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Long-lived collaborators shared by every request.
///
/// Built once at startup and passed to whatever needs it (usually behind an
/// [`Arc`]). Holds the identifier generators, the three retry policies, the
/// connection breaker, the counter maintainer and the observer they all
/// report to. Nothing in here is global, so tests build their own context
/// with scripted randomness and a fixed clock.
pub struct ServiceContext<R = ThreadRandom, T = SystemClock> {
    short_ids: ShortIdGenerator<R>,
    usernames: UsernameGenerator<R>,
    clock: T,
    short_id_policy: RetryPolicy<CollisionOn>,
    username_policy: RetryPolicy<CollisionOn>,
    connection: ConnectionPolicy,
    counters: CounterMaintainer,
    observer: Arc<dyn Observer>,
}

impl ServiceContext {
    /// Builds a production context: thread-local CSPRNG, wall clock and, with
    /// the `tracing` feature, a [`TracingObserver`](crate::TracingObserver).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `config` is unusable.
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        Self::with_components(config, ThreadRandom, SystemClock, default_observer())
    }
}

fn default_observer() -> Arc<dyn Observer> {
    #[cfg(feature = "tracing")]
    {
        Arc::new(crate::TracingObserver)
    }
    #[cfg(not(feature = "tracing"))]
    {
        Arc::new(crate::NoopObserver)
    }
}

impl<R, T> ServiceContext<R, T>
where
    R: RandSource + Clone,
    T: TimeSource<u64>,
{
    /// Builds a context from explicit parts.
    ///
    /// Both generators draw from clones of `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `config` is unusable.
    pub fn with_components(
        config: &IdentityConfig,
        rng: R,
        clock: T,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            short_ids: ShortIdGenerator::new(rng.clone()),
            usernames: UsernameGenerator::new(rng),
            clock,
            short_id_policy: RetryPolicy::new(
                "short-id",
                &config.short_id,
                CollisionOn(Field::ShortId),
                Arc::clone(&observer),
            ),
            username_policy: RetryPolicy::new(
                "username",
                &config.username,
                CollisionOn(Field::Username),
                Arc::clone(&observer),
            ),
            connection: ConnectionPolicy::new(
                &config.connection,
                &config.breaker,
                Arc::clone(&observer),
            ),
            counters: CounterMaintainer::new(Arc::clone(&observer)),
            observer,
        })
    }

    #[must_use]
    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    #[must_use]
    pub const fn counters(&self) -> &CounterMaintainer {
        &self.counters
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionPolicy {
        &self.connection
    }

    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.clock.current_millis()
    }

    /// Picks a short ID for a snippet about to be inserted, sleeping with
    /// [`TokioSleep`] between attempts.
    ///
    /// See [`assign_short_id_with`](Self::assign_short_id_with).
    ///
    /// # Errors
    ///
    /// Any non-collision error from `probe` that the connection policy gave
    /// up on.
    pub async fn assign_short_id<P: UniquenessProbe>(
        &self,
        probe: &P,
        current: Option<&str>,
    ) -> Result<Assignment> {
        self.assign_short_id_with::<TokioSleep, P>(probe, current)
            .await
    }

    /// Picks a short ID for a snippet about to be inserted.
    ///
    /// A non-empty `current` value is returned as is, without generating or
    /// probing. Otherwise candidates are drawn and probed under the short-ID
    /// retry policy. Once that policy is exhausted a fallback is returned
    /// instead of an error; it is not probed.
    ///
    /// The caller writes the value to the entity and inserts it on the same
    /// transaction `probe` reads from.
    ///
    /// # Errors
    ///
    /// Any non-collision error from `probe` that the connection policy gave
    /// up on.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn assign_short_id_with<S, P>(
        &self,
        probe: &P,
        current: Option<&str>,
    ) -> Result<Assignment>
    where
        S: SleepProvider,
        P: UniquenessProbe,
    {
        if let Some(existing) = current.filter(|value| !value.is_empty()) {
            return Ok(Assignment {
                value: existing.to_owned(),
                origin: Origin::Existing,
            });
        }

        let outcome = self
            .short_id_policy
            .execute::<S, _, _, _>(move |attempt| async move {
                let candidate = self.short_ids.candidate();
                match self.exists::<S, P>(probe, &candidate).await {
                    Ok(false) => Ok((candidate, attempt + 1)),
                    Ok(true) => Err(Error::collision(Field::ShortId, candidate)),
                    Err(err) => Err(err),
                }
            })
            .await;

        self.settle(Field::ShortId, self.short_id_policy.name(), outcome, || {
            self.short_ids.fallback(self.clock.current_millis())
        })
    }

    /// Picks a username for a user about to be inserted, sleeping with
    /// [`TokioSleep`] between attempts.
    ///
    /// # Errors
    ///
    /// Any non-collision error from `probe` that the connection policy gave
    /// up on.
    pub async fn assign_username<P: UniquenessProbe>(
        &self,
        probe: &P,
        display_name: Option<&str>,
    ) -> Result<Assignment> {
        self.assign_username_with::<TokioSleep, P>(probe, display_name)
            .await
    }

    /// Picks a username derived from `display_name`.
    ///
    /// The base is computed once; each attempt draws a new numeric suffix.
    /// Exhausting the username policy yields `base-<millis>`, unprobed.
    ///
    /// # Errors
    ///
    /// Any non-collision error from `probe` that the connection policy gave
    /// up on.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn assign_username_with<S, P>(
        &self,
        probe: &P,
        display_name: Option<&str>,
    ) -> Result<Assignment>
    where
        S: SleepProvider,
        P: UniquenessProbe,
    {
        let base = self.usernames.base(display_name);
        let base = base.as_str();

        let outcome = self
            .username_policy
            .execute::<S, _, _, _>(move |attempt| async move {
                let candidate = self.usernames.candidate(base);
                match self.exists::<S, P>(probe, &candidate).await {
                    Ok(false) => Ok((candidate, attempt + 1)),
                    Ok(true) => Err(Error::collision(Field::Username, candidate)),
                    Err(err) => Err(err),
                }
            })
            .await;

        self.settle(Field::Username, self.username_policy.name(), outcome, || {
            self.usernames.fallback(base, self.clock.current_millis())
        })
    }

    /// Runs `op` under the connection policy and its circuit breaker.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPolicy::execute`].
    pub async fn guarded<U, F, Fut>(&self, op: F) -> Result<U>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<U>>,
    {
        self.connection.execute::<TokioSleep, _, _, _>(op).await
    }

    /// One uniqueness check, retried under the connection policy when the
    /// store drops out.
    async fn exists<S, P>(&self, probe: &P, candidate: &str) -> Result<bool>
    where
        S: SleepProvider,
        P: UniquenessProbe,
    {
        self.connection
            .execute::<S, _, _, _>(|| probe.exists(candidate))
            .await
    }

    fn settle(
        &self,
        field: Field,
        policy: &'static str,
        outcome: Result<(String, u32)>,
        fallback: impl FnOnce() -> String,
    ) -> Result<Assignment> {
        match outcome {
            Ok((value, attempts)) => Ok(Assignment {
                value,
                origin: Origin::Generated { attempts },
            }),
            Err(Error::Exhausted {
                policy: exhausted,
                attempts,
                ..
            }) if exhausted == policy => {
                let value = fallback();
                self.observer.on_event(&Event::FallbackIssued {
                    field,
                    value: &value,
                });
                Ok(Assignment {
                    value,
                    origin: Origin::Fallback { attempts },
                })
            }
            Err(err) => Err(err),
        }
    }
}
