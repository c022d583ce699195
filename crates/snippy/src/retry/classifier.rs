use crate::{Error, ErrorKind, Field};

/// Decides whether a failed attempt is worth retrying.
///
/// Anything a classifier rejects is propagated by the policy immediately.
pub trait Classifier: Send + Sync {
    fn is_retryable(&self, err: &Error) -> bool;
}

/// Retries uniqueness collisions on one field only.
///
/// A collision on any other field, or any other error, is not retried: a
/// short-ID policy must never spin on a username clash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionOn(pub Field);

impl Classifier for CollisionOn {
    fn is_retryable(&self, err: &Error) -> bool {
        err.kind() == ErrorKind::Collision(self.0)
    }
}

/// Retries connectivity failures only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectivityErrors;

impl Classifier for ConnectivityErrors {
    fn is_retryable(&self, err: &Error) -> bool {
        err.kind() == ErrorKind::Connectivity
    }
}

/// Adapts a predicate closure into a [`Classifier`].
#[derive(Clone, Copy, Debug)]
pub struct FnClassifier<F>(pub F);

impl<F> Classifier for FnClassifier<F>
where
    F: Fn(&Error) -> bool + Send + Sync,
{
    fn is_retryable(&self, err: &Error) -> bool {
        (self.0)(err)
    }
}
