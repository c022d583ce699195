use core::future::Future;

use crate::{Result, Transaction};

/// Answers whether an identifier candidate is already taken.
///
/// Probes run on the caller's transaction so the answer reflects rows the
/// transaction itself has written. A `false` answer is only advisory: the
/// store's uniqueness constraint has the final word at commit.
pub trait UniquenessProbe: Send + Sync {
    fn exists(&self, candidate: &str) -> impl Future<Output = Result<bool>> + Send;
}

impl<P: UniquenessProbe + ?Sized> UniquenessProbe for &P {
    fn exists(&self, candidate: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).exists(candidate)
    }
}

/// Probes snippet short IDs through a transaction.
pub struct ShortIds<'a, X>(pub &'a X);

impl<X: Transaction> UniquenessProbe for ShortIds<'_, X> {
    async fn exists(&self, candidate: &str) -> Result<bool> {
        Ok(self.0.snippet_by_short_id(candidate).await?.is_some())
    }
}

/// Probes usernames through a transaction.
pub struct Usernames<'a, X>(pub &'a X);

impl<X: Transaction> UniquenessProbe for Usernames<'_, X> {
    async fn exists(&self, candidate: &str) -> Result<bool> {
        Ok(self.0.user_by_username(candidate).await?.is_some())
    }
}
