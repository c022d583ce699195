//! Persistence port.
//!
//! A [`Store`] hands out [`Transaction`]s. Everything a domain operation
//! reads or writes, including identifier probes and counter updates, goes
//! through one transaction so that a failure anywhere rolls all of it back.
//!
//! Adapters translate their native failures into [`Error`](crate::Error)
//! variants: unique-constraint violations become
//! [`Error::Collision`](crate::Error::Collision), refused or dropped
//! connections become [`Error::Connectivity`](crate::Error::Connectivity).

mod memory;
mod model;
mod probe;

pub use memory::*;
pub use model::*;
pub use probe::*;

use core::future::Future;

use crate::Result;

/// Source of transactions.
pub trait Store: Send + Sync {
    type Tx: Transaction;

    /// Opens a transaction.
    ///
    /// Callers should go through the connection policy; this method does not
    /// retry.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;
}

/// One unit of work against the store.
///
/// Writes are visible to later reads on the same transaction and to nobody
/// else until [`commit`](Transaction::commit). Dropping a transaction without
/// committing discards its writes.
pub trait Transaction: Send + Sync {
    fn user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    fn user_by_username(&self, username: &str)
    -> impl Future<Output = Result<Option<User>>> + Send;

    /// # Errors
    ///
    /// [`Error::Collision`](crate::Error::Collision) on
    /// [`Field::Username`](crate::Field::Username) if the username is taken.
    fn insert_user(&self, user: NewUser) -> impl Future<Output = Result<User>> + Send;

    fn snippet(&self, id: SnippetId) -> impl Future<Output = Result<Option<Snippet>>> + Send;

    fn snippet_by_short_id(
        &self,
        short_id: &str,
    ) -> impl Future<Output = Result<Option<Snippet>>> + Send;

    /// Inserts a snippet with all counters at zero.
    ///
    /// # Errors
    ///
    /// [`Error::Collision`](crate::Error::Collision) on
    /// [`Field::ShortId`](crate::Field::ShortId) if the short ID is taken.
    fn insert_snippet(&self, snippet: NewSnippet) -> impl Future<Output = Result<Snippet>> + Send;

    /// Deletes a snippet together with its favorites and comments. Forks of
    /// it survive with `forked_from` cleared. Counters on other snippets are
    /// left alone.
    fn delete_snippet(&self, id: SnippetId) -> impl Future<Output = Result<()>> + Send;

    fn favorite(
        &self,
        user: UserId,
        snippet: SnippetId,
    ) -> impl Future<Output = Result<Option<Favorite>>> + Send;

    fn insert_favorite(
        &self,
        user: UserId,
        snippet: SnippetId,
    ) -> impl Future<Output = Result<Favorite>> + Send;

    fn delete_favorite(&self, id: FavoriteId) -> impl Future<Output = Result<()>> + Send;

    fn comment(&self, id: CommentId) -> impl Future<Output = Result<Option<Comment>>> + Send;

    fn insert_comment(&self, comment: NewComment) -> impl Future<Output = Result<Comment>> + Send;

    fn delete_comment(&self, id: CommentId) -> impl Future<Output = Result<()>> + Send;

    /// Moves `counter` on `snippet` by one, relative to its current value.
    /// Decrements floor at zero.
    fn adjust_counter(
        &self,
        snippet: SnippetId,
        counter: Counter,
        delta: CounterDelta,
    ) -> impl Future<Output = Result<CounterUpdate>> + Send;

    /// Makes every write durable. The report carries each counter update as
    /// applied to the committed value, which may differ from what
    /// [`adjust_counter`](Self::adjust_counter) returned when other
    /// transactions committed in between.
    fn commit(self) -> impl Future<Output = Result<CommitReport>> + Send;

    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
