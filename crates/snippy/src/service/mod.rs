use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Comment, CommentId, CommitReport, Counter, Error, FavoriteToggle, NewComment, NewSnippet, NewUser,
    RandSource, Result, ServiceContext, ShortIds, Snippet, SnippetDraft, SnippetId, Store,
    SystemClock, ThreadRandom, TimeSource, Transaction, User, UserId, Usernames,
};

#[cfg(test)]
mod tests;

/// Domain operations that create identifiers or move counters.
///
/// Every operation runs in exactly one transaction, opened through the
/// connection policy. Lookups inside it go through the same policy; writes
/// and the commit do not, since replaying them is not safe. The transaction
/// commits if the operation succeeds and rolls back otherwise, so a child
/// row never outlives a failed counter update and vice versa.
pub struct SnippetService<S, R = ThreadRandom, T = SystemClock> {
    store: S,
    context: Arc<ServiceContext<R, T>>,
}

impl<S, R, T> SnippetService<S, R, T>
where
    S: Store,
    R: RandSource + Clone,
    T: TimeSource<u64>,
{
    pub const fn new(store: S, context: Arc<ServiceContext<R, T>>) -> Self {
        Self { store, context }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<ServiceContext<R, T>> {
        &self.context
    }

    /// Creates a user with a freshly assigned username.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `auth_subject` is blank.
    /// - [`Error::Collision`] if a fallback username turned out to be taken
    ///   at commit.
    /// - Connectivity errors the connection policy gave up on.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub async fn register_user(
        &self,
        display_name: Option<&str>,
        auth_subject: &str,
    ) -> Result<User> {
        if auth_subject.trim().is_empty() {
            return Err(Error::validation("auth subject must not be blank"));
        }
        let tx = self.begin().await?;
        let outcome = self.register_user_in(&tx, display_name, auth_subject).await;
        self.finish(tx, outcome).await
    }

    /// Creates a snippet owned by `owner`. A short ID is generated unless the
    /// draft already carries one.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `owner` does not exist.
    /// - [`Error::Collision`] if the short ID is taken at commit.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, draft)))]
    pub async fn create_snippet(&self, owner: UserId, draft: SnippetDraft) -> Result<Snippet> {
        let tx = self.begin().await?;
        let outcome = self.create_snippet_in(&tx, owner, draft).await;
        self.finish(tx, outcome).await
    }

    /// Copies a snippet into a new one owned by `user` and bumps the source's
    /// fork count.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the user or the source snippet does not exist.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn fork_snippet(&self, user: UserId, source_short_id: &str) -> Result<Snippet> {
        let tx = self.begin().await?;
        let outcome = self.fork_snippet_in(&tx, user, source_short_id).await;
        self.finish(tx, outcome).await
    }

    /// Favorites the snippet, or un-favorites it if `user` already had.
    ///
    /// The returned count is the committed one, so it includes favorites
    /// that other requests committed while this one ran.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the user or the snippet does not exist.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn toggle_favorite(&self, user: UserId, short_id: &str) -> Result<FavoriteToggle> {
        let tx = self.begin().await?;
        let outcome = self.toggle_favorite_in(&tx, user, short_id).await;
        let ((snippet, toggle), report) = self.finish_reporting(tx, outcome).await?;
        Ok(FavoriteToggle {
            favorite_count: report
                .committed_value(snippet, Counter::Favorites)
                .unwrap_or(toggle.favorite_count),
            ..toggle
        })
    }

    /// Adds a comment to a snippet.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `body` is blank.
    /// - [`Error::NotFound`] if the author or the snippet does not exist.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, body)))]
    pub async fn add_comment(&self, author: UserId, short_id: &str, body: &str) -> Result<Comment> {
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::validation("comment body must not be blank"));
        }
        let tx = self.begin().await?;
        let outcome = self.add_comment_in(&tx, author, short_id, body).await;
        self.finish(tx, outcome).await
    }

    /// Deletes a comment. Only its author may do so.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the comment does not exist.
    /// - [`Error::Forbidden`] if `author` did not write it.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn delete_comment(&self, author: UserId, comment: CommentId) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = self.delete_comment_in(&tx, author, comment).await;
        self.finish(tx, outcome).await
    }

    /// Deletes a snippet with its favorites and comments. Only its owner may
    /// do so.
    ///
    /// Forks of the snippet are kept and detached. If the snippet was itself
    /// a fork, its parent's fork count goes down.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the snippet does not exist.
    /// - [`Error::Forbidden`] if `user` does not own it.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn delete_snippet(&self, user: UserId, short_id: &str) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = self.delete_snippet_in(&tx, user, short_id).await;
        self.finish(tx, outcome).await
    }

    /// Reads a snippet by short ID.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if there is no such snippet.
    pub async fn snippet(&self, short_id: &str) -> Result<Snippet> {
        let tx = self.begin().await?;
        let outcome = self.snippet_by_short_id(&tx, short_id).await;
        self.finish(tx, outcome).await
    }

    async fn begin(&self) -> Result<S::Tx> {
        self.context.guarded(|| self.store.begin()).await
    }

    async fn register_user_in(
        &self,
        tx: &S::Tx,
        display_name: Option<&str>,
        auth_subject: &str,
    ) -> Result<User> {
        let username = self
            .context
            .assign_username(&Usernames(tx), display_name)
            .await?
            .into_value();
        tx.insert_user(NewUser {
            username,
            display_name: display_name.map(str::to_owned),
            auth_subject: auth_subject.to_owned(),
        })
        .await
    }

    async fn create_snippet_in(
        &self,
        tx: &S::Tx,
        owner: UserId,
        draft: SnippetDraft,
    ) -> Result<Snippet> {
        self.require_user(tx, owner).await?;
        let short_id = self
            .context
            .assign_short_id(&ShortIds(tx), Some(draft.short_id.as_str()))
            .await?
            .into_value();
        tx.insert_snippet(NewSnippet {
            short_id,
            owner,
            title: draft.title,
            html: draft.html,
            css: draft.css,
            js: draft.js,
            forked_from: None,
            created_at_millis: self.context.now_millis(),
        })
        .await
    }

    async fn fork_snippet_in(
        &self,
        tx: &S::Tx,
        user: UserId,
        source_short_id: &str,
    ) -> Result<Snippet> {
        self.require_user(tx, user).await?;
        let source = self.snippet_by_short_id(tx, source_short_id).await?;
        let short_id = self
            .context
            .assign_short_id(&ShortIds(tx), None)
            .await?
            .into_value();
        let fork = tx
            .insert_snippet(NewSnippet {
                short_id,
                owner: user,
                title: source.title,
                html: source.html,
                css: source.css,
                js: source.js,
                forked_from: Some(source.id),
                created_at_millis: self.context.now_millis(),
            })
            .await?;
        self.context
            .counters()
            .increment(tx, source.id, Counter::Forks)
            .await?;
        Ok(fork)
    }

    async fn toggle_favorite_in(
        &self,
        tx: &S::Tx,
        user: UserId,
        short_id: &str,
    ) -> Result<(SnippetId, FavoriteToggle)> {
        self.require_user(tx, user).await?;
        let snippet = self.snippet_by_short_id(tx, short_id).await?;
        let counters = self.context.counters();

        let existing = self
            .context
            .guarded(|| tx.favorite(user, snippet.id))
            .await?;
        if let Some(favorite) = existing {
            tx.delete_favorite(favorite.id).await?;
            let update = counters
                .decrement(tx, snippet.id, Counter::Favorites)
                .await?;
            let toggle = FavoriteToggle {
                is_favorited: false,
                favorite_count: update.after,
            };
            return Ok((snippet.id, toggle));
        }

        tx.insert_favorite(user, snippet.id).await?;
        let update = counters
            .increment(tx, snippet.id, Counter::Favorites)
            .await?;
        let toggle = FavoriteToggle {
            is_favorited: true,
            favorite_count: update.after,
        };
        Ok((snippet.id, toggle))
    }

    async fn add_comment_in(
        &self,
        tx: &S::Tx,
        author: UserId,
        short_id: &str,
        body: &str,
    ) -> Result<Comment> {
        self.require_user(tx, author).await?;
        let snippet = self.snippet_by_short_id(tx, short_id).await?;
        let comment = tx
            .insert_comment(NewComment {
                author,
                snippet: snippet.id,
                body: body.to_owned(),
                created_at_millis: self.context.now_millis(),
            })
            .await?;
        self.context
            .counters()
            .increment(tx, snippet.id, Counter::Comments)
            .await?;
        Ok(comment)
    }

    async fn delete_comment_in(&self, tx: &S::Tx, author: UserId, id: CommentId) -> Result<()> {
        let comment = self
            .context
            .guarded(|| tx.comment(id))
            .await?
            .ok_or_else(|| Error::not_found(CommentId::ENTITY, id))?;
        if comment.author != author {
            return Err(Error::forbidden(format!(
                "user {author} is not the author of comment {id}"
            )));
        }
        tx.delete_comment(id).await?;
        self.context
            .counters()
            .decrement(tx, comment.snippet, Counter::Comments)
            .await?;
        Ok(())
    }

    async fn delete_snippet_in(&self, tx: &S::Tx, user: UserId, short_id: &str) -> Result<()> {
        let snippet = self.snippet_by_short_id(tx, short_id).await?;
        if snippet.owner != user {
            return Err(Error::forbidden(format!(
                "user {user} does not own snippet {short_id}"
            )));
        }
        if let Some(parent) = snippet.forked_from {
            self.context
                .counters()
                .decrement(tx, parent, Counter::Forks)
                .await?;
        }
        tx.delete_snippet(snippet.id).await
    }

    async fn require_user(&self, tx: &S::Tx, id: UserId) -> Result<User> {
        self.context
            .guarded(|| tx.user(id))
            .await?
            .ok_or_else(|| Error::not_found(UserId::ENTITY, id))
    }

    async fn snippet_by_short_id(&self, tx: &S::Tx, short_id: &str) -> Result<Snippet> {
        self.context
            .guarded(|| tx.snippet_by_short_id(short_id))
            .await?
            .ok_or_else(|| Error::not_found(SnippetId::ENTITY, short_id))
    }

    async fn finish<U>(&self, tx: S::Tx, outcome: Result<U>) -> Result<U> {
        self.finish_reporting(tx, outcome)
            .await
            .map(|(value, _)| value)
    }

    /// Commits on success, rolls back on failure. A failed rollback is logged
    /// and the original error is returned.
    async fn finish_reporting<U>(
        &self,
        tx: S::Tx,
        outcome: Result<U>,
    ) -> Result<(U, CommitReport)> {
        match outcome {
            Ok(value) => {
                let report = self.context.counters().commit(tx).await?;
                Ok((value, report))
            }
            Err(err) => {
                if let Err(_rollback) = tx.rollback().await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_rollback, cause = %err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
