use parking_lot::Mutex;
use portable_atomic::{AtomicU32, AtomicU64, Ordering};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ChildCounts, Comment, CommentId, CommitReport, CommittedCounter, Counter, CounterDelta,
    CounterUpdate, Error, Favorite, FavoriteId, Field, NewComment, NewSnippet, NewUser, Result,
    Snippet, SnippetId, Store, Transaction, User, UserId,
};

/// Transactional in-memory [`Store`].
///
/// Each transaction works on its own copy of the tables and keeps a log of
/// its writes. Commit replays the log against the latest committed state
/// under one lock, so:
///
/// - uniqueness of short IDs, usernames and (user, snippet) favorites is
///   re-checked against everything committed since the transaction began;
/// - counter updates are applied relative to the committed value, so
///   concurrent increments on the same snippet never lose an update;
/// - a write that no longer applies (its snippet was deleted meanwhile)
///   fails the whole commit and nothing of the transaction is kept.
///
/// Copying the tables on `begin` makes this adapter unsuitable for large
/// data sets; it exists for tests, benchmarks and demos.
///
/// Connectivity faults can be injected with the `fail_next_*` methods.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    next_id: AtomicU64,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    begins: Fault,
    reads: Fault,
    counter_updates: Fault,
    commits: Fault,
}

/// Number of upcoming calls that should fail.
#[derive(Default)]
struct Fault(AtomicU32);

impl Fault {
    fn arm(&self, calls: u32) {
        self.0.store(calls, Ordering::SeqCst);
    }

    fn trip(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `calls` calls to [`Store::begin`] fail with
    /// [`Error::Connectivity`].
    pub fn fail_next_begins(&self, calls: u32) {
        self.shared.faults.begins.arm(calls);
    }

    /// The next `calls` transactional reads (lookups by ID, username, short
    /// ID or favorite pair) fail with [`Error::Connectivity`].
    pub fn fail_next_reads(&self, calls: u32) {
        self.shared.faults.reads.arm(calls);
    }

    /// The next `calls` counter updates fail with [`Error::Connectivity`].
    pub fn fail_next_counter_updates(&self, calls: u32) {
        self.shared.faults.counter_updates.arm(calls);
    }

    /// The next `calls` commits fail with [`Error::Connectivity`] and discard
    /// the transaction.
    pub fn fail_next_commits(&self, calls: u32) {
        self.shared.faults.commits.arm(calls);
    }

    /// Committed snippet with this short ID.
    #[must_use]
    pub fn snippet(&self, short_id: &str) -> Option<Snippet> {
        self.shared
            .tables
            .lock()
            .snippet_by_short_id(short_id)
            .cloned()
    }

    /// Committed user with this username.
    #[must_use]
    pub fn user(&self, username: &str) -> Option<User> {
        self.shared
            .tables
            .lock()
            .user_by_username(username)
            .cloned()
    }

    /// Every committed snippet, in insertion order.
    #[must_use]
    pub fn snippets(&self) -> Vec<Snippet> {
        self.shared.tables.lock().snippets.values().cloned().collect()
    }

    /// Counts the committed child rows of a snippet by scanning.
    #[must_use]
    pub fn live_children(&self, snippet: SnippetId) -> ChildCounts {
        self.shared.tables.lock().children(snippet)
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        if self.shared.faults.begins.trip() {
            return Err(Error::connectivity("connection refused"));
        }
        let view = self.shared.tables.lock().clone();
        Ok(MemoryTransaction {
            store: self.clone(),
            state: Mutex::new(TxState {
                view,
                log: Vec::new(),
            }),
        })
    }
}

/// A [`Transaction`] on a [`MemoryStore`].
pub struct MemoryTransaction {
    store: MemoryStore,
    state: Mutex<TxState>,
}

struct TxState {
    view: Tables,
    log: Vec<Op>,
}

impl MemoryTransaction {
    /// Applies `op` to this transaction's view and logs it for commit.
    fn record(&self, op: Op) -> Result<()> {
        let mut state = self.state.lock();
        op.apply(&mut state.view)?;
        state.log.push(op);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        if self.store.shared.faults.reads.trip() {
            return Err(Error::connectivity("connection reset during read"));
        }
        Ok(f(&self.state.lock().view))
    }
}

impl Transaction for MemoryTransaction {
    async fn user(&self, id: UserId) -> Result<Option<User>> {
        self.read(|t| t.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.read(|t| t.user_by_username(username).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let user = User {
            id: UserId::from_raw(self.store.next_id()),
            username: user.username,
            display_name: user.display_name,
            auth_subject: user.auth_subject,
        };
        self.record(Op::InsertUser(user.clone()))?;
        Ok(user)
    }

    async fn snippet(&self, id: SnippetId) -> Result<Option<Snippet>> {
        self.read(|t| t.snippets.get(&id).cloned())
    }

    async fn snippet_by_short_id(&self, short_id: &str) -> Result<Option<Snippet>> {
        self.read(|t| t.snippet_by_short_id(short_id).cloned())
    }

    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet> {
        let snippet = Snippet {
            id: SnippetId::from_raw(self.store.next_id()),
            short_id: snippet.short_id,
            owner: snippet.owner,
            title: snippet.title,
            html: snippet.html,
            css: snippet.css,
            js: snippet.js,
            forked_from: snippet.forked_from,
            fork_count: 0,
            favorite_count: 0,
            comment_count: 0,
            created_at_millis: snippet.created_at_millis,
        };
        self.record(Op::InsertSnippet(snippet.clone()))?;
        Ok(snippet)
    }

    async fn delete_snippet(&self, id: SnippetId) -> Result<()> {
        self.record(Op::DeleteSnippet(id))
    }

    async fn favorite(&self, user: UserId, snippet: SnippetId) -> Result<Option<Favorite>> {
        self.read(|t| {
            t.favorite_pairs
                .get(&(user, snippet))
                .and_then(|id| t.favorites.get(id))
                .copied()
        })
    }

    async fn insert_favorite(&self, user: UserId, snippet: SnippetId) -> Result<Favorite> {
        let favorite = Favorite {
            id: FavoriteId::from_raw(self.store.next_id()),
            user,
            snippet,
        };
        self.record(Op::InsertFavorite(favorite))?;
        Ok(favorite)
    }

    async fn delete_favorite(&self, id: FavoriteId) -> Result<()> {
        self.record(Op::DeleteFavorite(id))
    }

    async fn comment(&self, id: CommentId) -> Result<Option<Comment>> {
        self.read(|t| t.comments.get(&id).cloned())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        let comment = Comment {
            id: CommentId::from_raw(self.store.next_id()),
            author: comment.author,
            snippet: comment.snippet,
            body: comment.body,
            created_at_millis: comment.created_at_millis,
        };
        self.record(Op::InsertComment(comment.clone()))?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId) -> Result<()> {
        self.record(Op::DeleteComment(id))
    }

    async fn adjust_counter(
        &self,
        snippet: SnippetId,
        counter: Counter,
        delta: CounterDelta,
    ) -> Result<CounterUpdate> {
        if self.store.shared.faults.counter_updates.trip() {
            return Err(Error::connectivity("connection reset during counter update"));
        }
        let mut state = self.state.lock();
        let update = state.view.adjust(snippet, counter, delta)?;
        state.log.push(Op::AdjustCounter {
            snippet,
            counter,
            delta,
            clamped: update.clamped,
        });
        Ok(update)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    async fn commit(self) -> Result<CommitReport> {
        if self.store.shared.faults.commits.trip() {
            return Err(Error::connectivity("connection lost before commit"));
        }
        let TxState { log, .. } = self.state.into_inner();
        let mut report = CommitReport::default();
        if log.is_empty() {
            return Ok(report);
        }

        let mut tables = self.store.shared.tables.lock();
        let mut scratch = tables.clone();
        for op in &log {
            match *op {
                Op::AdjustCounter {
                    snippet,
                    counter,
                    delta,
                    clamped,
                } => {
                    let update = scratch.adjust(snippet, counter, delta)?;
                    report.counters.push(CommittedCounter {
                        snippet,
                        counter,
                        update,
                        clamped_at_commit: update.clamped && !clamped,
                    });
                }
                _ => op.apply(&mut scratch)?,
            }
        }
        *tables = scratch;
        drop(tables);

        #[cfg(feature = "tracing")]
        tracing::trace!(writes = log.len(), "committed");
        Ok(report)
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

/// One logged write.
#[derive(Clone, Debug)]
enum Op {
    InsertUser(User),
    InsertSnippet(Snippet),
    DeleteSnippet(SnippetId),
    InsertFavorite(Favorite),
    DeleteFavorite(FavoriteId),
    InsertComment(Comment),
    DeleteComment(CommentId),
    AdjustCounter {
        snippet: SnippetId,
        counter: Counter,
        delta: CounterDelta,
        /// Whether the transaction's own view clamped this update.
        clamped: bool,
    },
}

impl Op {
    fn apply(&self, tables: &mut Tables) -> Result<()> {
        match self {
            Self::InsertUser(user) => tables.insert_user(user.clone()),
            Self::InsertSnippet(snippet) => tables.insert_snippet(snippet.clone()),
            Self::DeleteSnippet(id) => tables.delete_snippet(*id),
            Self::InsertFavorite(favorite) => tables.insert_favorite(*favorite),
            Self::DeleteFavorite(id) => tables.delete_favorite(*id),
            Self::InsertComment(comment) => tables.insert_comment(comment.clone()),
            Self::DeleteComment(id) => tables.delete_comment(*id),
            Self::AdjustCounter {
                snippet,
                counter,
                delta,
                ..
            } => tables.adjust(*snippet, *counter, *delta).map(drop),
        }
    }
}

/// Rows plus the unique indexes over them.
#[derive(Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    snippets: BTreeMap<SnippetId, Snippet>,
    short_ids: HashMap<String, SnippetId>,
    favorites: BTreeMap<FavoriteId, Favorite>,
    favorite_pairs: HashMap<(UserId, SnippetId), FavoriteId>,
    comments: BTreeMap<CommentId, Comment>,
}

impl Tables {
    fn user_by_username(&self, username: &str) -> Option<&User> {
        self.usernames
            .get(username)
            .and_then(|id| self.users.get(id))
    }

    fn snippet_by_short_id(&self, short_id: &str) -> Option<&Snippet> {
        self.short_ids
            .get(short_id)
            .and_then(|id| self.snippets.get(id))
    }

    fn require_user(&self, id: UserId) -> Result<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::not_found(UserId::ENTITY, id))
        }
    }

    fn require_snippet(&self, id: SnippetId) -> Result<()> {
        if self.snippets.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::not_found(SnippetId::ENTITY, id))
        }
    }

    fn insert_user(&mut self, user: User) -> Result<()> {
        if self.usernames.contains_key(&user.username) {
            return Err(Error::collision(Field::Username, user.username));
        }
        self.usernames.insert(user.username.clone(), user.id);
        self.users.insert(user.id, user);
        Ok(())
    }

    fn insert_snippet(&mut self, snippet: Snippet) -> Result<()> {
        if self.short_ids.contains_key(&snippet.short_id) {
            return Err(Error::collision(Field::ShortId, snippet.short_id));
        }
        self.require_user(snippet.owner)?;
        if let Some(parent) = snippet.forked_from {
            self.require_snippet(parent)?;
        }
        self.short_ids.insert(snippet.short_id.clone(), snippet.id);
        self.snippets.insert(snippet.id, snippet);
        Ok(())
    }

    fn delete_snippet(&mut self, id: SnippetId) -> Result<()> {
        let snippet = self
            .snippets
            .remove(&id)
            .ok_or_else(|| Error::not_found(SnippetId::ENTITY, id))?;
        self.short_ids.remove(&snippet.short_id);
        self.favorites.retain(|_, favorite| favorite.snippet != id);
        self.favorite_pairs.retain(|&(_, snippet), _| snippet != id);
        self.comments.retain(|_, comment| comment.snippet != id);
        for fork in self.snippets.values_mut() {
            if fork.forked_from == Some(id) {
                fork.forked_from = None;
            }
        }
        Ok(())
    }

    fn insert_favorite(&mut self, favorite: Favorite) -> Result<()> {
        self.require_user(favorite.user)?;
        self.require_snippet(favorite.snippet)?;
        let pair = (favorite.user, favorite.snippet);
        if self.favorite_pairs.contains_key(&pair) {
            return Err(Error::validation(format!(
                "user {} already favorited snippet {}",
                favorite.user, favorite.snippet
            )));
        }
        self.favorite_pairs.insert(pair, favorite.id);
        self.favorites.insert(favorite.id, favorite);
        Ok(())
    }

    fn delete_favorite(&mut self, id: FavoriteId) -> Result<()> {
        let favorite = self
            .favorites
            .remove(&id)
            .ok_or_else(|| Error::not_found(FavoriteId::ENTITY, id))?;
        self.favorite_pairs
            .remove(&(favorite.user, favorite.snippet));
        Ok(())
    }

    fn insert_comment(&mut self, comment: Comment) -> Result<()> {
        self.require_user(comment.author)?;
        self.require_snippet(comment.snippet)?;
        self.comments.insert(comment.id, comment);
        Ok(())
    }

    fn delete_comment(&mut self, id: CommentId) -> Result<()> {
        self.comments
            .remove(&id)
            .map(drop)
            .ok_or_else(|| Error::not_found(CommentId::ENTITY, id))
    }

    fn adjust(
        &mut self,
        snippet: SnippetId,
        counter: Counter,
        delta: CounterDelta,
    ) -> Result<CounterUpdate> {
        let row = self
            .snippets
            .get_mut(&snippet)
            .ok_or_else(|| Error::not_found(SnippetId::ENTITY, snippet))?;
        let slot = row.count_mut(counter);
        let update = CounterUpdate::apply(*slot, delta);
        *slot = update.after;
        Ok(update)
    }

    fn children(&self, id: SnippetId) -> ChildCounts {
        let count = |n: usize| n as u64;
        ChildCounts {
            forks: count(
                self.snippets
                    .values()
                    .filter(|s| s.forked_from == Some(id))
                    .count(),
            ),
            favorites: count(self.favorites.values().filter(|f| f.snippet == id).count()),
            comments: count(self.comments.values().filter(|c| c.snippet == id).count()),
        }
    }
}
