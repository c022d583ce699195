use core::fmt;

/// Declares a `u64`-backed entity identifier.
///
/// ```text
/// define_entity_id!(
///     /// docs
///     <TypeName>, "<entity name>"
/// );
/// ```
///
/// The entity name is what [`Error::NotFound`](crate::Error::NotFound)
/// reports for a missing row.
macro_rules! define_entity_id {
    (
        $(#[$meta:meta])*
        $name:ident, $entity:literal
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Name of the entity this identifier refers to.
            pub const ENTITY: &'static str = $entity;

            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[must_use]
            pub const fn to_raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

define_entity_id!(
    /// Primary key of a [`User`].
    UserId, "user"
);
define_entity_id!(
    /// Primary key of a [`Snippet`].
    SnippetId, "snippet"
);
define_entity_id!(
    /// Primary key of a [`Favorite`].
    FavoriteId, "favorite"
);
define_entity_id!(
    /// Primary key of a [`Comment`].
    CommentId, "comment"
);

/// A denormalized per-snippet counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Counter {
    Forks,
    Favorites,
    Comments,
}

/// Direction of a relative counter update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterDelta {
    Increment,
    Decrement,
}

/// Outcome of one counter update, as seen by the transaction that made it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterUpdate {
    pub before: u64,
    pub after: u64,
    /// `true` when a decrement found the counter already at zero.
    pub clamped: bool,
}

impl CounterUpdate {
    /// Applies `delta` to `before`, flooring at zero.
    #[must_use]
    pub const fn apply(before: u64, delta: CounterDelta) -> Self {
        match delta {
            CounterDelta::Increment => Self {
                before,
                after: before.saturating_add(1),
                clamped: false,
            },
            CounterDelta::Decrement => Self {
                before,
                after: before.saturating_sub(1),
                clamped: before == 0,
            },
        }
    }
}

/// One counter update as applied to the committed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommittedCounter {
    pub snippet: SnippetId,
    pub counter: Counter,
    pub update: CounterUpdate,
    /// The decrement hit zero only at commit; the transaction's own view
    /// had not clamped it.
    pub clamped_at_commit: bool,
}

/// What a commit did to counters, in the order the updates were made.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub counters: Vec<CommittedCounter>,
}

impl CommitReport {
    /// Committed value of `counter` on `snippet` after this transaction's
    /// last update to it.
    #[must_use]
    pub fn committed_value(&self, snippet: SnippetId, counter: Counter) -> Option<u64> {
        self.counters
            .iter()
            .rev()
            .find(|c| c.snippet == snippet && c.counter == counter)
            .map(|c| c.update.after)
    }

    /// Updates that clamped at commit without having clamped in the
    /// transaction.
    pub fn late_clamps(&self) -> impl Iterator<Item = &CommittedCounter> {
        self.counters.iter().filter(|c| c.clamped_at_commit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    /// Subject claim of the identity provider that authenticated the user.
    pub auth_subject: String,
}

/// Fields of a user row about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub display_name: Option<String>,
    pub auth_subject: String,
}

/// A shared piece of HTML, CSS and JavaScript.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snippet {
    pub id: SnippetId,
    /// Public identifier used in URLs.
    pub short_id: String,
    pub owner: UserId,
    pub title: String,
    pub html: String,
    pub css: String,
    pub js: String,
    pub forked_from: Option<SnippetId>,
    pub fork_count: u64,
    pub favorite_count: u64,
    pub comment_count: u64,
    pub created_at_millis: u64,
}

impl Snippet {
    #[must_use]
    pub const fn count(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Forks => self.fork_count,
            Counter::Favorites => self.favorite_count,
            Counter::Comments => self.comment_count,
        }
    }

    pub fn count_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::Forks => &mut self.fork_count,
            Counter::Favorites => &mut self.favorite_count,
            Counter::Comments => &mut self.comment_count,
        }
    }
}

/// Content supplied by the caller when creating a snippet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnippetDraft {
    /// Leave empty to have one generated.
    pub short_id: String,
    pub title: String,
    pub html: String,
    pub css: String,
    pub js: String,
}

impl SnippetDraft {
    /// A draft with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Fields of a snippet row about to be inserted. Counters always start at
/// zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSnippet {
    pub short_id: String,
    pub owner: UserId,
    pub title: String,
    pub html: String,
    pub css: String,
    pub js: String,
    pub forked_from: Option<SnippetId>,
    pub created_at_millis: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Favorite {
    pub id: FavoriteId,
    pub user: UserId,
    pub snippet: SnippetId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub snippet: SnippetId,
    pub body: String,
    pub created_at_millis: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewComment {
    pub author: UserId,
    pub snippet: SnippetId,
    pub body: String,
    pub created_at_millis: u64,
}

/// Result of toggling a favorite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FavoriteToggle {
    pub is_favorited: bool,
    pub favorite_count: u64,
}

/// Live child rows referencing one snippet, counted by scan.
///
/// Only for verification: normal operation never recomputes counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChildCounts {
    pub forks: u64,
    pub favorites: u64,
    pub comments: u64,
}

impl ChildCounts {
    /// Returns `true` if the snippet's denormalized counters agree with the
    /// scanned counts.
    #[must_use]
    pub const fn matches(&self, snippet: &Snippet) -> bool {
        self.forks == snippet.fork_count
            && self.favorites == snippet.favorite_count
            && self.comments == snippet.comment_count
    }
}
