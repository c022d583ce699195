use core::fmt;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Identifier fields that are generated and must stay unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Field {
    /// The 7-character public key of a snippet.
    ShortId,
    /// The handle of a user.
    Username,
}

impl Field {
    /// Returns the column name used by the persistence layer.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortId => "shortId",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that `snippy` can produce.
///
/// Adapters translate their native failures into these variants at the
/// store boundary so that retry classification is a pattern match on
/// [`Error::kind`] rather than string sniffing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A candidate identifier is already taken.
    #[error("{field} `{value}` is already taken")]
    Collision { field: Field, value: String },

    /// The store could not be reached, or dropped the connection.
    #[error("connection failed: {message}")]
    Connectivity { message: String },

    /// The connection circuit breaker is open and short-circuited the call.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// A retry policy ran out of attempts. `source` is the last error seen.
    #[error("{policy} policy gave up after {attempts} attempts")]
    Exhausted {
        policy: &'static str,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Caller input was rejected.
    #[error("invalid input: {message}")]
    Validation { message: String },

    /// A referenced entity does not exist.
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },

    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Anything the store could not classify.
    #[error("{message}")]
    Unknown { message: String },
}

/// Discriminant of an [`Error`], used by retry classifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    Collision(Field),
    Connectivity,
    CircuitOpen,
    Exhausted,
    Validation,
    NotFound,
    Forbidden,
    Unknown,
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Collision { field, .. } => ErrorKind::Collision(*field),
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub(crate) fn collision(field: Field, value: impl Into<String>) -> Self {
        Self::Collision {
            field,
            value: value.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Builds a connectivity error. Adapters use this for refused, reset or
    /// timed-out connections.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }
}
