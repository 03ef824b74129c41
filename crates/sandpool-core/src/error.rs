//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Error`]. Each variant
//! carries a stable, entity-identifying message; the `Internal` variant
//! additionally wraps the underlying cause for logging. Equality compares
//! kind and message only, so tests can assert on errors without holding
//! the original cause value.

use thiserror::Error;

/// Boxed source error kept for logging; never part of equality.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`], used for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed input or business-rule violation.
    Validation,
    /// Version mismatch or disallowed state (e.g. delete while leased).
    Conflict,
    /// No such entity.
    NotFound,
    /// Create-only write hit an existing record.
    AlreadyExists,
    /// Unexpected backend or provider failure.
    Internal,
}

/// Errors produced by the record store, lifecycle rules, reconciler, and
/// services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input or a business-rule violation.
    #[error("{group} validation error: {message}")]
    Validation {
        /// The entity group the input belonged to ("account", "lease").
        group: String,
        /// What was wrong with the input.
        message: String,
    },

    /// The operation is not permitted in the entity's current state, or a
    /// conditional write lost against a concurrent writer.
    #[error("operation cannot be fulfilled on {group} {name:?}: {message}")]
    Conflict {
        /// The entity group.
        group: String,
        /// The identifier of the conflicting entity.
        name: String,
        /// Why the operation cannot proceed.
        message: String,
    },

    /// The requested entity does not exist.
    #[error("{group} {name:?} not found")]
    NotFound {
        /// The entity group.
        group: String,
        /// The identifier that was looked up.
        name: String,
    },

    /// A create-only write found an existing record with the same key.
    #[error("{group} {name:?} already exists")]
    AlreadyExists {
        /// The entity group.
        group: String,
        /// The identifier that already exists.
        name: String,
    },

    /// An unexpected failure in a backend or external provider. The
    /// message is stable; the cause is for logs only.
    #[error("{message}")]
    Internal {
        /// Stable description of what failed.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl Error {
    /// Creates a validation error for the given entity group.
    pub fn validation(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Creates a conflict error identifying the entity.
    pub fn conflict(
        group: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            group: group.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error identifying the entity.
    pub fn not_found(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Creates an already-exists error identifying the entity.
    pub fn already_exists(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Creates an internal error wrapping the underlying cause.
    pub fn internal(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an internal error with no recorded cause.
    pub fn internal_message(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

// Kind + rendered message; the Internal cause is excluded so that two
// errors produced on different code paths still compare equal.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.to_string() == other.to_string()
    }
}

impl Eq for Error {}
