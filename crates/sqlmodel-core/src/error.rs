//! Error types shared by every SQLModel crate.

use std::fmt;

/// Result alias used throughout SQLModel.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of loader-option resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderErrorKind {
    /// A wildcard, exclusionary or unqualified option matches more than one
    /// primary entity of the statement.
    AmbiguousTarget,
    /// An option names an attribute the target entity does not map.
    UnknownAttribute,
    /// `undefer_group` names a group no attribute belongs to.
    UnknownGroup,
    /// A path segment is not a relationship of the entity it is applied to.
    UnknownRelationship,
    /// A path string is malformed (bad token, misplaced wildcard, ...).
    InvalidPath,
    /// The option is structurally invalid (re-targeted child, mixed paths).
    InvalidOption,
}

impl LoaderErrorKind {
    /// Short machine-friendly name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LoaderErrorKind::AmbiguousTarget => "ambiguous target",
            LoaderErrorKind::UnknownAttribute => "unknown attribute",
            LoaderErrorKind::UnknownGroup => "unknown group",
            LoaderErrorKind::UnknownRelationship => "unknown relationship",
            LoaderErrorKind::InvalidPath => "invalid path",
            LoaderErrorKind::InvalidOption => "invalid option",
        }
    }
}

/// A loader option could not be resolved against a statement.
///
/// These are configuration errors: they are raised when the statement is
/// compiled, never while rows are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderError {
    /// What went wrong.
    pub kind: LoaderErrorKind,
    /// Human readable detail, naming the offending option.
    pub message: String,
}

impl LoaderError {
    /// Create a new loader error.
    pub fn new(kind: LoaderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// The main error type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Loader option resolution failed.
    Loader(LoaderError),
    /// A raise-mode attribute was read; no SQL was emitted.
    RaiseLoad {
        /// Entity (table) name.
        entity: &'static str,
        /// Attribute that was accessed.
        attribute: String,
    },
    /// The instance is not attached to the session that was asked to load it.
    Detached {
        /// Entity (table) name.
        entity: &'static str,
    },
    /// The row backing an instance no longer exists.
    ObjectDeleted {
        /// Entity (table) name.
        entity: &'static str,
        /// Rendered primary key.
        key: String,
    },
    /// Invalid mapper configuration or row/attribute conversion failure.
    Mapping(String),
    /// Free-form error (drivers, conversions, statement misuse).
    Custom(String),
}

impl Error {
    /// Shorthand for a loader error.
    pub fn loader(kind: LoaderErrorKind, message: impl Into<String>) -> Self {
        Error::Loader(LoaderError::new(kind, message))
    }

    /// Shorthand for a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Error::Mapping(message.into())
    }

    /// The loader error kind, if this is a loader error.
    #[must_use]
    pub fn loader_kind(&self) -> Option<LoaderErrorKind> {
        match self {
            Error::Loader(e) => Some(e.kind),
            _ => None,
        }
    }

    /// True if this error was raised by a raise-mode attribute access.
    #[must_use]
    pub const fn is_raiseload(&self) -> bool {
        matches!(self, Error::RaiseLoad { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Loader(e) => write!(f, "loader option error: {e}"),
            Error::RaiseLoad { entity, attribute } => write!(
                f,
                "'{entity}.{attribute}' is not available due to raiseload; \
                 undefer it in the statement options to load it"
            ),
            Error::Detached { entity } => write!(
                f,
                "instance of '{entity}' is not bound to this session; \
                 attribute load cannot proceed"
            ),
            Error::ObjectDeleted { entity, key } => {
                write!(f, "instance '{entity}' ({key}) has been deleted")
            }
            Error::Mapping(msg) => write!(f, "mapping error: {msg}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LoaderError> for Error {
    fn from(value: LoaderError) -> Self {
        Error::Loader(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_display_names_kind() {
        let err = Error::loader(LoaderErrorKind::AmbiguousTarget, "load_only(title)");
        assert_eq!(
            err.to_string(),
            "loader option error: ambiguous target: load_only(title)"
        );
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::AmbiguousTarget));
    }

    #[test]
    fn test_raiseload_is_distinct() {
        let err = Error::RaiseLoad {
            entity: "books",
            attribute: "summary".to_string(),
        };
        assert!(err.is_raiseload());
        assert!(err.loader_kind().is_none());
        assert!(err.to_string().contains("books.summary"));
    }
}
