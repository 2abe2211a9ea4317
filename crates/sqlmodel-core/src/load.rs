//! Mapper-level column loading defaults.
//!
//! Every mapped attribute carries a default load mode, fixed when the model's
//! field metadata is declared. Statements may override the mode per query
//! (see `sqlmodel-query`'s loader options) but never mutate these defaults.

use serde::Serialize;

/// How an attribute is loaded when nothing in the statement overrides it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "group")]
pub enum LoadMode {
    /// Selected together with the owning row.
    #[default]
    Eager,
    /// Left out of the row; fetched alone on first access.
    Deferred,
    /// Left out of the row; first access fetches every attribute of the group.
    DeferredGroup(&'static str),
    /// Left out of the row; access raises instead of emitting SQL.
    RaiseOnAccess,
}

impl LoadMode {
    /// True for every mode other than `Eager`.
    #[must_use]
    pub const fn is_deferred(self) -> bool {
        !matches!(self, LoadMode::Eager)
    }

    /// Group name for `DeferredGroup`.
    #[must_use]
    pub const fn group(self) -> Option<&'static str> {
        match self {
            LoadMode::DeferredGroup(g) => Some(g),
            _ => None,
        }
    }
}

/// The load policy of one mapped attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeLoadPolicy {
    /// Attribute name.
    pub name: &'static str,
    /// Mapper-configured default.
    pub default_mode: LoadMode,
}

impl AttributeLoadPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(name: &'static str, default_mode: LoadMode) -> Self {
        Self { name, default_mode }
    }
}
