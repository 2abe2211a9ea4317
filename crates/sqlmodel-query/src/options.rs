//! Loader options: per-statement overrides of column loading.
//!
//! Options are built with the free functions in this module and attached to
//! a statement with [`Select::options`](crate::Select::options):
//!
//! ```ignore
//! Select::new::<Book>().options([
//!     load_only(["title", "isbn"]),
//!     defer("author.bio"),
//!     defaultload("reviews").options([undefer_group("text")]),
//! ]);
//! ```
//!
//! Attribute strings may carry a relationship path (`"author.bio"`) and may
//! use `*` as the final token for "every attribute". Strings are validated
//! when the statement is compiled, not when the option is built.

use sqlmodel_core::{MappedEntity, Model};

/// Which attributes a directive selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrSelector {
    /// `*`: every attribute of the target entity.
    All,
    /// A single named attribute.
    Named(String),
}

impl AttrSelector {
    /// True for `*`.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, AttrSelector::All)
    }
}

/// A resolved change to the load mode of one entity's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Defer the selected attributes, or make them raise when `raiseload`.
    Defer {
        /// Selected attributes.
        attr: AttrSelector,
        /// Raise on access instead of loading.
        raiseload: bool,
    },
    /// Load the selected attributes with the row.
    Undefer(AttrSelector),
    /// Load every member of a deferred group with the row.
    UndeferGroup(String),
    /// Defer everything except the named attributes and the primary key.
    LoadOnly {
        /// Attributes kept eager.
        attrs: Vec<String>,
        /// Raise on access to every other attribute instead of loading it.
        raiseload: bool,
    },
}

impl Directive {
    /// True for wildcard and exclusionary directives, which need a single
    /// unambiguous target entity.
    #[must_use]
    pub fn is_wildcard_or_exclusionary(&self) -> bool {
        match self {
            Directive::Defer { attr, .. } | Directive::Undefer(attr) => attr.is_wildcard(),
            Directive::LoadOnly { .. } => true,
            Directive::UndeferGroup(_) => false,
        }
    }
}

/// The directive as written by the caller; attribute strings still carry
/// their relationship prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawDirective {
    Defer { attr: String, raiseload: bool },
    Undefer(String),
    UndeferGroup(String),
    LoadOnly { attrs: Vec<String>, raiseload: bool },
}

/// Root entity an option applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTarget {
    /// Resolved against the statement's primary entities at compile time.
    Unqualified,
    /// Explicitly rooted at one entity (see [`Load::of`]).
    Entity(MappedEntity),
}

/// A loader option node.
///
/// A node optionally carries a relationship path (relative to its parent),
/// optionally a directive, and an ordered list of child nodes whose paths
/// continue from this node's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOption {
    pub(crate) target: OptionTarget,
    pub(crate) path: String,
    pub(crate) directive: Option<RawDirective>,
    pub(crate) children: Vec<LoaderOption>,
}

impl LoaderOption {
    fn node(path: impl Into<String>, directive: Option<RawDirective>) -> Self {
        Self {
            target: OptionTarget::Unqualified,
            path: path.into(),
            directive,
            children: Vec::new(),
        }
    }

    /// Switch `defer`/`load_only` between "load on access" and "raise on
    /// access". Has no effect on other directives.
    #[must_use]
    pub fn raiseload(mut self, value: bool) -> Self {
        match &mut self.directive {
            Some(RawDirective::Defer { raiseload, .. } | RawDirective::LoadOnly { raiseload, .. }) => {
                *raiseload = value;
            }
            _ => {}
        }
        self
    }

    /// Attach nested options below this node's path.
    #[must_use]
    pub fn options(mut self, children: impl IntoIterator<Item = LoaderOption>) -> Self {
        self.children.extend(children);
        self
    }

    /// Chain a `defer` below this node's path.
    #[must_use]
    pub fn defer(self, attr: impl Into<String>) -> Self {
        self.options([defer(attr)])
    }

    /// Chain an `undefer` below this node's path.
    #[must_use]
    pub fn undefer(self, attr: impl Into<String>) -> Self {
        self.options([undefer(attr)])
    }

    /// Chain an `undefer_group` below this node's path.
    #[must_use]
    pub fn undefer_group(self, group: impl Into<String>) -> Self {
        self.options([undefer_group(group)])
    }

    /// Chain a `load_only` below this node's path.
    #[must_use]
    pub fn load_only<I, S>(self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options([load_only(attrs)])
    }

    /// The option's root target.
    #[must_use]
    pub fn target(&self) -> OptionTarget {
        self.target
    }

    /// Nested options.
    #[must_use]
    pub fn children(&self) -> &[LoaderOption] {
        &self.children
    }

    /// Short rendering used in error messages, e.g. `load_only(title, isbn)`.
    #[must_use]
    pub fn describe(&self) -> String {
        let body = match &self.directive {
            None if self.path.is_empty() => String::new(),
            None => format!("defaultload({})", self.path),
            Some(d) => describe_raw(d),
        };
        match self.target {
            OptionTarget::Entity(e) if body.is_empty() => format!("Load({})", e.table),
            OptionTarget::Entity(e) => format!("Load({}).{body}", e.table),
            OptionTarget::Unqualified => body,
        }
    }
}

pub(crate) fn describe_raw(d: &RawDirective) -> String {
    match d {
        RawDirective::Defer { attr, raiseload } if *raiseload => format!("raiseload({attr})"),
        RawDirective::Defer { attr, .. } => format!("defer({attr})"),
        RawDirective::Undefer(attr) => format!("undefer({attr})"),
        RawDirective::UndeferGroup(g) => format!("undefer_group({g})"),
        RawDirective::LoadOnly { attrs, .. } => format!("load_only({})", attrs.join(", ")),
    }
}

/// Entry point for entity-qualified options, the way `Load(Book)` roots an
/// option chain at one entity of a multi-entity statement.
#[derive(Debug, Clone, Copy)]
pub struct Load;

impl Load {
    /// Root a chain of options at `M`.
    #[must_use]
    pub fn of<M: Model>() -> LoaderOption {
        LoaderOption {
            target: OptionTarget::Entity(MappedEntity::of::<M>()),
            path: String::new(),
            directive: None,
            children: Vec::new(),
        }
    }
}

/// Defer an attribute (`"summary"`, `"author.bio"`, `"*"`).
pub fn defer(attr: impl Into<String>) -> LoaderOption {
    LoaderOption::node(
        String::new(),
        Some(RawDirective::Defer {
            attr: attr.into(),
            raiseload: false,
        }),
    )
}

/// Load an attribute with the row even if the mapper defers it.
pub fn undefer(attr: impl Into<String>) -> LoaderOption {
    LoaderOption::node(String::new(), Some(RawDirective::Undefer(attr.into())))
}

/// Load every member of a deferred group with the row.
///
/// `"reviews.text"` targets the `text` group of the entity reached through
/// `reviews`.
pub fn undefer_group(group: impl Into<String>) -> LoaderOption {
    LoaderOption::node(String::new(), Some(RawDirective::UndeferGroup(group.into())))
}

/// Load only the named attributes (plus the primary key); defer the rest.
pub fn load_only<I, S>(attrs: I) -> LoaderOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    LoaderOption::node(
        String::new(),
        Some(RawDirective::LoadOnly {
            attrs: attrs.into_iter().map(Into::into).collect(),
            raiseload: false,
        }),
    )
}

/// Defer an attribute and raise on access instead of loading it.
pub fn raiseload(attr: impl Into<String>) -> LoaderOption {
    defer(attr).raiseload(true)
}

/// A path-only node: keeps the relationship's own loading and scopes nested
/// options to it (`defaultload("author").options([defer("bio")])`).
pub fn defaultload(path: impl Into<String>) -> LoaderOption {
    LoaderOption::node(path, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raiseload_flag_only_touches_defer_and_load_only() {
        let opt = defer("summary").raiseload(true);
        assert_eq!(
            opt.directive,
            Some(RawDirective::Defer {
                attr: "summary".into(),
                raiseload: true
            })
        );

        let opt = undefer("summary").raiseload(true);
        assert_eq!(opt.directive, Some(RawDirective::Undefer("summary".into())));
    }

    #[test]
    fn test_chaining_appends_children_in_order() {
        let opt = defaultload("author").defer("bio").undefer("name");
        assert_eq!(opt.children().len(), 2);
        assert_eq!(opt.children()[0].describe(), "defer(bio)");
        assert_eq!(opt.children()[1].describe(), "undefer(name)");
    }

    #[test]
    fn test_describe_renders_option() {
        assert_eq!(load_only(["title", "isbn"]).describe(), "load_only(title, isbn)");
        assert_eq!(raiseload("cover").describe(), "raiseload(cover)");
        assert_eq!(defaultload("author").describe(), "defaultload(author)");
    }

    #[test]
    fn test_wildcard_classification() {
        assert!(
            Directive::Defer {
                attr: AttrSelector::All,
                raiseload: false
            }
            .is_wildcard_or_exclusionary()
        );
        assert!(
            Directive::LoadOnly {
                attrs: vec!["a".into()],
                raiseload: false
            }
            .is_wildcard_or_exclusionary()
        );
        assert!(!Directive::Undefer(AttrSelector::Named("a".into())).is_wildcard_or_exclusionary());
        assert!(!Directive::UndeferGroup("g".into()).is_wildcard_or_exclusionary());
    }
}
