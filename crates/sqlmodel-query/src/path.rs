//! Path resolution for loader options.
//!
//! A statement's options are normalized into an [`OptionTree`]: one tree per
//! primary entity, with a node per relationship path that has directives
//! attached. Flat path-qualified options (`defer("author.bio")`) and nested
//! ones (`defaultload("author").options([defer("bio")])`) normalize to the
//! same tree, so they always produce the same load plans.
//!
//! Looking up a path with nothing attached yields no directives, which means
//! "inherit the mapper defaults".

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use sqlmodel_core::{Error, LoaderErrorKind, MappedEntity, Result};

use crate::options::{AttrSelector, Directive, LoaderOption, OptionTarget, RawDirective, describe_raw};

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    })
}

fn check_token(token: &str, raw: &str) -> Result<String> {
    if ident_pattern().is_match(token) {
        Ok(token.to_string())
    } else {
        Err(Error::loader(
            LoaderErrorKind::InvalidPath,
            format!("'{raw}': '{token}' is not a valid attribute or relationship name"),
        ))
    }
}

/// Parse a relationship path such as `"author.publisher"`. The empty string
/// is the empty path.
pub(crate) fn parse_path(raw: &str) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split('.').map(|token| check_token(token, raw)).collect()
}

/// Split `"author.bio"` into its relationship prefix and final token.
fn split_leaf(raw: &str) -> Result<(Vec<String>, &str)> {
    match raw.rsplit_once('.') {
        Some((prefix, leaf)) => Ok((parse_path(prefix)?, leaf)),
        None => Ok((Vec::new(), raw)),
    }
}

/// Parse an attribute reference; `*` is accepted as the final token only.
pub(crate) fn parse_attr(raw: &str) -> Result<(Vec<String>, AttrSelector)> {
    let (prefix, leaf) = split_leaf(raw)?;
    if leaf == "*" {
        return Ok((prefix, AttrSelector::All));
    }
    Ok((prefix, AttrSelector::Named(check_token(leaf, raw)?)))
}

/// One directive after flattening, with its full path from the root.
#[derive(Debug, Clone)]
struct FlatOption {
    target: OptionTarget,
    path: Vec<String>,
    directive: Option<Directive>,
    label: String,
}

fn flatten(
    option: &LoaderOption,
    target: OptionTarget,
    base: &[String],
    out: &mut Vec<FlatOption>,
) -> Result<()> {
    let mut node_path = base.to_vec();
    node_path.extend(parse_path(&option.path)?);

    match &option.directive {
        None => out.push(FlatOption {
            target,
            path: node_path.clone(),
            directive: None,
            label: option.describe(),
        }),
        Some(raw) => {
            let (prefix, directive) = parse_directive(raw)?;
            let mut path = node_path.clone();
            path.extend(prefix);
            out.push(FlatOption {
                target,
                path,
                directive: Some(directive),
                label: describe_raw(raw),
            });
        }
    }

    for child in &option.children {
        if child.target != OptionTarget::Unqualified {
            return Err(Error::loader(
                LoaderErrorKind::InvalidOption,
                format!(
                    "{}: nested options cannot name their own root entity",
                    child.describe()
                ),
            ));
        }
        flatten(child, target, &node_path, out)?;
    }
    Ok(())
}

fn parse_directive(raw: &RawDirective) -> Result<(Vec<String>, Directive)> {
    match raw {
        RawDirective::Defer { attr, raiseload } => {
            let (prefix, attr) = parse_attr(attr)?;
            Ok((
                prefix,
                Directive::Defer {
                    attr,
                    raiseload: *raiseload,
                },
            ))
        }
        RawDirective::Undefer(attr) => {
            let (prefix, attr) = parse_attr(attr)?;
            Ok((prefix, Directive::Undefer(attr)))
        }
        RawDirective::UndeferGroup(group) => {
            let (prefix, leaf) = split_leaf(group)?;
            Ok((prefix, Directive::UndeferGroup(check_token(leaf, group)?)))
        }
        RawDirective::LoadOnly { attrs, raiseload } => {
            let mut shared_prefix: Option<Vec<String>> = None;
            let mut names = Vec::with_capacity(attrs.len());
            for raw_attr in attrs {
                let (prefix, attr) = parse_attr(raw_attr)?;
                let AttrSelector::Named(name) = attr else {
                    return Err(Error::loader(
                        LoaderErrorKind::InvalidPath,
                        format!("load_only({}): '*' is not allowed here", attrs.join(", ")),
                    ));
                };
                match &shared_prefix {
                    Some(p) if *p != prefix => {
                        return Err(Error::loader(
                            LoaderErrorKind::InvalidOption,
                            format!(
                                "load_only({}): all attributes must share one relationship path",
                                attrs.join(", ")
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => shared_prefix = Some(prefix),
                }
                names.push(name);
            }
            Ok((
                shared_prefix.unwrap_or_default(),
                Directive::LoadOnly {
                    attrs: names,
                    raiseload: *raiseload,
                },
            ))
        }
    }
}

fn pick_one(
    candidates: Vec<MappedEntity>,
    missing: LoaderErrorKind,
    label: &str,
    what: &str,
) -> Result<MappedEntity> {
    match candidates.as_slice() {
        [one] => Ok(*one),
        [] => Err(Error::loader(
            missing,
            format!("{label}: no entity in the statement has {what}"),
        )),
        many => Err(Error::loader(
            LoaderErrorKind::AmbiguousTarget,
            format!(
                "{label}: {what} matches several entities ({}); qualify the option with Load::of",
                many.iter().map(|e| e.table).collect::<Vec<_>>().join(", ")
            ),
        )),
    }
}

/// The primary entity a relationship path starts from.
///
/// With one primary entity that entity is the root; otherwise the root is
/// the single entity owning the path's first relationship.
pub(crate) fn root_for_path(entities: &[MappedEntity], path: &[&str], label: &str) -> Result<MappedEntity> {
    if let [only] = entities {
        return Ok(*only);
    }
    let Some(first) = path.first() else {
        return Err(Error::loader(
            LoaderErrorKind::AmbiguousTarget,
            format!("{label}: the statement selects several entities"),
        ));
    };
    let candidates = entities
        .iter()
        .filter(|e| e.relationship(first).is_some())
        .copied()
        .collect();
    pick_one(
        candidates,
        LoaderErrorKind::UnknownRelationship,
        label,
        &format!("relationship '{first}'"),
    )
}

/// Follow relationship `name` of `owner` to the related mapped entity.
pub(crate) fn follow(owner: MappedEntity, name: &str, label: &str) -> Result<MappedEntity> {
    let Some(rel) = owner.relationship(name) else {
        return Err(Error::loader(
            LoaderErrorKind::UnknownRelationship,
            format!("{label}: '{}' has no relationship '{name}'", owner.table),
        ));
    };
    let Some(target) = rel.target_entity() else {
        return Err(Error::loader(
            LoaderErrorKind::InvalidOption,
            format!(
                "{label}: '{}.{name}' does not declare its target model",
                owner.table
            ),
        ));
    };
    Ok(target)
}

fn resolve_root(entities: &[MappedEntity], flat: &FlatOption) -> Result<MappedEntity> {
    if let OptionTarget::Entity(entity) = flat.target {
        if !entities.contains(&entity) {
            return Err(Error::loader(
                LoaderErrorKind::InvalidOption,
                format!(
                    "{}: entity '{}' is not selected by the statement",
                    flat.label, entity.table
                ),
            ));
        }
        return Ok(entity);
    }

    if let [only] = entities {
        return Ok(*only);
    }
    if !flat.path.is_empty() {
        let path: Vec<&str> = flat.path.iter().map(String::as_str).collect();
        return root_for_path(entities, &path, &flat.label);
    }

    let Some(directive) = &flat.directive else {
        return Err(Error::loader(
            LoaderErrorKind::InvalidOption,
            format!("{}: empty option", flat.label),
        ));
    };
    if directive.is_wildcard_or_exclusionary() {
        return Err(Error::loader(
            LoaderErrorKind::AmbiguousTarget,
            format!(
                "{}: wildcard and exclusionary options need an explicit entity or path \
                 when the statement selects several entities ({})",
                flat.label,
                entities.iter().map(|e| e.table).collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    match directive {
        Directive::Defer {
            attr: AttrSelector::Named(name),
            ..
        }
        | Directive::Undefer(AttrSelector::Named(name)) => pick_one(
            entities
                .iter()
                .filter(|e| e.field(name).is_some())
                .copied()
                .collect(),
            LoaderErrorKind::UnknownAttribute,
            &flat.label,
            &format!("attribute '{name}'"),
        ),
        Directive::UndeferGroup(group) => pick_one(
            entities.iter().filter(|e| e.has_group(group)).copied().collect(),
            LoaderErrorKind::UnknownGroup,
            &flat.label,
            &format!("deferred group '{group}'"),
        ),
        _ => Err(Error::loader(
            LoaderErrorKind::AmbiguousTarget,
            format!("{}: cannot pick a target entity", flat.label),
        )),
    }
}

/// Directives attached at one relationship path, plus deeper paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionNode {
    directives: Vec<Directive>,
    children: BTreeMap<String, OptionNode>,
}

impl OptionNode {
    /// Directives at this path, in attachment order.
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Child node for a relationship name.
    #[must_use]
    pub fn child(&self, relationship: &str) -> Option<&OptionNode> {
        self.children.get(relationship)
    }

    /// Relationship names with options below this node.
    pub fn relationships(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    fn insert(&mut self, path: &[String], directive: Directive) {
        match path.split_first() {
            None => self.directives.push(directive),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, directive),
        }
    }
}

/// A statement's loader options, normalized per primary entity and path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionTree {
    roots: BTreeMap<&'static str, OptionNode>,
}

impl OptionTree {
    /// Normalize `options` against the statement's primary entities.
    ///
    /// Fails fast on malformed paths, unknown first-hop relationships and
    /// options whose target entity cannot be determined.
    pub fn build(entities: &[MappedEntity], options: &[LoaderOption]) -> Result<Self> {
        let mut flat = Vec::new();
        for option in options {
            flatten(option, option.target, &[], &mut flat)?;
        }

        let mut tree = OptionTree::default();
        for entry in flat {
            let root = resolve_root(entities, &entry)?;
            if let Some(first) = entry.path.first() {
                if root.relationship(first).is_none() {
                    return Err(Error::loader(
                        LoaderErrorKind::UnknownRelationship,
                        format!(
                            "{}: '{}' has no relationship '{first}'",
                            entry.label, root.table
                        ),
                    ));
                }
            }
            if let Some(directive) = entry.directive {
                tree.roots
                    .entry(root.table)
                    .or_default()
                    .insert(&entry.path, directive);
            }
        }
        Ok(tree)
    }

    /// The option subtree at `path` below `root`, if anything is attached there.
    #[must_use]
    pub fn subtree(&self, root: &str, path: &[&str]) -> Option<&OptionNode> {
        let mut node = self.roots.get(root)?;
        for segment in path {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Directives at `path` below `root`; empty means "mapper defaults".
    #[must_use]
    pub fn directives_at(&self, root: &str, path: &[&str]) -> &[Directive] {
        self.subtree(root, path).map_or(&[], OptionNode::directives)
    }

    /// True if no directive was attached anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
