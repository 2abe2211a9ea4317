//! Merging mapper defaults with loader directives into a load plan.
//!
//! [`StrategyMerger`] starts from an entity's [`AttributeLoadPolicy`]
//! defaults and applies the directives attached at one option path in
//! order, so a later directive overrides an earlier one for the same
//! attribute. The result is a [`ResolvedLoadPlan`]: an immutable
//! attribute-to-mode table shared (via `Arc`) by every instance the
//! statement materializes.
//!
//! [`AttributeLoadPolicy`]: sqlmodel_core::AttributeLoadPolicy

use serde::Serialize;
use sqlmodel_core::{Error, LoadMode, LoaderErrorKind, MappedEntity, Result};

use crate::options::{AttrSelector, Directive};

/// Final load mode of one attribute for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ResolvedMode {
    /// Selected with the row.
    Eager,
    /// Fetched on first access; a group fetches all its unloaded members.
    Deferred {
        /// Mapper group, if any.
        group: Option<&'static str>,
    },
    /// Access is an error.
    Raise,
}

impl ResolvedMode {
    fn from_default(mode: LoadMode) -> Self {
        match mode {
            LoadMode::Eager => ResolvedMode::Eager,
            LoadMode::Deferred => ResolvedMode::Deferred { group: None },
            LoadMode::DeferredGroup(g) => ResolvedMode::Deferred { group: Some(g) },
            LoadMode::RaiseOnAccess => ResolvedMode::Raise,
        }
    }

    /// True for `Eager`.
    #[must_use]
    pub const fn is_eager(self) -> bool {
        matches!(self, ResolvedMode::Eager)
    }
}

/// One row of a load plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAttribute {
    /// Attribute name.
    pub name: &'static str,
    /// Column name.
    pub column: &'static str,
    /// Resolved mode.
    #[serde(flatten)]
    pub mode: ResolvedMode,
    /// Primary key attributes are always eager.
    pub primary_key: bool,
}

/// The load plan of one entity at one option path of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLoadPlan {
    #[serde(rename = "entity", serialize_with = "serialize_table")]
    mapped: MappedEntity,
    attributes: Vec<ResolvedAttribute>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_table<S: serde::Serializer>(
    entity: &MappedEntity,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(entity.table)
}

impl ResolvedLoadPlan {
    /// Plan with no overrides: every attribute at its mapper default.
    #[must_use]
    pub fn defaults(entity: MappedEntity) -> Self {
        StrategyMerger::new(entity).finish()
    }

    /// Entity the plan belongs to.
    #[must_use]
    pub fn entity(&self) -> MappedEntity {
        self.mapped
    }

    /// Attributes in field order.
    #[must_use]
    pub fn attributes(&self) -> &[ResolvedAttribute] {
        &self.attributes
    }

    /// Position of an attribute, matching `MappedEntity::field_index`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Plan entry by attribute name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ResolvedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Resolved mode by attribute name.
    #[must_use]
    pub fn mode(&self, name: &str) -> Option<ResolvedMode> {
        self.attribute(name).map(|a| a.mode)
    }

    /// True if the attribute is loaded with the row.
    #[must_use]
    pub fn is_eager(&self, name: &str) -> bool {
        self.mode(name).is_some_and(ResolvedMode::is_eager)
    }

    /// Eager attributes in field order.
    pub fn eager_attributes(&self) -> impl Iterator<Item = &ResolvedAttribute> + '_ {
        self.attributes.iter().filter(|a| a.mode.is_eager())
    }

    /// Columns selected with the row.
    #[must_use]
    pub fn eager_columns(&self) -> Vec<&'static str> {
        self.eager_attributes().map(|a| a.column).collect()
    }

    /// Indexes of attributes deferred under `group` by this plan.
    #[must_use]
    pub fn group_members(&self, group: &str) -> Vec<usize> {
        self.attributes
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a.mode, ResolvedMode::Deferred { group: Some(g) } if g == group))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Applies directives to one entity's defaults.
#[derive(Debug, Clone)]
pub struct StrategyMerger {
    entity: MappedEntity,
    modes: Vec<ResolvedMode>,
}

impl StrategyMerger {
    /// Start from the entity's mapper defaults.
    #[must_use]
    pub fn new(entity: MappedEntity) -> Self {
        let modes = entity
            .fields
            .iter()
            .map(|f| {
                if entity.is_primary_key(f.name) {
                    ResolvedMode::Eager
                } else {
                    ResolvedMode::from_default(f.load)
                }
            })
            .collect();
        Self { entity, modes }
    }

    /// Merge `directives` (in attachment order) over `entity`'s defaults.
    pub fn merge(entity: MappedEntity, directives: &[Directive]) -> Result<ResolvedLoadPlan> {
        let mut merger = Self::new(entity);
        for directive in directives {
            merger.apply(directive)?;
        }
        Ok(merger.finish())
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.entity.field_index(name).ok_or_else(|| {
            Error::loader(
                LoaderErrorKind::UnknownAttribute,
                format!("'{}' has no attribute '{name}'", self.entity.table),
            )
        })
    }

    fn deferred(&self, idx: usize, raiseload: bool) -> ResolvedMode {
        if raiseload {
            ResolvedMode::Raise
        } else {
            ResolvedMode::Deferred {
                group: self.entity.fields[idx].load.group(),
            }
        }
    }

    fn defer_all(&mut self, raiseload: bool) {
        for idx in 0..self.modes.len() {
            if !self.entity.is_primary_key(self.entity.fields[idx].name) {
                self.modes[idx] = self.deferred(idx, raiseload);
            }
        }
    }

    fn defer_one(&mut self, name: &str, raiseload: bool) -> Result<()> {
        let idx = self.index(name)?;
        if self.entity.is_primary_key(name) {
            tracing::debug!(
                entity = self.entity.table,
                attribute = name,
                "Ignoring defer of primary key attribute"
            );
            return Ok(());
        }
        self.modes[idx] = self.deferred(idx, raiseload);
        Ok(())
    }

    /// Apply one directive.
    pub fn apply(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::Defer {
                attr: AttrSelector::All,
                raiseload,
            } => self.defer_all(*raiseload),
            Directive::Defer {
                attr: AttrSelector::Named(name),
                raiseload,
            } => self.defer_one(name, *raiseload)?,
            Directive::Undefer(AttrSelector::All) => {
                self.modes.fill(ResolvedMode::Eager);
            }
            Directive::Undefer(AttrSelector::Named(name)) => {
                let idx = self.index(name)?;
                self.modes[idx] = ResolvedMode::Eager;
            }
            Directive::UndeferGroup(group) => {
                if !self.entity.has_group(group) {
                    return Err(Error::loader(
                        LoaderErrorKind::UnknownGroup,
                        format!("'{}' has no deferred group '{group}'", self.entity.table),
                    ));
                }
                for (idx, field) in self.entity.fields.iter().enumerate() {
                    if field.load.group() == Some(group.as_str()) {
                        self.modes[idx] = ResolvedMode::Eager;
                    }
                }
            }
            Directive::LoadOnly { attrs, raiseload } => {
                let keep = attrs
                    .iter()
                    .map(|name| self.index(name))
                    .collect::<Result<Vec<_>>>()?;
                self.defer_all(*raiseload);
                for idx in keep {
                    self.modes[idx] = ResolvedMode::Eager;
                }
            }
        }
        Ok(())
    }

    /// Freeze the merged modes into a plan.
    #[must_use]
    pub fn finish(self) -> ResolvedLoadPlan {
        let attributes = self
            .entity
            .fields
            .iter()
            .zip(self.modes)
            .map(|(field, mode)| ResolvedAttribute {
                name: field.name,
                column: field.column_name,
                mode,
                primary_key: self.entity.is_primary_key(field.name),
            })
            .collect();
        ResolvedLoadPlan {
            mapped: self.entity,
            attributes,
        }
    }
}
