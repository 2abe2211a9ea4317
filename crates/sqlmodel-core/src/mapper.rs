//! Mapped entity metadata.
//!
//! `MappedEntity` is the runtime view of a `Model` type's static metadata:
//! its attributes with their load policies, its primary key and its
//! relationships. It is built from `'static` tables, so it is `Copy` and
//! never changes after the model is declared.
//!
//! Configuration is checked once per entity type and the outcome cached for
//! the lifetime of the process.

use std::collections::HashSet;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::load::LoadMode;
use crate::model::Model;
use crate::relationship::{RelationshipInfo, find_relationship};

/// Runtime view of a mapped model.
#[derive(Debug, Clone, Copy)]
pub struct MappedEntity {
    /// Table name, also used as the entity's name in loader options.
    pub table: &'static str,
    /// Rust type name, for diagnostics.
    pub type_name: &'static str,
    /// Field metadata in declaration order.
    pub fields: &'static [FieldInfo],
    /// Primary key attribute names.
    pub primary_key: &'static [&'static str],
    /// Relationships.
    pub relationships: &'static [RelationshipInfo],
}

impl PartialEq for MappedEntity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.table == other.table
    }
}

impl Eq for MappedEntity {}

impl MappedEntity {
    /// The mapped entity for a model type.
    #[must_use]
    pub fn of<M: Model>() -> Self {
        Self {
            table: M::TABLE_NAME,
            type_name: std::any::type_name::<M>(),
            fields: M::fields(),
            primary_key: M::PRIMARY_KEY,
            relationships: M::relationships(),
        }
    }

    /// Field metadata by attribute name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of an attribute in `fields`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// True if the attribute is part of the primary key.
    #[must_use]
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.contains(&name)
    }

    /// True if any attribute belongs to the named deferred group.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.fields.iter().any(|f| f.load.group() == Some(group))
    }

    /// Relationship by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&'static RelationshipInfo> {
        find_relationship(self.relationships, name)
    }

    /// Check the mapping for internal consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in self.fields {
            if !seen.insert(field.name) {
                return Err(Error::mapping(format!(
                    "{}: attribute '{}' is mapped twice",
                    self.table, field.name
                )));
            }
            if let LoadMode::DeferredGroup(group) = field.load {
                if group.is_empty() {
                    return Err(Error::mapping(format!(
                        "{}.{}: deferred group name must not be empty",
                        self.table, field.name
                    )));
                }
            }
        }

        if self.primary_key.is_empty() {
            return Err(Error::mapping(format!(
                "{}: mapped entity has no primary key",
                self.table
            )));
        }
        for pk in self.primary_key {
            let Some(field) = self.field(pk) else {
                return Err(Error::mapping(format!(
                    "{}: primary key attribute '{pk}' is not a mapped field",
                    self.table
                )));
            };
            if field.load != LoadMode::Eager {
                return Err(Error::mapping(format!(
                    "{}.{pk}: primary key attributes cannot be deferred",
                    self.table
                )));
            }
        }

        for rel in self.relationships {
            if rel.keyed_on_parent() {
                let Some(key) = rel.local_key else {
                    return Err(Error::mapping(format!(
                        "{}.{}: relationship needs a local key",
                        self.table, rel.name
                    )));
                };
                if self.field(key).is_none() {
                    return Err(Error::mapping(format!(
                        "{}.{}: local key '{key}' is not a mapped field",
                        self.table, rel.name
                    )));
                }
            } else if rel.remote_key.is_none() {
                return Err(Error::mapping(format!(
                    "{}.{}: relationship needs a remote key",
                    self.table, rel.name
                )));
            }
        }
        Ok(())
    }

    /// Validate once and cache the result.
    ///
    /// Successful configurations are remembered process-wide; a failing
    /// mapping is re-checked (and fails again) on every call.
    pub fn configure(&self) -> Result<()> {
        let registry = configured_registry();
        {
            let done = registry.read().unwrap_or_else(PoisonError::into_inner);
            if done.contains(self.type_name) {
                return Ok(());
            }
        }

        self.validate()?;
        tracing::debug!(
            entity = self.table,
            model = self.type_name,
            attributes = self.fields.len(),
            deferred = self.fields.iter().filter(|f| f.load.is_deferred()).count(),
            "Configured mapper"
        );
        registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.type_name);
        Ok(())
    }
}

fn configured_registry() -> &'static RwLock<HashSet<&'static str>> {
    static REGISTRY: OnceLock<RwLock<HashSet<&'static str>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashSet::new()))
}
