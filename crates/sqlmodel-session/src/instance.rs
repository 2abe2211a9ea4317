//! Handles to materialized instances.

use std::sync::Arc;

use sqlmodel_core::{Error, LoadedSet, LoaderErrorKind, Model, Result, Value};
use sqlmodel_query::{ResolvedLoadPlan, ResolvedMode};

use crate::ObjectKey;

/// A model instance materialized by a [`Session`](crate::Session).
///
/// The handle carries a snapshot of the identity-map entry it was produced
/// from, together with the load plan of the statement that produced it. The
/// plan decides what a read of an unloaded attribute does: fetch it alone,
/// fetch its whole deferred group, or raise.
///
/// Snapshot values of unloaded attributes are placeholders and are never
/// returned by [`Instance::get`]. Session operations that take the handle
/// (`load_attribute`, `set_attribute`, `expire`, `refresh`) refresh the
/// snapshot from the identity map.
#[derive(Debug, Clone)]
pub struct Instance<M: Model> {
    pub(crate) model: M,
    pub(crate) key: ObjectKey,
    pub(crate) handle: u64,
    pub(crate) plan: Arc<ResolvedLoadPlan>,
    pub(crate) loaded: LoadedSet,
    pub(crate) version: u64,
}

impl<M: Model> Instance<M> {
    /// The model snapshot.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Identity-map key.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    /// The load plan of the statement that produced this handle.
    #[must_use]
    pub fn plan(&self) -> &Arc<ResolvedLoadPlan> {
        &self.plan
    }

    /// Primary key values.
    #[must_use]
    pub fn primary_key(&self) -> Vec<Value> {
        self.model.primary_key_value()
    }

    /// Number of expirations the identity had seen when the snapshot was taken.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the attribute was loaded when the snapshot was taken.
    #[must_use]
    pub fn is_loaded(&self, attribute: &str) -> bool {
        self.plan
            .index_of(attribute)
            .is_some_and(|idx| self.loaded.contains(idx))
    }

    /// Loaded attributes, in field order.
    #[must_use]
    pub fn loaded_attributes(&self) -> Vec<&'static str> {
        self.loaded
            .iter()
            .filter_map(|idx| self.plan.attributes().get(idx).map(|a| a.name))
            .collect()
    }

    /// Attributes not yet loaded, in field order.
    #[must_use]
    pub fn unloaded_attributes(&self) -> Vec<&'static str> {
        self.plan
            .attributes()
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.loaded.contains(*idx))
            .map(|(_, a)| a.name)
            .collect()
    }

    /// Read an attribute without touching the database.
    ///
    /// Returns `Ok(None)` for an unloaded attribute that would be fetched on
    /// access, and `Error::RaiseLoad` for one the plan marks raise-on-access.
    pub fn get(&self, attribute: &str) -> Result<Option<Value>> {
        let Some(idx) = self.plan.index_of(attribute) else {
            return Err(Error::loader(
                LoaderErrorKind::UnknownAttribute,
                format!("'{}' has no attribute '{attribute}'", M::TABLE_NAME),
            ));
        };
        if self.loaded.contains(idx) {
            return Ok(Some(self.model.attribute(attribute).unwrap_or(Value::Null)));
        }
        if self.plan.attributes()[idx].mode == ResolvedMode::Raise {
            return Err(Error::RaiseLoad {
                entity: M::TABLE_NAME,
                attribute: attribute.to_string(),
            });
        }
        Ok(None)
    }
}
