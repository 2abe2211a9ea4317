//! Attribute access, writes, expiration and refresh.
//!
//! Per attribute per identity: `unloaded -> (access) -> loaded | error`.
//! `loaded` stays loaded until expired. The plan carried by the instance
//! decides what an access of an unloaded attribute fetches:
//!
//! - a deferred attribute with no group: that column alone;
//! - a grouped attribute: every unloaded, non-raise member of the group;
//! - a raise-mode attribute: nothing, the access fails with `RaiseLoad`.
//!
//! Expired attributes that the plan loads eagerly come back with whatever
//! fetch the access triggers, so one access refreshes the whole row.

use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Error, LoadedSet, LoaderErrorKind, Model, Result, Value};
use sqlmodel_query::{ResolvedMode, select_by_primary_key};

use crate::{Instance, ObjectState, Session, render_key};

fn unknown_attribute<M: Model>(attribute: &str) -> Error {
    Error::loader(
        LoaderErrorKind::UnknownAttribute,
        format!("'{}' has no attribute '{attribute}'", M::TABLE_NAME),
    )
}

impl<C: Connection> Session<C> {
    /// Read an attribute, fetching it on first access.
    ///
    /// Loaded attributes are returned without SQL. Errors:
    /// `RaiseLoad` for raise-mode attributes (no SQL is emitted),
    /// `Detached` if the instance is not attached to this session,
    /// `ObjectDeleted` if the row is gone.
    #[tracing::instrument(level = "debug", skip(self, cx, inst))]
    pub async fn load_attribute<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        inst: &mut Instance<M>,
        attribute: &str,
    ) -> Outcome<Value, Error> {
        let Some(idx) = inst.plan.index_of(attribute) else {
            return Outcome::Err(unknown_attribute::<M>(attribute));
        };
        let plan = Arc::clone(&inst.plan);
        let target = plan.attributes()[idx];

        let tracked = try_result!(self.tracked_mut(inst));
        try_result!(tracked.sync(inst));
        let pk = try_result!(tracked.model::<M>()).primary_key_value();
        if tracked.state == ObjectState::Deleted {
            return Outcome::Err(Error::ObjectDeleted {
                entity: M::TABLE_NAME,
                key: render_key(&pk),
            });
        }
        if tracked.loaded.contains(idx) {
            return Outcome::Ok(inst.model.attribute(attribute).unwrap_or(Value::Null));
        }
        if target.mode == ResolvedMode::Raise {
            tracing::debug!(
                table = M::TABLE_NAME,
                attribute = target.name,
                "Refusing to load raise-mode attribute"
            );
            return Outcome::Err(Error::RaiseLoad {
                entity: M::TABLE_NAME,
                attribute: attribute.to_string(),
            });
        }

        let mut fetch = match target.mode {
            ResolvedMode::Deferred { group: Some(group) } => plan.group_members(group),
            _ => vec![idx],
        };
        for (i, attr) in plan.attributes().iter().enumerate() {
            if attr.mode.is_eager() && !fetch.contains(&i) {
                fetch.push(i);
            }
        }
        fetch.retain(|i| !tracked.loaded.contains(*i));
        fetch.sort_unstable();

        let columns: Vec<&str> = fetch.iter().map(|&i| plan.attributes()[i].column).collect();
        let (sql, params) = select_by_primary_key(self.config.dialect, plan.entity(), &columns, &pk);

        tracing::info!(
            model = std::any::type_name::<M>(),
            table = M::TABLE_NAME,
            attribute = target.name,
            columns = ?columns,
            "Lazy loading deferred attributes"
        );

        let rows = try_outcome!(self.run_query(cx, &sql, &params).await);

        let tracked = try_result!(self.tracked_mut(inst));
        let Some(row) = rows.first() else {
            tracked.state = ObjectState::Deleted;
            return Outcome::Err(Error::ObjectDeleted {
                entity: M::TABLE_NAME,
                key: render_key(&pk),
            });
        };
        let model = try_result!(tracked.model_mut::<M>());
        for &i in &fetch {
            let attr = plan.attributes()[i];
            let value = row.get_named(attr.column).cloned().unwrap_or(Value::Null);
            try_result!(model.set_attribute(attr.name, value));
        }
        for &i in &fetch {
            tracked.loaded.insert(i);
        }
        if tracked.state == ObjectState::Expired {
            tracked.state = ObjectState::Persistent;
        }
        try_result!(tracked.sync(inst));

        if let ResolvedMode::Deferred { group } = target.mode {
            self.lazy_loads.record_load(M::TABLE_NAME, target.name, group);
        }

        Outcome::Ok(inst.model.attribute(attribute).unwrap_or(Value::Null))
    }

    /// Write an attribute through the session; it counts as loaded and is
    /// never fetched afterwards.
    pub fn set_attribute<M: Model + Clone + 'static>(
        &mut self,
        inst: &mut Instance<M>,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let Some(idx) = inst.plan.index_of(attribute) else {
            return Err(unknown_attribute::<M>(attribute));
        };
        if inst.plan.attributes()[idx].primary_key {
            return Err(Error::Custom(format!(
                "'{}.{attribute}' is part of the primary key and cannot be reassigned",
                M::TABLE_NAME
            )));
        }
        let tracked = self.tracked_mut(inst)?;
        tracked.model_mut::<M>()?.set_attribute(attribute, value.into())?;
        tracked.loaded.insert(idx);
        tracked.sync(inst)
    }

    /// True if the attribute is currently loaded in the identity map.
    pub fn is_loaded<M: Model + 'static>(&self, inst: &Instance<M>, attribute: &str) -> bool {
        let Some(idx) = inst.plan.index_of(attribute) else {
            return false;
        };
        self.identity_map
            .get(&inst.key)
            .filter(|t| t.handle == inst.handle)
            .is_some_and(|t| t.loaded.contains(idx))
    }

    /// Return attributes to the unloaded state. An empty list expires every
    /// non-key attribute. Primary key attributes are never expired.
    #[tracing::instrument(level = "debug", skip(self, inst))]
    pub fn expire<M: Model + Clone + 'static>(
        &mut self,
        inst: &mut Instance<M>,
        attributes: &[&str],
    ) -> Result<()> {
        let indexes = attributes
            .iter()
            .map(|name| {
                inst.plan
                    .index_of(name)
                    .ok_or_else(|| unknown_attribute::<M>(name))
            })
            .collect::<Result<Vec<_>>>()?;
        self.remember_primary_key::<M>();
        let pk = self
            .primary_keys
            .get(M::TABLE_NAME)
            .cloned()
            .unwrap_or_default();

        let tracked = self.tracked_mut(inst)?;
        if indexes.is_empty() {
            tracked.expire_all(&pk);
        } else {
            for idx in indexes {
                if !pk.contains(&idx) {
                    tracked.loaded.remove(idx);
                }
            }
            tracked.version += 1;
            if tracked.state == ObjectState::Persistent {
                tracked.state = ObjectState::Expired;
            }
        }
        tracing::debug!(
            table = M::TABLE_NAME,
            attributes = ?attributes,
            "Expired attributes"
        );
        tracked.sync(inst)
    }

    /// Expire every tracked identity. Handles taken earlier see the change
    /// through the session on their next access.
    pub fn expire_all(&mut self) {
        let mut expired = 0usize;
        for tracked in self.identity_map.values_mut() {
            if tracked.state == ObjectState::Detached {
                continue;
            }
            let pk = self
                .primary_keys
                .get(tracked.table_name)
                .map_or(&[][..], Vec::as_slice);
            tracked.expire_all(pk);
            expired += 1;
        }
        tracing::info!(expired, "Expired all tracked objects");
    }

    /// Reload the instance's eager attributes now. Deferred attributes that
    /// were loaded become unloaded again.
    #[tracing::instrument(level = "debug", skip(self, cx, inst))]
    pub async fn refresh<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        inst: &mut Instance<M>,
    ) -> Outcome<(), Error> {
        let plan = Arc::clone(&inst.plan);
        let tracked = try_result!(self.tracked_mut(inst));
        let pk = try_result!(tracked.model::<M>()).primary_key_value();

        let eager: Vec<usize> = plan
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, a)| a.mode.is_eager())
            .map(|(i, _)| i)
            .collect();
        let columns: Vec<&str> = eager.iter().map(|&i| plan.attributes()[i].column).collect();
        let (sql, params) = select_by_primary_key(self.config.dialect, plan.entity(), &columns, &pk);

        tracing::info!(
            model = std::any::type_name::<M>(),
            table = M::TABLE_NAME,
            "Refreshing object"
        );

        let rows = try_outcome!(self.run_query(cx, &sql, &params).await);

        let tracked = try_result!(self.tracked_mut(inst));
        let Some(row) = rows.first() else {
            tracked.state = ObjectState::Deleted;
            return Outcome::Err(Error::ObjectDeleted {
                entity: M::TABLE_NAME,
                key: render_key(&pk),
            });
        };
        let model = try_result!(tracked.model_mut::<M>());
        let mut loaded = LoadedSet::empty(plan.attributes().len());
        for &i in &eager {
            let attr = plan.attributes()[i];
            let value = row.get_named(attr.column).cloned().unwrap_or(Value::Null);
            try_result!(model.set_attribute(attr.name, value));
            loaded.insert(i);
        }
        tracked.loaded = loaded;
        tracked.version += 1;
        tracked.state = ObjectState::Persistent;
        try_result!(tracked.sync(inst));
        Outcome::Ok(())
    }
}
