//! Statement execution and row materialization.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Error, LoadedSet, MappedEntity, Model, Result, Row, Value};
use sqlmodel_query::{CompiledSelect, Expr, LoaderOption, ResolvedLoadPlan, Select, select_related};

use crate::{Instance, ObjectKey, ObjectState, Session, TrackedObject};

fn plan_of<M: Model>(compiled: &CompiledSelect) -> Result<Arc<ResolvedLoadPlan>> {
    compiled
        .plan_for(MappedEntity::of::<M>())
        .cloned()
        .ok_or_else(|| {
            Error::Custom(format!(
                "statement does not select '{}'",
                M::TABLE_NAME
            ))
        })
}

fn column_of<M: Model>(attribute: &str) -> Result<&'static str> {
    M::fields()
        .iter()
        .find(|f| f.name == attribute)
        .map(|f| f.column_name)
        .ok_or_else(|| {
            Error::mapping(format!(
                "'{}' has no attribute '{attribute}'",
                M::TABLE_NAME
            ))
        })
}

fn instance_from<M: Model + Clone + 'static>(
    tracked: &TrackedObject,
    key: ObjectKey,
    plan: &Arc<ResolvedLoadPlan>,
) -> Result<Instance<M>> {
    Ok(Instance {
        model: tracked.model::<M>()?.clone(),
        key,
        handle: tracked.handle,
        plan: Arc::clone(plan),
        loaded: tracked.loaded.clone(),
        version: tracked.version,
    })
}

impl<C: Connection> Session<C> {
    /// Compile a statement for this session's dialect.
    pub fn compile(&self, stmt: &Select) -> Result<CompiledSelect> {
        stmt.compile(self.config.dialect)
    }

    async fn fetch(&mut self, cx: &Cx, compiled: &CompiledSelect) -> Outcome<Vec<Row>, Error> {
        if self.config.auto_begin && !self.in_transaction {
            try_outcome!(self.begin(cx).await);
        }
        compiled.fetch_rows(cx, &self.connection).await
    }

    /// Merge one row into the identity map.
    ///
    /// A tracked identity keeps its loaded values; attributes it has not
    /// loaded are filled from the row. Untracked, detached or deleted
    /// identities get a fresh entry.
    fn merge_row<M: Model + Clone + 'static>(
        &mut self,
        row: &Row,
        plan: &Arc<ResolvedLoadPlan>,
    ) -> Result<Instance<M>> {
        self.remember_primary_key::<M>();
        let model = M::from_row(row)?;
        let key = ObjectKey::from_model(&model);

        let mut row_loaded = LoadedSet::empty(M::fields().len());
        for (idx, field) in M::fields().iter().enumerate() {
            if row.contains(field.column_name) {
                row_loaded.insert(idx);
            }
        }

        let tracked = match self.identity_map.entry(key) {
            Entry::Occupied(entry)
                if matches!(
                    entry.get().state,
                    ObjectState::Persistent | ObjectState::Expired
                ) =>
            {
                let tracked = entry.into_mut();
                let fill: Vec<usize> = row_loaded
                    .iter()
                    .filter(|idx| !tracked.loaded.contains(*idx))
                    .collect();
                let existing = tracked.model_mut::<M>()?;
                for &idx in &fill {
                    let field = &M::fields()[idx];
                    let value = row.get_named(field.column_name).cloned().unwrap_or(Value::Null);
                    existing.set_attribute(field.name, value)?;
                }
                for idx in fill {
                    tracked.loaded.insert(idx);
                }
                tracked.state = ObjectState::Persistent;
                tracked
            }
            Entry::Occupied(mut entry) => {
                entry.insert(TrackedObject::new(model, row_loaded));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(TrackedObject::new(model, row_loaded)),
        };
        instance_from(tracked, key, plan)
    }

    /// Execute a single-entity statement and return one handle per row.
    #[tracing::instrument(level = "debug", skip(self, cx, stmt))]
    pub async fn all<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        stmt: &Select,
    ) -> Outcome<Vec<Instance<M>>, Error> {
        let compiled = try_result!(self.compile(stmt));
        if compiled.is_multi_entity() {
            return Outcome::Err(Error::Custom(format!(
                "statement selects {} entities; use all_pairs",
                compiled.entities().len()
            )));
        }
        let plan = try_result!(plan_of::<M>(&compiled));
        let rows = try_outcome!(self.fetch(cx, &compiled).await);

        tracing::info!(
            model = std::any::type_name::<M>(),
            table = M::TABLE_NAME,
            rows = rows.len(),
            eager = ?plan.eager_columns(),
            "Loaded objects"
        );

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(try_result!(self.merge_row::<M>(row, &plan)));
        }
        Outcome::Ok(out)
    }

    /// Execute the statement with `LIMIT 1` and return the first handle.
    pub async fn first<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        stmt: &Select,
    ) -> Outcome<Option<Instance<M>>, Error> {
        let limited = stmt.clone().limit(1);
        let found = try_outcome!(self.all::<M>(cx, &limited).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// Execute a two-entity statement (`Select::new::<A>().add_entity::<B>()`).
    #[tracing::instrument(level = "debug", skip(self, cx, stmt))]
    pub async fn all_pairs<A, B>(
        &mut self,
        cx: &Cx,
        stmt: &Select,
    ) -> Outcome<Vec<(Instance<A>, Instance<B>)>, Error>
    where
        A: Model + Clone + 'static,
        B: Model + Clone + 'static,
    {
        let compiled = try_result!(self.compile(stmt));
        let expected = [MappedEntity::of::<A>(), MappedEntity::of::<B>()];
        if compiled.entities() != expected {
            return Outcome::Err(Error::Custom(format!(
                "statement does not select exactly ('{}', '{}')",
                A::TABLE_NAME,
                B::TABLE_NAME
            )));
        }
        let plan_a = try_result!(plan_of::<A>(&compiled));
        let plan_b = try_result!(plan_of::<B>(&compiled));
        let rows = try_outcome!(self.fetch(cx, &compiled).await);

        let prefix_a = format!("{}__", A::TABLE_NAME);
        let prefix_b = format!("{}__", B::TABLE_NAME);
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let a = try_result!(self.merge_row::<A>(&row.strip_prefix(&prefix_a), &plan_a));
            let b = try_result!(self.merge_row::<B>(&row.strip_prefix(&prefix_b), &plan_b));
            out.push((a, b));
        }
        tracing::info!(
            left = A::TABLE_NAME,
            right = B::TABLE_NAME,
            rows = out.len(),
            "Loaded object pairs"
        );
        Outcome::Ok(out)
    }

    /// Get an object by (single-column) primary key.
    ///
    /// An identity already in the map is returned without SQL, with a plan
    /// resolved from `options`.
    pub async fn get<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        pk: impl Into<Value>,
        options: impl IntoIterator<Item = LoaderOption>,
    ) -> Outcome<Option<Instance<M>>, Error> {
        self.get_by_key::<M>(cx, vec![pk.into()], options).await
    }

    /// Get an object by its full primary key.
    #[tracing::instrument(level = "debug", skip(self, cx, pk, options))]
    pub async fn get_by_key<M: Model + Clone + 'static>(
        &mut self,
        cx: &Cx,
        pk: Vec<Value>,
        options: impl IntoIterator<Item = LoaderOption>,
    ) -> Outcome<Option<Instance<M>>, Error> {
        if pk.len() != M::PRIMARY_KEY.len() {
            return Outcome::Err(Error::Custom(format!(
                "'{}' has a {}-column primary key, got {} values",
                M::TABLE_NAME,
                M::PRIMARY_KEY.len(),
                pk.len()
            )));
        }
        let mut stmt = Select::new::<M>().options(options);
        for (attr, value) in M::PRIMARY_KEY.iter().zip(&pk) {
            let column = try_result!(column_of::<M>(attr));
            stmt = stmt.filter(Expr::col(column).eq(value.clone()));
        }
        let compiled = try_result!(self.compile(&stmt));
        let plan = try_result!(plan_of::<M>(&compiled));

        let key = ObjectKey::from_pk::<M>(&pk);
        if let Some(tracked) = self.identity_map.get(&key) {
            if matches!(tracked.state, ObjectState::Persistent | ObjectState::Expired) {
                tracing::debug!(
                    model = std::any::type_name::<M>(),
                    table = M::TABLE_NAME,
                    "Identity map hit"
                );
                return Outcome::Ok(Some(try_result!(instance_from(tracked, key, &plan))));
            }
        }

        let rows = try_outcome!(self.fetch(cx, &compiled).await);
        match rows.first() {
            Some(row) => Outcome::Ok(Some(try_result!(self.merge_row::<M>(row, &plan)))),
            None => Outcome::Ok(None),
        }
    }

    /// Load the entities related to `parents` through `path` in one query.
    ///
    /// The related entities are loaded with the plan `stmt`'s options attach
    /// at `path` (mapper defaults when nothing is attached). `path` ends in a
    /// relationship of `P` whose target is `R`; it is `"author"` for
    /// parents selected by `stmt` and e.g. `"author.publisher"` for authors
    /// loaded through `"author"`.
    #[tracing::instrument(level = "debug", skip(self, cx, stmt, parents))]
    pub async fn load_related<P, R>(
        &mut self,
        cx: &Cx,
        stmt: &Select,
        parents: &[Instance<P>],
        path: &str,
    ) -> Outcome<Vec<Instance<R>>, Error>
    where
        P: Model + Clone + 'static,
        R: Model + Clone + 'static,
    {
        let compiled = try_result!(self.compile(stmt));
        let related = try_result!(compiled.plan_at(
            path,
            MappedEntity::of::<P>(),
            MappedEntity::of::<R>()
        ));
        let rel = related.relationship;

        let (parent_attr, remote_attr) = if rel.keyed_on_parent() {
            (rel.local_key, rel.remote_key.or_else(|| R::PRIMARY_KEY.first().copied()))
        } else {
            (P::PRIMARY_KEY.first().copied(), rel.remote_key)
        };
        let (Some(parent_attr), Some(remote_attr)) = (parent_attr, remote_attr) else {
            return Outcome::Err(Error::mapping(format!(
                "'{}.{}' has no usable join keys",
                P::TABLE_NAME,
                rel.name
            )));
        };
        let remote_column = try_result!(column_of::<R>(remote_attr));
        let Some(parent_idx) = P::fields().iter().position(|f| f.name == parent_attr) else {
            return Outcome::Err(Error::mapping(format!(
                "'{}' has no attribute '{parent_attr}'",
                P::TABLE_NAME
            )));
        };

        let mut keys: Vec<Value> = Vec::new();
        for parent in parents {
            let tracked = match self.identity_map.get(&parent.key) {
                Some(t) if t.handle == parent.handle && t.state != ObjectState::Detached => t,
                _ => {
                    return Outcome::Err(Error::Detached {
                        entity: P::TABLE_NAME,
                    });
                }
            };
            if !tracked.loaded.contains(parent_idx) {
                return Outcome::Err(Error::Custom(format!(
                    "'{}.{parent_attr}' is not loaded; undefer it to load '{path}'",
                    P::TABLE_NAME
                )));
            }
            let value = try_result!(tracked.model::<P>())
                .attribute(parent_attr)
                .unwrap_or(Value::Null);
            if !value.is_null() && !keys.contains(&value) {
                keys.push(value);
            }
        }
        if keys.is_empty() {
            return Outcome::Ok(Vec::new());
        }

        let (sql, params) = select_related(self.config.dialect, &related.plan, remote_column, keys);
        let rows = try_outcome!(self.run_query(cx, &sql, &params).await);

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(try_result!(self.merge_row::<R>(row, &related.plan)));
        }
        tracing::info!(
            parent = P::TABLE_NAME,
            relationship = rel.name,
            parents = parents.len(),
            loaded = out.len(),
            "Loaded related objects"
        );
        Outcome::Ok(out)
    }
}
