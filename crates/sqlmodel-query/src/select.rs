//! SELECT statements with loader options.
//!
//! Compiling a [`Select`] resolves its options once and yields a
//! [`CompiledSelect`]: SQL that names only the eager columns of each primary
//! entity, plus the per-entity [`ResolvedLoadPlan`]s the session hands to
//! every instance it materializes.

use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlmodel_core::{
    Connection, Error, LoaderErrorKind, MappedEntity, Model, RelationshipInfo, Result, Row, Value,
};

use crate::expr::{Dialect, Expr};
use crate::options::LoaderOption;
use crate::path::{OptionNode, OptionTree, follow, parse_path, root_for_path};
use crate::strategy::{ResolvedLoadPlan, StrategyMerger};

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderBy {
    column: String,
    descending: bool,
}

/// A SELECT over one or more mapped entities.
///
/// # Example
///
/// ```ignore
/// let stmt = Select::new::<Book>()
///     .options([load_only(["title"]), defer("author.bio")])
///     .filter(Expr::col("year").ge(1960))
///     .limit(10)
///     .compile(Dialect::Postgres)?;
/// ```
#[derive(Debug, Clone)]
pub struct Select {
    entities: Vec<MappedEntity>,
    options: Vec<LoaderOption>,
    filter: Option<Expr>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
}

impl Select {
    /// Select instances of `M`.
    #[must_use]
    pub fn new<M: Model>() -> Self {
        Self::from_entity(MappedEntity::of::<M>())
    }

    /// Select instances of an already-resolved entity.
    #[must_use]
    pub fn from_entity(entity: MappedEntity) -> Self {
        Self {
            entities: vec![entity],
            options: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Add another primary entity; rows then carry one instance of each.
    #[must_use]
    pub fn add_entity<M: Model>(mut self) -> Self {
        let entity = MappedEntity::of::<M>();
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        self
    }

    /// Attach loader options, after any already attached.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = LoaderOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Add a WHERE condition, ANDed with any existing one.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Order by a column, ascending.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            descending: false,
        });
        self
    }

    /// Order by a column, descending.
    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// Limit the number of rows.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Primary entities, in statement order.
    #[must_use]
    pub fn entities(&self) -> &[MappedEntity] {
        &self.entities
    }

    /// Resolve options and render SQL.
    ///
    /// Fails if any entity's mapping is invalid or any option cannot be
    /// resolved; nothing is sent to the database in either case.
    pub fn compile(&self, dialect: Dialect) -> Result<CompiledSelect> {
        for entity in &self.entities {
            entity.configure()?;
        }
        let tree = OptionTree::build(&self.entities, &self.options)?;
        for entity in &self.entities {
            if let Some(node) = tree.subtree(entity.table, &[]) {
                check_paths(*entity, node, "")?;
            }
        }

        let plans = self
            .entities
            .iter()
            .map(|entity| {
                StrategyMerger::merge(*entity, tree.directives_at(entity.table, &[])).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let labelled = self.entities.len() > 1;
        let mut columns = Vec::new();
        for plan in &plans {
            let table = plan.entity().table;
            for column in plan.eager_columns() {
                if labelled {
                    columns.push(format!(
                        "{} AS {}",
                        dialect.column_ref(Some(table), column),
                        dialect.quote_ident(&format!("{table}__{column}"))
                    ));
                } else {
                    columns.push(dialect.quote_ident(column));
                }
            }
        }

        let tables: Vec<&str> = self.entities.iter().map(|e| e.table).collect();
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), tables.join(", "));
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build(dialect, &mut params));
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    let col = match Expr::col(o.column.as_str()) {
                        Expr::Column { table, name } => dialect.column_ref(table.as_deref(), &name),
                        _ => dialect.quote_ident(&o.column),
                    };
                    if o.descending {
                        format!("{col} DESC")
                    } else {
                        col
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        tracing::debug!(
            entities = ?tables,
            options = self.options.len(),
            sql = %sql,
            "Compiled select"
        );

        Ok(CompiledSelect {
            sql,
            params,
            dialect,
            entities: self.entities.clone(),
            plans,
            options: Arc::new(tree),
        })
    }
}

/// Merge the directives attached at every relationship path below `owner`,
/// so unknown names there fail at compile time like root-level ones.
fn check_paths(owner: MappedEntity, node: &OptionNode, prefix: &str) -> Result<()> {
    for name in node.relationships() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let target = follow(owner, name, &format!("path '{path}'"))?;
        let Some(child) = node.child(name) else {
            continue;
        };
        target.configure()?;
        StrategyMerger::merge(target, child.directives())?;
        check_paths(target, child, &path)?;
    }
    Ok(())
}

/// The plan for entities reached through a relationship path.
#[derive(Debug, Clone)]
pub struct PathPlan {
    /// Primary entity the path starts from.
    pub root: MappedEntity,
    /// Final relationship of the path.
    pub relationship: &'static RelationshipInfo,
    /// Load plan for the related entity.
    pub plan: Arc<ResolvedLoadPlan>,
}

/// A compiled statement: SQL, bound parameters and load plans.
#[derive(Debug, Clone)]
pub struct CompiledSelect {
    sql: String,
    params: Vec<Value>,
    dialect: Dialect,
    entities: Vec<MappedEntity>,
    plans: Vec<Arc<ResolvedLoadPlan>>,
    options: Arc<OptionTree>,
}

impl CompiledSelect {
    /// Rendered SQL.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Dialect the SQL was rendered for.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Primary entities.
    #[must_use]
    pub fn entities(&self) -> &[MappedEntity] {
        &self.entities
    }

    /// True if rows label columns `table__column`.
    #[must_use]
    pub fn is_multi_entity(&self) -> bool {
        self.entities.len() > 1
    }

    /// Plans, one per primary entity in statement order.
    #[must_use]
    pub fn plans(&self) -> &[Arc<ResolvedLoadPlan>] {
        &self.plans
    }

    /// Plan of a primary entity.
    #[must_use]
    pub fn plan_for(&self, entity: MappedEntity) -> Option<&Arc<ResolvedLoadPlan>> {
        self.plans.iter().find(|p| p.entity() == entity)
    }

    /// Run the statement on `conn`.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(sql = %self.sql))]
    pub async fn fetch_rows<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        conn.query(cx, &self.sql, &self.params).await
    }

    /// Resolve the plan for `target` entities reached from `parent` through
    /// the relationship path `path` (e.g. `"author"` or `"author.publisher"`).
    ///
    /// `parent` is the entity owning the path's last relationship. Paths
    /// with nothing attached resolve to `target`'s mapper defaults.
    pub fn plan_at(&self, path: &str, parent: MappedEntity, target: MappedEntity) -> Result<PathPlan> {
        let tokens = parse_path(path)?;
        let segments: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let Some((last, hops)) = segments.split_last() else {
            return Err(Error::loader(
                LoaderErrorKind::InvalidPath,
                "a related load needs a relationship path",
            ));
        };
        let label = format!("path '{path}'");
        let root = root_for_path(&self.entities, &segments, &label)?;
        let mut owner = root;
        for hop in hops {
            owner = follow(owner, hop, &label)?;
        }
        if parent != owner {
            return Err(Error::loader(
                LoaderErrorKind::InvalidOption,
                format!(
                    "{label}: '{last}' is reached from '{}', not from '{}'",
                    owner.table, parent.table
                ),
            ));
        }
        let Some(relationship) = parent.relationship(last) else {
            return Err(Error::loader(
                LoaderErrorKind::UnknownRelationship,
                format!("{label}: '{}' has no relationship '{last}'", parent.table),
            ));
        };
        if relationship.related_table != target.table {
            return Err(Error::loader(
                LoaderErrorKind::InvalidOption,
                format!(
                    "{label}: '{}.{last}' relates to '{}', not '{}'",
                    parent.table, relationship.related_table, target.table
                ),
            ));
        }
        target.configure()?;
        let plan = StrategyMerger::merge(target, self.options.directives_at(root.table, &segments))?;
        Ok(PathPlan {
            root,
            relationship,
            plan: Arc::new(plan),
        })
    }
}

/// `SELECT <columns> FROM <table> WHERE <pk> = ...` for one identity.
#[must_use]
pub fn select_by_primary_key(
    dialect: Dialect,
    entity: MappedEntity,
    columns: &[&str],
    key: &[Value],
) -> (String, Vec<Value>) {
    let cols: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let mut params = Vec::new();
    let condition = entity
        .primary_key
        .iter()
        .zip(key)
        .map(|(pk, value)| {
            let column = entity.field(pk).map_or(*pk, |f| f.column_name);
            Expr::col(column).eq(value.clone())
        })
        .reduce(Expr::and);
    let mut sql = format!("SELECT {} FROM {}", cols.join(", "), entity.table);
    if let Some(condition) = condition {
        sql.push_str(" WHERE ");
        sql.push_str(&condition.build(dialect, &mut params));
    }
    (sql, params)
}

/// `SELECT <eager columns> FROM <table> WHERE <key_column> IN (...)` for a
/// related load. `key_column` is always selected.
#[must_use]
pub fn select_related(
    dialect: Dialect,
    plan: &ResolvedLoadPlan,
    key_column: &str,
    keys: Vec<Value>,
) -> (String, Vec<Value>) {
    let mut columns = plan.eager_columns();
    if !columns.contains(&key_column) {
        if let Some(attr) = plan.attributes().iter().find(|a| a.column == key_column) {
            columns.push(attr.column);
        }
    }
    let cols: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let mut params = Vec::new();
    let condition = Expr::col(key_column).in_list(keys).build(dialect, &mut params);
    (
        format!(
            "SELECT {} FROM {} WHERE {condition}",
            cols.join(", "),
            plan.entity().table
        ),
        params,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Load, defaultload, defer, load_only, undefer, undefer_group};
    use crate::strategy::ResolvedMode;
    use sqlmodel_core::{FieldInfo, RelationshipKind};

    macro_rules! test_model {
        ($ty:ident, $table:literal, $fields:expr, $rels:expr) => {
            struct $ty;

            impl Model for $ty {
                const TABLE_NAME: &'static str = $table;
                const PRIMARY_KEY: &'static [&'static str] = &["id"];

                fn fields() -> &'static [FieldInfo] {
                    static FIELDS: &[FieldInfo] = $fields;
                    FIELDS
                }

                fn relationships() -> &'static [RelationshipInfo] {
                    static RELS: &[RelationshipInfo] = $rels;
                    RELS
                }

                fn to_row(&self) -> Vec<(&'static str, Value)> {
                    vec![]
                }

                fn from_row(_row: &Row) -> Result<Self> {
                    Ok($ty)
                }

                fn primary_key_value(&self) -> Vec<Value> {
                    vec![]
                }

                fn set_attribute(&mut self, _name: &str, _value: Value) -> Result<()> {
                    Ok(())
                }
            }
        };
    }

    test_model!(
        Book,
        "books",
        &[
            FieldInfo::new("id", "id").primary_key(true),
            FieldInfo::new("title", "title"),
            FieldInfo::new("summary", "summary").deferred(),
            FieldInfo::new("author_id", "author_id"),
        ],
        &[RelationshipInfo::to::<Author>("author", RelationshipKind::ManyToOne).local_key("author_id")]
    );

    test_model!(
        Author,
        "authors",
        &[
            FieldInfo::new("id", "id").primary_key(true),
            FieldInfo::new("name", "name"),
            FieldInfo::new("bio", "bio").defer_group("profile"),
            FieldInfo::new("photo", "photo").defer_group("profile"),
        ],
        &[RelationshipInfo::to::<Book>("books", RelationshipKind::OneToMany).remote_key("author_id")]
    );

    #[test]
    fn test_compile_selects_only_eager_columns() {
        let stmt = Select::new::<Book>()
            .filter(Expr::col("id").eq(1_i64))
            .order_by_desc("title")
            .limit(5)
            .compile(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT \"id\", \"title\", \"author_id\" FROM books WHERE \"id\" = $1 \
             ORDER BY \"title\" DESC LIMIT 5"
        );
        assert_eq!(stmt.params(), &[Value::BigInt(1)]);
    }

    #[test]
    fn test_compile_with_load_only() {
        let stmt = Select::new::<Book>()
            .options([load_only(["title"])])
            .compile(Dialect::Sqlite)
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT \"id\", \"title\" FROM books");
        let plan = stmt.plan_for(MappedEntity::of::<Book>()).unwrap();
        assert!(!plan.is_eager("author_id"));
    }

    #[test]
    fn test_multi_entity_labels_columns() {
        let stmt = Select::new::<Book>()
            .add_entity::<Author>()
            .options([Load::of::<Author>().load_only(["name"])])
            .compile(Dialect::Postgres)
            .unwrap();
        assert!(stmt.is_multi_entity());
        assert_eq!(
            stmt.sql(),
            "SELECT books.\"id\" AS \"books__id\", books.\"title\" AS \"books__title\", \
             books.\"author_id\" AS \"books__author_id\", authors.\"id\" AS \"authors__id\", \
             authors.\"name\" AS \"authors__name\" FROM books, authors"
        );
    }

    #[test]
    fn test_unqualified_load_only_on_two_entities_fails() {
        let err = Select::new::<Book>()
            .add_entity::<Author>()
            .options([load_only(["title"])])
            .compile(Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::AmbiguousTarget));
    }

    #[test]
    fn test_plan_at_uses_path_options() {
        let stmt = Select::new::<Book>()
            .options([defaultload("author").options([undefer_group("profile"), defer("name")])])
            .compile(Dialect::Postgres)
            .unwrap();
        let related = stmt
            .plan_at("author", MappedEntity::of::<Book>(), MappedEntity::of::<Author>())
            .unwrap();
        assert_eq!(related.relationship.name, "author");
        assert!(related.plan.is_eager("bio"));
        assert!(related.plan.is_eager("photo"));
        assert_eq!(related.plan.mode("name"), Some(ResolvedMode::Deferred { group: None }));
    }

    #[test]
    fn test_flat_and_nested_give_equal_path_plans() {
        let flat = Select::new::<Book>()
            .options([defer("author.name"), undefer("author.bio")])
            .compile(Dialect::Postgres)
            .unwrap();
        let nested = Select::new::<Book>()
            .options([defaultload("author").defer("name").undefer("bio")])
            .compile(Dialect::Postgres)
            .unwrap();
        let book = MappedEntity::of::<Book>();
        let author = MappedEntity::of::<Author>();
        assert_eq!(
            flat.plan_at("author", book, author).unwrap().plan,
            nested.plan_at("author", book, author).unwrap().plan
        );
        assert_eq!(flat.plans(), nested.plans());
    }

    #[test]
    fn test_plan_at_without_options_is_mapper_default() {
        let stmt = Select::new::<Book>().compile(Dialect::Postgres).unwrap();
        let related = stmt
            .plan_at("author", MappedEntity::of::<Book>(), MappedEntity::of::<Author>())
            .unwrap();
        assert_eq!(*related.plan, ResolvedLoadPlan::defaults(MappedEntity::of::<Author>()));
    }

    #[test]
    fn test_plan_at_rejects_mismatched_target() {
        let stmt = Select::new::<Book>().compile(Dialect::Postgres).unwrap();
        let err = stmt
            .plan_at("author", MappedEntity::of::<Book>(), MappedEntity::of::<Book>())
            .unwrap_err();
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::InvalidOption));
    }

    #[test]
    fn test_unknown_names_below_a_relationship_fail_compile() {
        let cases = [
            (defer("author.no_such_attr"), LoaderErrorKind::UnknownAttribute),
            (undefer_group("author.no_such_group"), LoaderErrorKind::UnknownGroup),
            (load_only(["author.nope"]), LoaderErrorKind::UnknownAttribute),
            (defer("author.no_such_rel.x"), LoaderErrorKind::UnknownRelationship),
            (defer("author.books.nope"), LoaderErrorKind::UnknownAttribute),
        ];
        for (option, kind) in cases {
            let err = Select::new::<Book>()
                .options([option])
                .compile(Dialect::Postgres)
                .unwrap_err();
            assert_eq!(err.loader_kind(), Some(kind));
        }
    }

    #[test]
    fn test_options_below_untyped_relationship_are_rejected() {
        test_model!(
            Review,
            "reviews",
            &[FieldInfo::new("id", "id").primary_key(true), FieldInfo::new("book_id", "book_id")],
            &[RelationshipInfo::new("book", "books", RelationshipKind::ManyToOne).local_key("book_id")]
        );

        let err = Select::new::<Review>()
            .options([defer("book.title")])
            .compile(Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::InvalidOption));
        assert!(Select::new::<Review>().compile(Dialect::Postgres).is_ok());
    }

    #[test]
    fn test_plan_at_walks_every_hop() {
        let stmt = Select::new::<Author>()
            .options([defaultload("books.author").undefer("bio")])
            .compile(Dialect::Postgres)
            .unwrap();
        let book = MappedEntity::of::<Book>();
        let author = MappedEntity::of::<Author>();
        let related = stmt.plan_at("books.author", book, author).unwrap();
        assert!(related.plan.is_eager("bio"));

        let err = stmt.plan_at("zzz.author", book, author).unwrap_err();
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::UnknownRelationship));
        let err = stmt.plan_at("books.author", author, author).unwrap_err();
        assert_eq!(err.loader_kind(), Some(LoaderErrorKind::InvalidOption));
    }

    #[test]
    fn test_select_by_primary_key_sql() {
        let (sql, params) = select_by_primary_key(
            Dialect::Sqlite,
            MappedEntity::of::<Author>(),
            &["bio", "photo"],
            &[Value::BigInt(7)],
        );
        assert_eq!(sql, "SELECT \"bio\", \"photo\" FROM authors WHERE \"id\" = ?1");
        assert_eq!(params, vec![Value::BigInt(7)]);
    }

    #[test]
    fn test_select_related_includes_key_column() {
        let stmt = Select::new::<Author>()
            .options([defaultload("books").load_only(["title"])])
            .compile(Dialect::Postgres)
            .unwrap();
        let related = stmt
            .plan_at("books", MappedEntity::of::<Author>(), MappedEntity::of::<Book>())
            .unwrap();
        let (sql, params) = select_related(
            Dialect::Postgres,
            &related.plan,
            "author_id",
            vec![Value::BigInt(1), Value::BigInt(2)],
        );
        assert_eq!(
            sql,
            "SELECT \"id\", \"title\", \"author_id\" FROM books WHERE \"author_id\" IN ($1, $2)"
        );
        assert_eq!(params.len(), 2);
    }
}
