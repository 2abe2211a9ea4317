//! Session, identity map and lazy attribute loading for SQLModel Rust.
//!
//! The Session owns a connection and an identity map. Statements executed
//! through it materialize rows into [`Instance`] handles; reading an
//! attribute the statement deferred goes back through the session, which
//! fetches it (or its whole deferred group) on first access.
//!
//! # Design Philosophy
//!
//! - **One round trip at a time**: every load awaits its query before the
//!   next is issued; `&mut self` rules out concurrent use of one session.
//! - **Identity map is the source of truth**: one entry per primary key,
//!   type-erased as `Box<dyn Any>`, recording which attributes are loaded.
//! - **Plans travel with instances**: each handle keeps the load plan of
//!   the statement that produced it.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(conn);
//!
//! let books = session
//!     .all::<Book>(&cx, &Select::new::<Book>().options([load_only(["title"])]))
//!     .await?;
//!
//! // Deferred: one SELECT of `summary` for this book.
//! let summary = session.load_attribute(&cx, &mut books[0], "summary").await?;
//!
//! session.commit(&cx).await?;
//! ```

use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};
use sqlmodel_core::{Connection, Error, LoadedSet, Model, Row, Value};
use sqlmodel_query::Dialect;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unwrap an `Outcome`, returning early on anything but `Ok`.
macro_rules! try_outcome {
    ($e:expr) => {
        match $e {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result` inside a function returning `Outcome`.
macro_rules! try_result {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e),
        }
    };
}

pub mod instance;
mod lazy;
mod loading;
pub mod n1_detection;

pub use instance::Instance;
pub use n1_detection::{LazyLoadStats, LazyLoadTracker};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
///
/// Deserializable so it can live in an application's config file:
///
/// ```ignore
/// let config: SessionConfig =
///     serde_json::from_str(r#"{"dialect": "sqlite", "lazy_load_warn_threshold": 10}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Issue `BEGIN` before the first statement outside a transaction.
    pub auto_begin: bool,
    /// Expire every tracked instance after commit.
    pub expire_on_commit: bool,
    /// Warn after this many lazy loads of one attribute; 0 disables.
    pub lazy_load_warn_threshold: usize,
    /// SQL dialect of the connection.
    pub dialect: Dialect,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_begin: true,
            expire_on_commit: true,
            lazy_load_warn_threshold: 3,
            dialect: Dialect::Postgres,
        }
    }
}

impl SessionConfig {
    /// Set `auto_begin`.
    #[must_use]
    pub fn auto_begin(mut self, value: bool) -> Self {
        self.auto_begin = value;
        self
    }

    /// Set `expire_on_commit`.
    #[must_use]
    pub fn expire_on_commit(mut self, value: bool) -> Self {
        self.expire_on_commit = value;
        self
    }

    /// Set the repeated lazy-load warning threshold.
    #[must_use]
    pub fn lazy_load_warn_threshold(mut self, value: usize) -> Self {
        self.lazy_load_warn_threshold = value;
        self
    }

    /// Set the SQL dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

// ============================================================================
// Object Key and State
// ============================================================================

/// Unique key for an object in the identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    type_id: TypeId,
    pk_hash: u64,
}

impl ObjectKey {
    /// Key of a model instance.
    pub fn from_model<M: Model + 'static>(obj: &M) -> Self {
        Self::from_pk::<M>(&obj.primary_key_value())
    }

    /// Key of a model type and primary key.
    pub fn from_pk<M: Model + 'static>(pk: &[Value]) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            pk_hash: hash_values(pk),
        }
    }
}

fn hash_values(values: &[Value]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    values.len().hash(&mut hasher);
    for v in values {
        hash_value(v, &mut hasher);
    }
    hasher.finish()
}

/// Hash one value, tagging each variant so `BigInt(42)` and `Text("42")`
/// never collide.
fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => (1u8, b).hash(hasher),
        Value::TinyInt(i) => (2u8, i).hash(hasher),
        Value::SmallInt(i) => (3u8, i).hash(hasher),
        Value::Int(i) => (4u8, i).hash(hasher),
        Value::BigInt(i) => (5u8, i).hash(hasher),
        Value::Float(f) => (6u8, f.to_bits()).hash(hasher),
        Value::Double(f) => (7u8, f.to_bits()).hash(hasher),
        Value::Decimal(s) => (8u8, s).hash(hasher),
        Value::Text(s) => (9u8, s).hash(hasher),
        Value::Bytes(b) => (10u8, b).hash(hasher),
        Value::Date(d) => (11u8, d).hash(hasher),
        Value::Time(t) => (12u8, t).hash(hasher),
        Value::Timestamp(ts) => (13u8, ts).hash(hasher),
        Value::TimestampTz(ts) => (14u8, ts).hash(hasher),
        Value::Uuid(u) => (15u8, u).hash(hasher),
        Value::Json(j) => (16u8, j.to_string()).hash(hasher),
        Value::Array(arr) => {
            (17u8, arr.len()).hash(hasher);
            for item in arr {
                hash_value(item, hasher);
            }
        }
    }
}

/// Render a primary key for messages, e.g. `(1)` or `(1, 'en')`.
pub(crate) fn render_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// State of a tracked object in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Loaded from the database; loaded attributes are current.
    Persistent,
    /// Some attributes were expired and reload on next access.
    Expired,
    /// A lazy fetch found no row for the identity.
    Deleted,
    /// Detached from the session; attribute loads fail.
    Detached,
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A tracked object in the session.
struct TrackedObject {
    /// The object (type-erased).
    object: Box<dyn Any + Send + Sync>,
    /// Attributes whose values in `object` are loaded.
    loaded: LoadedSet,
    /// Process-unique id; instances from a replaced entry no longer match.
    handle: u64,
    /// Bumped on every expiration.
    version: u64,
    state: ObjectState,
    table_name: &'static str,
}

impl TrackedObject {
    fn new<M: Model + 'static>(model: M, loaded: LoadedSet) -> Self {
        Self {
            object: Box::new(model),
            loaded,
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            version: 0,
            state: ObjectState::Persistent,
            table_name: M::TABLE_NAME,
        }
    }

    fn model<M: Model + 'static>(&self) -> Result<&M, Error> {
        self.object
            .downcast_ref::<M>()
            .ok_or_else(|| type_mismatch::<M>(self.table_name))
    }

    fn model_mut<M: Model + 'static>(&mut self) -> Result<&mut M, Error> {
        let table = self.table_name;
        self.object
            .downcast_mut::<M>()
            .ok_or_else(|| type_mismatch::<M>(table))
    }

    /// Copy the entry's current state into `inst`.
    fn sync<M: Model + Clone + 'static>(&self, inst: &mut Instance<M>) -> Result<(), Error> {
        inst.model = self.model::<M>()?.clone();
        inst.loaded = self.loaded.clone();
        inst.version = self.version;
        Ok(())
    }

    /// Unload every non-key attribute.
    fn expire_all(&mut self, primary_key: &[usize]) {
        let mut keep = LoadedSet::empty(self.loaded.len());
        for &idx in primary_key {
            if self.loaded.contains(idx) {
                keep.insert(idx);
            }
        }
        self.loaded = keep;
        self.version += 1;
        if self.state == ObjectState::Persistent {
            self.state = ObjectState::Expired;
        }
    }
}

fn type_mismatch<M>(table: &str) -> Error {
    Error::Custom(format!(
        "identity map entry for '{table}' is not a {}",
        std::any::type_name::<M>()
    ))
}

// ============================================================================
// Session
// ============================================================================

/// The Session: a connection plus an identity map.
pub struct Session<C: Connection> {
    connection: C,
    in_transaction: bool,
    identity_map: HashMap<ObjectKey, TrackedObject>,
    /// Indexes of primary-key attributes per table, for expiration.
    primary_keys: HashMap<&'static str, Vec<usize>>,
    lazy_loads: LazyLoadTracker,
    config: SessionConfig,
}

impl<C: Connection> Session<C> {
    /// Create a new session from an existing connection.
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, SessionConfig::default())
    }

    /// Create a new session with custom configuration.
    pub fn with_config(connection: C, config: SessionConfig) -> Self {
        Self {
            connection,
            in_transaction: false,
            identity_map: HashMap::new(),
            primary_keys: HashMap::new(),
            lazy_loads: LazyLoadTracker::new().with_threshold(config.lazy_load_warn_threshold),
            config,
        }
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Lazy-load counters.
    pub fn lazy_loads(&self) -> &LazyLoadTracker {
        &self.lazy_loads
    }

    /// Mutable lazy-load counters (to reset or disable them).
    pub fn lazy_loads_mut(&mut self) -> &mut LazyLoadTracker {
        &mut self.lazy_loads
    }

    fn remember_primary_key<M: Model>(&mut self) {
        self.primary_keys.entry(M::TABLE_NAME).or_insert_with(|| {
            M::fields()
                .iter()
                .enumerate()
                .filter(|(_, f)| M::PRIMARY_KEY.contains(&f.name))
                .map(|(idx, _)| idx)
                .collect()
        });
    }

    /// The live identity-map entry behind `inst`, or `Error::Detached`.
    fn tracked_mut<M: Model + 'static>(
        &mut self,
        inst: &Instance<M>,
    ) -> Result<&mut TrackedObject, Error> {
        match self.identity_map.get_mut(&inst.key) {
            Some(t) if t.handle == inst.handle && t.state != ObjectState::Detached => Ok(t),
            _ => Err(Error::Detached {
                entity: M::TABLE_NAME,
            }),
        }
    }

    /// True if `inst` is attached to this session.
    pub fn contains<M: Model + 'static>(&self, inst: &Instance<M>) -> bool {
        self.identity_map
            .get(&inst.key)
            .is_some_and(|t| t.handle == inst.handle && t.state != ObjectState::Detached)
    }

    /// State of the entry behind `inst`, if it is still tracked.
    pub fn state_of<M: Model + 'static>(&self, inst: &Instance<M>) -> Option<ObjectState> {
        self.identity_map
            .get(&inst.key)
            .filter(|t| t.handle == inst.handle)
            .map(|t| t.state)
    }

    /// Detach an instance; later loads through its handle fail with
    /// `Error::Detached`.
    #[tracing::instrument(level = "debug", skip(self, inst))]
    pub fn expunge<M: Model + 'static>(&mut self, inst: &Instance<M>) {
        if let Ok(tracked) = self.tracked_mut(inst) {
            tracing::info!(
                model = std::any::type_name::<M>(),
                table = M::TABLE_NAME,
                "Expunging object from session"
            );
            tracked.state = ObjectState::Detached;
        }
    }

    /// Detach every tracked instance.
    pub fn expunge_all(&mut self) {
        for tracked in self.identity_map.values_mut() {
            tracked.state = ObjectState::Detached;
        }
    }

    // ========================================================================
    // Transaction Management
    // ========================================================================

    /// Begin a transaction.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.in_transaction {
            return Outcome::Ok(());
        }

        tracing::info!("Beginning transaction");

        try_outcome!(self.connection.execute(cx, "BEGIN", &[]).await);
        self.in_transaction = true;
        Outcome::Ok(())
    }

    /// Commit the current transaction.
    ///
    /// With `expire_on_commit`, every tracked instance is expired afterwards.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        tracing::info!("Committing transaction");

        if self.in_transaction {
            try_outcome!(self.connection.execute(cx, "COMMIT", &[]).await);
            self.in_transaction = false;
        }

        if self.config.expire_on_commit {
            self.expire_all();
        }

        Outcome::Ok(())
    }

    /// Roll back the current transaction and expire every tracked instance.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        tracing::info!("Rolling back transaction");

        if self.in_transaction {
            try_outcome!(self.connection.execute(cx, "ROLLBACK", &[]).await);
            self.in_transaction = false;
        }

        self.expire_all();
        Outcome::Ok(())
    }

    /// Run a query, beginning a transaction first if `auto_begin` is set.
    async fn run_query(&mut self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        if self.config.auto_begin && !self.in_transaction {
            try_outcome!(self.begin(cx).await);
        }
        tracing::debug!(sql = %sql, params = params.len(), "Executing query");
        self.connection.query(cx, sql, params).await
    }

    // ========================================================================
    // Debug Diagnostics
    // ========================================================================

    /// Total tracked object count, detached entries included.
    pub fn tracked_count(&self) -> usize {
        self.identity_map.len()
    }

    /// Whether we're in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Dump session state for debugging.
    pub fn debug_state(&self) -> SessionDebugInfo {
        let count = |state| {
            self.identity_map
                .values()
                .filter(|t| t.state == state)
                .count()
        };
        SessionDebugInfo {
            tracked: self.tracked_count(),
            expired: count(ObjectState::Expired),
            deleted: count(ObjectState::Deleted),
            detached: count(ObjectState::Detached),
            lazy_loads: self.lazy_loads.stats().total_loads,
            in_transaction: self.in_transaction,
        }
    }
}

/// Debug information about session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDebugInfo {
    /// Total tracked objects.
    pub tracked: usize,
    /// Objects with expired attributes.
    pub expired: usize,
    /// Objects found deleted by a lazy fetch.
    pub deleted: usize,
    /// Detached objects still in the map.
    pub detached: usize,
    /// Lazy attribute loads issued.
    pub lazy_loads: usize,
    /// Whether in a transaction.
    pub in_transaction: bool,
}

// ============================================================================
// Unit Tests
// ============================================================================
