//! SQLModel Rust: SQL models with per-statement column loading strategies.
//!
//! Every mapped attribute has a default load mode (eager, deferred, part of a
//! deferred group, or raise-on-access). Statements override those defaults
//! with loader options; the session materializes rows according to the
//! resolved plan and fetches deferred columns the first time they are read.
//!
//! ```ignore
//! use sqlmodel::prelude::*;
//!
//! let stmt = Select::new::<Book>().options([
//!     load_only(["title", "isbn"]),
//!     defaultload("author").options([undefer_group("profile")]),
//! ]);
//! let mut books = session.all::<Book>(&cx, &stmt).await?;
//! let summary = session.load_attribute(&cx, &mut books[0], "summary").await?;
//! let authors = session.load_related::<Book, Author>(&cx, &stmt, &books, "author").await?;
//! ```
//!
//! The workspace is split into:
//!
//! - `sqlmodel-core`: values, rows, errors, `Model`/`Connection`, mapper metadata
//! - `sqlmodel-query`: loader options, path resolution, plan merging, `Select`
//! - `sqlmodel-session`: `Session`, `Instance`, lazy loading, expiration

pub mod session;

pub use asupersync::{Cx, Outcome};
pub use sqlmodel_core::{
    AttributeLoadPolicy, Connection, Error, FieldInfo, LoadMode, LoadedSet, LoaderError,
    LoaderErrorKind, MappedEntity, Model, RelationshipInfo, RelationshipKind, Result, Row, Value,
};
pub use sqlmodel_query::{
    AttrSelector, CompiledSelect, Dialect, Directive, Expr, Load, LoaderOption, OptionTree,
    PathPlan, ResolvedAttribute, ResolvedLoadPlan, ResolvedMode, Select, StrategyMerger,
    defaultload, defer, load_only, raiseload, undefer, undefer_group,
};
pub use session::{
    Instance, LazyLoadStats, LazyLoadTracker, ObjectKey, ObjectState, Session, SessionConfig,
    SessionDebugInfo,
};

/// Everything needed to declare models, build statements and run a session.
pub mod prelude {
    pub use crate::{
        Connection, Cx, Dialect, Error, Expr, FieldInfo, Instance, Load, LoadMode,
        LoaderErrorKind, MappedEntity, Model, Outcome, RelationshipInfo, RelationshipKind,
        ResolvedLoadPlan, ResolvedMode, Result, Row, Select, Session, SessionConfig, Value,
        defaultload, defer, load_only, raiseload, undefer, undefer_group,
    };
}
