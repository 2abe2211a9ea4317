//! ORM session re-exports.
//!
//! `sqlmodel::Session` is the SQLAlchemy/SQLModel-style session: identity
//! map, transactions, statement execution and the lazy attribute loader
//! that fetches deferred columns on first access.
//!
//! The implementation lives in the separate `sqlmodel-session` crate. This
//! module exists so the `sqlmodel` facade can expose the session without
//! forcing users to depend on sub-crates directly.

pub use sqlmodel_session::{
    Instance, LazyLoadStats, LazyLoadTracker, ObjectKey, ObjectState, Session, SessionConfig,
    SessionDebugInfo,
};
