//! Core types and traits for SQLModel Rust.
//!
//! `sqlmodel-core` is the **foundation layer** for the deferred-loading stack.
//! It defines the traits and core data types the query and session crates
//! build on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Model` and `Connection` are the traits implemented by
//!   user models and database drivers.
//! - **Mapper metadata**: `FieldInfo` carries each attribute's default
//!   `LoadMode`; `MappedEntity` is the validated, immutable view of a model
//!   that loader options resolve against.
//! - **Data model**: `Row` and `Value` represent query inputs/outputs.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every database round trip is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `sqlmodel-query` resolves loader options against `MappedEntity` and
//!   compiles statements into SQL plus per-entity load plans.
//! - `sqlmodel-session` materializes rows into instances, tracks which
//!   attributes are loaded (`LoadedSet`) and fires lazy loads through
//!   `Connection`.
//!
//! Most applications should use the `sqlmodel` facade.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod field;
pub mod load;
pub mod loaded_set;
pub mod mapper;
pub mod model;
pub mod relationship;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use error::{Error, LoaderError, LoaderErrorKind, Result};
pub use field::FieldInfo;
pub use load::{AttributeLoadPolicy, LoadMode};
pub use loaded_set::LoadedSet;
pub use mapper::MappedEntity;
pub use model::Model;
pub use relationship::{RelationshipInfo, RelationshipKind, find_relationship};
pub use row::Row;
pub use value::Value;
