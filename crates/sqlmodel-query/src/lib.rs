//! Loader options and load-plan compilation for SQLModel Rust.
//!
//! `sqlmodel-query` turns a statement's loader options into per-entity
//! [`ResolvedLoadPlan`]s and renders SQL that selects only the eager
//! columns those plans name.
//!
//! # Role In The Architecture
//!
//! - **Options** (`options`): `defer`, `undefer`, `undefer_group`,
//!   `load_only`, `raiseload`, `defaultload` and `Load::of` build option
//!   trees attached to a [`Select`].
//! - **Path resolution** (`path`): flat and nested options normalize into
//!   one [`OptionTree`] per statement, rooted at its primary entities.
//! - **Merging** (`strategy`): [`StrategyMerger`] folds the directives at a
//!   path over the mapper defaults.
//! - **Statements** (`select`, `expr`): [`Select::compile`] ties it together;
//!   the session executes the resulting [`CompiledSelect`].

pub mod expr;
pub mod options;
pub mod path;
pub mod select;
pub mod strategy;

pub use expr::{BinaryOp, Dialect, Expr};
pub use options::{
    AttrSelector, Directive, Load, LoaderOption, OptionTarget, defaultload, defer, load_only,
    raiseload, undefer, undefer_group,
};
pub use path::{OptionNode, OptionTree};
pub use select::{CompiledSelect, PathPlan, Select, select_by_primary_key, select_related};
pub use strategy::{ResolvedAttribute, ResolvedLoadPlan, ResolvedMode, StrategyMerger};
