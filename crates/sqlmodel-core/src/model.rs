//! The `Model` trait implemented by mapped structs.

use crate::error::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;

/// A struct mapped to a database table.
///
/// Attribute names used by loader options and the session are the
/// `FieldInfo::name`s returned by [`Model::fields`].
pub trait Model: Sized + Send + Sync {
    /// Table name.
    const TABLE_NAME: &'static str;

    /// Primary key attribute names.
    const PRIMARY_KEY: &'static [&'static str];

    /// Field metadata, in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Relationship metadata.
    fn relationships() -> &'static [RelationshipInfo] {
        &[]
    }

    /// Current attribute values as `(attribute, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Build an instance from a row.
    ///
    /// Deferred columns are absent from the row; implementations fill them
    /// with a placeholder (typically the type's default) which the session
    /// never exposes while the attribute is unloaded.
    fn from_row(row: &Row) -> Result<Self>;

    /// Primary key values, in `PRIMARY_KEY` order.
    fn primary_key_value(&self) -> Vec<Value>;

    /// Assign one attribute from a fetched value.
    ///
    /// Called by the lazy loader when deferred columns arrive.
    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()>;

    /// Current value of a single attribute.
    fn attribute(&self, name: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find_map(|(attr, value)| (attr == name).then_some(value))
    }
}
