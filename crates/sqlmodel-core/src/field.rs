//! Field and column definitions.

use crate::load::{AttributeLoadPolicy, LoadMode};

/// Metadata about a model field/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name (the mapped attribute name)
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Default value expression (SQL)
    pub default: Option<&'static str>,
    /// Foreign key reference (table.column)
    pub foreign_key: Option<&'static str>,
    /// Mapper-level load mode.
    ///
    /// Primary key columns must stay `Eager`; mapper configuration rejects
    /// anything else.
    pub load: LoadMode,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str) -> Self {
        Self {
            name,
            column_name,
            nullable: false,
            primary_key: false,
            default: None,
            foreign_key: None,
            load: LoadMode::Eager,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set default value.
    pub const fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    /// Set foreign key reference.
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Defer loading of this column until it is first accessed.
    pub const fn deferred(mut self) -> Self {
        self.load = LoadMode::Deferred;
        self
    }

    /// Defer this column as part of a named group.
    ///
    /// Accessing any member of the group loads all of its members in one
    /// round trip.
    pub const fn defer_group(mut self, group: &'static str) -> Self {
        self.load = LoadMode::DeferredGroup(group);
        self
    }

    /// Defer this column and raise on access instead of loading it.
    pub const fn defer_raiseload(mut self) -> Self {
        self.load = LoadMode::RaiseOnAccess;
        self
    }

    /// Set the load mode explicitly.
    pub const fn load_mode(mut self, mode: LoadMode) -> Self {
        self.load = mode;
        self
    }

    /// The mapper-level load policy of this field.
    #[must_use]
    pub const fn policy(&self) -> AttributeLoadPolicy {
        AttributeLoadPolicy::new(self.name, self.load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_defaults_to_eager() {
        let field = FieldInfo::new("title", "title");
        assert_eq!(field.load, LoadMode::Eager);
        assert!(!field.primary_key);
        assert_eq!(field.policy(), AttributeLoadPolicy::new("title", LoadMode::Eager));
    }

    #[test]
    fn test_field_deferred_builders() {
        assert_eq!(
            FieldInfo::new("summary", "summary").deferred().load,
            LoadMode::Deferred
        );
        assert_eq!(
            FieldInfo::new("photo1", "photo1").defer_group("photos").load,
            LoadMode::DeferredGroup("photos")
        );
        assert_eq!(
            FieldInfo::new("cover", "cover").defer_raiseload().load,
            LoadMode::RaiseOnAccess
        );
    }

    #[test]
    fn test_field_column_rename() {
        let field = FieldInfo::new("author_id", "author_id")
            .column("fk_author")
            .foreign_key("authors.id")
            .nullable(true);
        assert_eq!(field.column_name, "fk_author");
        assert_eq!(field.foreign_key, Some("authors.id"));
        assert!(field.nullable);
    }

    #[test]
    fn test_const_field_tables() {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id").primary_key(true),
            FieldInfo::new("body", "body").deferred(),
        ];
        assert_eq!(FIELDS.len(), 2);
        assert!(FIELDS[1].load.is_deferred());
    }
}
