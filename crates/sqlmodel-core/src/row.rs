//! Result rows returned by drivers.

use crate::value::Value;
use std::sync::Arc;

/// A single result row: column names shared across the result set plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from column names and values.
    ///
    /// Missing trailing values are treated as NULL by the accessors.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Column names in select order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in select order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value at a column index.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value of a named column.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// True if the row selected the named column.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Extract the columns labelled `{prefix}{name}` as a new row keyed by `name`.
    ///
    /// Multi-entity statements label columns `table__column`; this splits such
    /// a row back into one row per entity.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &str) -> Row {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for (idx, col) in self.columns.iter().enumerate() {
            if let Some(rest) = col.strip_prefix(prefix) {
                columns.push(rest.to_string());
                values.push(self.values.get(idx).cloned().unwrap_or(Value::Null));
            }
        }
        Row::new(columns, values)
    }
}
