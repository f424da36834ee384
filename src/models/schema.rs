//! Schema-related data models.
//!
//! This module defines the shape a table reports through catalog introspection:
//! its columns with their data-type names, and its single primary-key column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Catalog type name as reported by the engine (e.g. `varchar`, `int4`, `INTEGER`)
    pub data_type: String,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Column name to data-type mapping of one table, in catalog ordinal order.
///
/// An unknown table yields an empty `TableMeta`; that is not an error at the
/// gateway level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableMeta {
    columns: Vec<ColumnDefinition>,
}

impl TableMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column. A repeated name replaces the earlier type in place.
    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.insert(name, data_type);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, data_type: impl Into<String>) {
        let name = name.into();
        let data_type = data_type.into();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.data_type = data_type,
            None => self.columns.push(ColumnDefinition::new(name, data_type)),
        }
    }

    /// Check whether `column` belongs to the table (exact, case-sensitive match).
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    pub fn data_type(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type.as_str())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDefinition> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for TableMeta {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut meta = TableMeta::new();
        for (name, data_type) in iter {
            meta.insert(name, data_type);
        }
        meta
    }
}

impl<'a> IntoIterator for &'a TableMeta {
    type Item = &'a ColumnDefinition;
    type IntoIter = std::slice::Iter<'a, ColumnDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Everything a record needs to know about its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: TableMeta,
    pub primary_key: String,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(
        table_name: impl Into<String>,
        columns: TableMeta,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            primary_key: primary_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableMeta {
        TableMeta::new()
            .with_column("ID", "int")
            .with_column("name", "varchar")
            .with_column("email", "varchar")
    }

    #[test]
    fn test_table_meta_keeps_catalog_order() {
        let schema = users();
        let names: Vec<&str> = schema.column_names().collect();
        assert_eq!(names, vec!["ID", "name", "email"]);
    }

    #[test]
    fn test_table_meta_lookup_is_case_sensitive() {
        let meta = users();
        assert!(meta.contains("ID"));
        assert!(!meta.contains("id"));
        assert_eq!(meta.data_type("name"), Some("varchar"));
        assert_eq!(meta.data_type("missing"), None);
    }

    #[test]
    fn test_table_meta_repeated_column_replaces_type() {
        let meta: TableMeta = vec![("a", "int"), ("b", "text"), ("a", "bigint")]
            .into_iter()
            .collect();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.data_type("a"), Some("bigint"));
    }

    #[test]
    fn test_empty_table_meta() {
        let meta = TableMeta::new();
        assert!(meta.is_empty());
        assert_eq!(meta.iter().count(), 0);
    }

    #[test]
    fn test_table_schema_serializes_columns_as_list() {
        let schema = TableSchema::new("users", users(), "ID");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["primary_key"], "ID");
        assert_eq!(json["columns"][1]["name"], "name");
        assert_eq!(json["columns"][1]["data_type"], "varchar");
    }
}
