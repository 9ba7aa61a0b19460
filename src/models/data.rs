//! In-memory result containers.
//!
//! [`DataSet`] and [`DataTable`] hold fully buffered results; [`DataRecord`]
//! is a single row handed out by a streaming reader.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
    /// Always true for columns read from a result set; drivers do not
    /// report NOT NULL constraints alongside rows.
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// One buffered result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl DataTable {
    /// Create a table with the given columns and no rows.
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value at `row` in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&JsonValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rows projected to `column name -> value` maps.
    pub fn rows_as_maps(&self) -> Vec<serde_json::Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Every row-producing result set of a command, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub tables: Vec<DataTable>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, index: usize) -> Option<&DataTable> {
        self.tables.get(index)
    }

    /// First table, or an empty one when the command produced no result set.
    pub fn into_first_table(self) -> DataTable {
        self.tables.into_iter().next().unwrap_or_default()
    }
}

/// A single row produced by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    columns: Arc<Vec<ColumnMetadata>>,
    values: Vec<JsonValue>,
}

impl DataRecord {
    pub fn new(columns: Arc<Vec<ColumnMetadata>>, values: Vec<JsonValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index)
    }

    /// Value of the named column, matched case-insensitively.
    pub fn get_by_name(&self, name: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_table() -> DataTable {
        let mut table = DataTable::new(vec![
            ColumnMetadata::new("id", "INTEGER", false),
            ColumnMetadata::new("Name", "TEXT", true),
        ]);
        table.rows.push(vec![json!(1), json!("alice")]);
        table.rows.push(vec![json!(2), JsonValue::Null]);
        table
    }

    #[test]
    fn test_table_lookup() {
        let table = sample_table();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_index("name"), Some(1));
        assert_eq!(table.value(0, "NAME"), Some(&json!("alice")));
        assert_eq!(table.value(1, "name"), Some(&JsonValue::Null));
        assert_eq!(table.value(5, "id"), None);
        assert_eq!(table.value(0, "missing"), None);
    }

    #[test]
    fn test_rows_as_maps() {
        let maps = sample_table().rows_as_maps();
        assert_eq!(maps[0]["id"], json!(1));
        assert_eq!(maps[0]["Name"], json!("alice"));
    }

    #[test]
    fn test_first_table_of_empty_set() {
        let table = DataSet::new().into_first_table();
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_record_access() {
        let columns = Arc::new(sample_table().columns);
        let record = DataRecord::new(columns, vec![json!(3), json!("carol")]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get(0), Some(&json!(3)));
        assert_eq!(record.get_by_name("name"), Some(&json!("carol")));
        assert_eq!(record.get_by_name("nope"), None);
    }
}
