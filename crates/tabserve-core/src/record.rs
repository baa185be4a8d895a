//! Tabular record sets built per request

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// An ordered set of rows over named columns.
///
/// Columns keep the order in which they were first seen. Every row has
/// exactly one cell per column; cells that were absent in the source
/// object hold `Value::Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    columns: IndexMap<String, ()>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record set from JSON objects, taking the union of their keys.
    pub fn from_objects<'a, I>(objects: I) -> Self
    where
        I: IntoIterator<Item = &'a Map<String, Value>>,
    {
        let objects: Vec<&Map<String, Value>> = objects.into_iter().collect();

        let mut columns = IndexMap::new();
        for obj in &objects {
            for key in obj.keys() {
                columns.entry(key.clone()).or_insert(());
            }
        }

        let rows = objects
            .iter()
            .map(|obj| {
                columns
                    .keys()
                    .map(|col| obj.get(col).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(name)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Copy out the named columns, in the given order.
    ///
    /// Returns `None` if any name is not a column of this set.
    pub fn select(&self, names: &[String]) -> Option<RecordSet> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Option<Vec<_>>>()?;

        let columns = names.iter().map(|n| (n.clone(), ())).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Some(RecordSet { columns, rows })
    }

    /// Render each row back into a JSON object, columns in order.
    pub fn to_objects(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .keys()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}
