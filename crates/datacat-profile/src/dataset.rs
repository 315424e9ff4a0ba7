//! Columnar in-memory dataset.

use std::collections::HashSet;
use std::mem::size_of;

use chrono::NaiveDateTime;

/// Values of one column in their native storage. `None` is a null cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    /// Untyped storage; the profiler infers a type from the content.
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::DateTime(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        fn nulls<T>(values: &[Option<T>]) -> usize {
            values.iter().filter(|v| v.is_none()).count()
        }
        match self {
            ColumnValues::Int(v) => nulls(v),
            ColumnValues::Float(v) => nulls(v),
            ColumnValues::Bool(v) => nulls(v),
            ColumnValues::DateTime(v) => nulls(v),
            ColumnValues::Text(v) => nulls(v),
        }
    }

    /// Number of distinct non-null values.
    pub fn distinct_count(&self) -> usize {
        match self {
            ColumnValues::Int(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
            ColumnValues::Float(v) => v
                .iter()
                .flatten()
                .filter(|f| !f.is_nan())
                // -0.0 and 0.0 are the same value
                .map(|f| if *f == 0.0 { 0u64 } else { f.to_bits() })
                .collect::<HashSet<_>>()
                .len(),
            ColumnValues::Bool(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
            ColumnValues::DateTime(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
            ColumnValues::Text(v) => v
                .iter()
                .flatten()
                .map(String::as_str)
                .collect::<HashSet<_>>()
                .len(),
        }
    }

    /// Bytes held by the column including string heap allocations.
    pub fn memory_usage(&self) -> usize {
        match self {
            ColumnValues::Int(v) => v.len() * size_of::<Option<i64>>(),
            ColumnValues::Float(v) => v.len() * size_of::<Option<f64>>(),
            ColumnValues::Bool(v) => v.len() * size_of::<Option<bool>>(),
            ColumnValues::DateTime(v) => v.len() * size_of::<Option<NaiveDateTime>>(),
            ColumnValues::Text(v) => {
                v.len() * size_of::<Option<String>>()
                    + v.iter().flatten().map(String::capacity).sum::<usize>()
            }
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Textual column from string cells; `None` is null.
    pub fn text<S: Into<String>>(name: impl Into<String>, cells: Vec<Option<S>>) -> Self {
        Self::new(
            name,
            ColumnValues::Text(cells.into_iter().map(|c| c.map(Into::into)).collect()),
        )
    }
}

/// Rows x named columns, stored column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Rows in the dataset; the longest column when lengths disagree.
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.values.len())
            .max()
            .unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Deep in-memory footprint of every column.
    pub fn memory_usage(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.name.capacity() + c.values.memory_usage())
            .sum()
    }
}
