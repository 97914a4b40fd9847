//! Rows and the record traits that map typed structs onto them.
//!
//! Rather than looking fields up by name at runtime, a record type describes
//! its own columns and converts itself to and from a [`Row`]. Split tables
//! additionally need the index and date fields, exposed through
//! [`SplitRecord`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use snafu::prelude::*;

use crate::{
    schema::{ColumnSpec, IndexSpec},
    value::SqlValue,
};

/// Errors raised when reading typed values out of a [`Row`].
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum RowError {
    /// The row has no column with the requested name.
    #[snafu(display("Row has no column {column}"))]
    MissingColumn {
        /// Requested column.
        column: String,
    },

    /// The column holds a value of an unexpected kind.
    #[snafu(display("Column {column} holds {found}, expected {expected}"))]
    TypeMismatch {
        /// Column being read.
        column: String,
        /// Expected value kind.
        expected: &'static str,
        /// Kind actually found.
        found: &'static str,
    },
}

/// An ordered set of named values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty row with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a column. A later column with the same name shadows nothing;
    /// lookups return the first match.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Builder form of [`Row::push`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Value for `column` (case-insensitive), if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    /// Value for `column`, or [`RowError::MissingColumn`].
    pub fn require(&self, column: &str) -> Result<&SqlValue, RowError> {
        self.get(column).context(MissingColumnSnafu { column })
    }

    /// Nullable integer column.
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, RowError> {
        self.typed(column, "INTEGER", SqlValue::as_i64)
    }

    /// Nullable float column.
    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, RowError> {
        self.typed(column, "REAL", SqlValue::as_f64)
    }

    /// Nullable boolean column.
    pub fn get_bool(&self, column: &str) -> Result<Option<bool>, RowError> {
        self.typed(column, "BOOLEAN", SqlValue::as_bool)
    }

    /// Nullable datetime column.
    pub fn get_datetime(&self, column: &str) -> Result<Option<DateTime<Utc>>, RowError> {
        self.typed(column, "DATETIME", SqlValue::as_datetime)
    }

    /// Nullable text column.
    pub fn get_string(&self, column: &str) -> Result<Option<String>, RowError> {
        self.typed(column, "TEXT", |v| v.as_str().map(str::to_string))
    }

    fn typed<T>(
        &self,
        column: &str,
        expected: &'static str,
        view: impl Fn(&SqlValue) -> Option<T>,
    ) -> Result<Option<T>, RowError> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(None);
        }
        match view(value) {
            Some(v) => Ok(Some(v)),
            None => TypeMismatchSnafu {
                column,
                expected,
                found: value.kind(),
            }
            .fail(),
        }
    }
}

/// A typed struct persisted as one table row.
pub trait Record: Send + Sync {
    /// Column layout of the table holding this record.
    fn columns() -> Vec<ColumnSpec>
    where
        Self: Sized;

    /// Secondary indexes declared by the record type.
    fn indexes() -> Vec<IndexSpec>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Convert to a row. Auto-increment keys that are not assigned yet should
    /// be emitted as `0` or NULL so the engine allocates them.
    fn to_row(&self) -> Row;

    /// Rebuild the record from a row read back from the engine.
    fn from_row(row: &Row) -> Result<Self, RowError>
    where
        Self: Sized;
}

/// A record that can live in a split table: it exposes the auto-increment
/// index and the datetime that drives segmentation.
pub trait SplitRecord: Record {
    /// Current index value (`0` until the record has been inserted).
    fn split_index(&self) -> i64;

    /// Store the index assigned by the engine on insert.
    fn set_split_index(&mut self, index: i64);

    /// Date used for roll-over decisions. `None` makes inserts fail.
    fn split_date(&self) -> Option<DateTime<Utc>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Row {
        Row::new()
            .with("id", 7_i64)
            .with("name", "seg")
            .with("deleted", SqlValue::Integer(1))
            .with("at", "2025-01-02 03:04:05.000000")
            .with("missing", SqlValue::Null)
    }

    #[test]
    fn typed_getters_convert_storage_values() {
        let row = sample();
        assert_eq!(row.get_i64("ID").unwrap(), Some(7));
        assert_eq!(row.get_string("name").unwrap(), Some("seg".to_string()));
        assert_eq!(row.get_bool("deleted").unwrap(), Some(true));
        assert_eq!(
            row.get_datetime("at").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single()
        );
        assert_eq!(row.get_i64("missing").unwrap(), None);
    }

    #[test]
    fn missing_column_and_mismatch_are_reported() {
        let row = sample();
        assert_eq!(
            row.get_i64("nope"),
            Err(RowError::MissingColumn {
                column: "nope".to_string()
            })
        );
        assert_eq!(
            row.get_datetime("id"),
            Err(RowError::TypeMismatch {
                column: "id".to_string(),
                expected: "DATETIME",
                found: "INTEGER",
            })
        );
    }

    #[test]
    fn iter_preserves_column_order() {
        let row = sample();
        let names: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["id", "name", "deleted", "at", "missing"]);
    }
}
