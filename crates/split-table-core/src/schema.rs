//! Column and index declarations plus their DDL rendering.
//!
//! The schema model is intentionally small: a handful of portable column
//! types, single-table primary keys, an optional auto-increment column and
//! secondary indexes (optionally partial). It is rich enough to express the
//! segment tables, the metadata catalog, and additive schema evolution
//! (new columns, new indexes).

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{config::ParseSegmentSpanError, value::quote_identifier};

/// Column types understood by the schema layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// 64-bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Boolean stored as 0/1.
    Boolean,
    /// UTC timestamp.
    DateTime,
}

impl SqlType {
    /// Declared type name used in DDL.
    pub fn declared(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Boolean => "BOOLEAN",
            SqlType::DateTime => "DATETIME",
        }
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column type.
    pub sql_type: SqlType,
    /// Part of the primary key.
    pub primary: bool,
    /// Values are allocated by the engine.
    pub auto_increment: bool,
    /// NULL is allowed.
    pub nullable: bool,
    /// Default value as a SQL literal.
    pub default: Option<String>,
}

impl ColumnSpec {
    /// Nullable column with no default.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary: false,
            auto_increment: false,
            nullable: true,
            default: None,
        }
    }

    /// Mark as (part of) the primary key.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Mark as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default, given as a SQL literal (`0`, `'x'`, `CURRENT_TIMESTAMP`).
    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// True when this column can carry the split index.
    pub fn is_auto_increment_integer(&self) -> bool {
        self.auto_increment && self.sql_type == SqlType::Integer
    }

    /// Column definition for `CREATE TABLE`. `inline_key` renders the
    /// single-column `PRIMARY KEY AUTOINCREMENT` form.
    pub(crate) fn definition_sql(&self, inline_key: bool) -> String {
        let mut def = format!("{} {}", quote_identifier(&self.name), self.sql_type.declared());
        if inline_key {
            def.push_str(" PRIMARY KEY");
            if self.auto_increment {
                def.push_str(" AUTOINCREMENT");
            }
            return def;
        }
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }

    /// Column definition for `ALTER TABLE ... ADD COLUMN`.
    ///
    /// Added columns can't be keys, and `NOT NULL` needs a default to be
    /// accepted on a populated table, so it's dropped when no default exists.
    pub(crate) fn add_column_sql(&self) -> String {
        let mut def = format!("{} {}", quote_identifier(&self.name), self.sql_type.declared());
        if let Some(default) = &self.default {
            if !self.nullable {
                def.push_str(" NOT NULL");
            }
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Unique index.
    pub unique: bool,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Optional `WHERE` clause for a partial index.
    pub predicate: Option<String>,
}

impl IndexSpec {
    /// Plain (non-unique) index.
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            unique: false,
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            predicate: None,
        }
    }

    /// Unique index.
    pub fn unique<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            unique: true,
            ..Self::new(columns)
        }
    }

    /// Restrict the index to rows matching `predicate`.
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Index name, derived from the table it lives on so that every segment
    /// gets its own.
    pub fn name(&self, table: &str) -> String {
        let prefix = if self.unique { "uix" } else { "ix" };
        format!("{prefix}_{table}_{}", self.columns.join("_"))
    }

    /// True when both indexes cover the same columns with the same kind.
    pub fn same_shape(&self, other: &IndexSpec) -> bool {
        self.unique == other.unique
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// `CREATE INDEX` statement for `table`.
    pub fn create_sql(&self, table: &str) -> String {
        let cols: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        let mut sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_identifier(&self.name(table)),
            quote_identifier(table),
            cols.join(", ")
        );
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql
    }
}

/// Structural errors found while constructing a split table. These are
/// configuration mistakes and are never retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The configured index column does not exist.
    #[snafu(display("Index column {column} not found in table {table}"))]
    MissingIndexColumn {
        /// Logical table name.
        table: String,
        /// Configured column.
        column: String,
    },

    /// The index column is not the primary key.
    #[snafu(display("Index column {column} of table {table} is not the primary key"))]
    IndexNotPrimary {
        /// Logical table name.
        table: String,
        /// Configured column.
        column: String,
    },

    /// The index column is not an auto-increment integer.
    #[snafu(display("Index column {column} of table {table} is not an auto-increment integer"))]
    IndexNotAutoIncrement {
        /// Logical table name.
        table: String,
        /// Configured column.
        column: String,
    },

    /// The configured date column does not exist.
    #[snafu(display("Date column {column} not found in table {table}"))]
    MissingDateColumn {
        /// Logical table name.
        table: String,
        /// Configured column.
        column: String,
    },

    /// The date column is not a datetime column.
    #[snafu(display("Date column {column} of table {table} has type {found:?}, expected DateTime"))]
    DateNotDateTime {
        /// Logical table name.
        table: String,
        /// Configured column.
        column: String,
        /// Declared type.
        found: SqlType,
    },

    /// The maximum segment duration cannot be represented.
    #[snafu(display("Segment duration for table {table} is out of range"))]
    DurationOutOfRange {
        /// Logical table name.
        table: String,
    },

    /// The segment span string in a config file failed to parse.
    #[snafu(display("Invalid segment span in config: {source}"))]
    InvalidSpan {
        /// Underlying parse error.
        source: ParseSegmentSpanError,
    },

    /// The config document is not valid JSON for [`SplitTableConfig`](crate::SplitTableConfig).
    #[snafu(display("Invalid split table config: {source}"))]
    InvalidConfig {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_key_renders_autoincrement() {
        let col = ColumnSpec::new("id", SqlType::Integer)
            .primary()
            .auto_increment();
        assert_eq!(
            col.definition_sql(true),
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn add_column_drops_not_null_without_default() {
        let strict = ColumnSpec::new("note", SqlType::Text).not_null();
        assert_eq!(strict.add_column_sql(), "\"note\" TEXT");

        let with_default = ColumnSpec::new("flag", SqlType::Boolean)
            .not_null()
            .default_value("0");
        assert_eq!(
            with_default.add_column_sql(),
            "\"flag\" BOOLEAN NOT NULL DEFAULT 0"
        );
    }

    #[test]
    fn index_names_are_per_table() {
        let idx = IndexSpec::unique(&["obj_id", "action"]);
        assert_eq!(idx.name("log_1700000000"), "uix_log_1700000000_obj_id_action");
        assert_eq!(
            idx.create_sql("log_1700000000"),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uix_log_1700000000_obj_id_action\" ON \"log_1700000000\" (\"obj_id\", \"action\")"
        );
    }

    #[test]
    fn partial_index_appends_predicate() {
        let idx = IndexSpec::unique(&["deleted"]).with_predicate("\"end\" IS NULL");
        assert!(idx.create_sql("t_metadata").ends_with("WHERE \"end\" IS NULL"));
        assert!(idx.same_shape(&IndexSpec::unique(&["DELETED"])));
        assert!(!idx.same_shape(&IndexSpec::new(&["deleted"])));
    }
}
