//! The relational engine seam.
//!
//! Everything above this module talks to the database through the
//! [`Engine`] trait: execute a statement, run a query returning rows
//! (including aggregate scalars), and describe a table's columns and
//! indexes. The split-table logic never issues engine-specific calls
//! directly, so alternative backends only need to implement this trait.
//!
//! [`sqlite::SqliteEngine`] is the bundled implementation.

pub mod sqlite;

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{record::Row, value::SqlValue};

/// Result alias for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by an [`Engine`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    /// Could not open a connection to the database.
    #[snafu(display("Failed to connect to {url}: {source}"))]
    Connect {
        /// Connection target.
        url: String,
        /// Underlying driver error.
        source: sqlx::Error,
    },

    /// A statement failed.
    #[snafu(display("Statement failed: {sql}: {source}"))]
    Database {
        /// Statement text.
        sql: String,
        /// Underlying driver error.
        source: sqlx::Error,
    },

    /// A statement violated a unique constraint.
    #[snafu(display("Unique constraint violated by {sql}: {message}"))]
    UniqueViolation {
        /// Statement text.
        sql: String,
        /// Driver message.
        message: String,
    },

    /// A stored value has a type with no [`SqlValue`] mapping.
    #[snafu(display("Unsupported value type {type_name} in column {column}"))]
    UnsupportedValue {
        /// Column name.
        column: String,
        /// Driver type name.
        type_name: String,
    },

    /// A stored value could not be decoded.
    #[snafu(display("Failed to decode {type_name} in column {column}: {source}"))]
    Decode {
        /// Column name.
        column: String,
        /// Driver type name.
        type_name: &'static str,
        /// Driver decode error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    /// True when the failure is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, EngineError::UniqueViolation { .. })
    }
}

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Key allocated by the last insert, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

/// A column as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type text.
    pub declared_type: String,
    /// NOT NULL constraint present.
    pub not_null: bool,
    /// Part of the primary key.
    pub primary: bool,
}

/// Capability set required from the relational engine.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Execute a statement with positional parameters.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> EngineResult<ExecOutcome>;

    /// Run a query with positional parameters and collect its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> EngineResult<Vec<Row>>;

    /// Columns of `table`, or `None` when the table does not exist.
    async fn describe_columns(&self, table: &str) -> EngineResult<Option<Vec<ColumnInfo>>>;

    /// Names of the explicitly created indexes on `table`.
    async fn index_names(&self, table: &str) -> EngineResult<Vec<String>>;

    /// True when `table` exists.
    async fn table_exists(&self, table: &str) -> EngineResult<bool> {
        Ok(self.describe_columns(table).await?.is_some())
    }

    /// First column of the first row, or NULL when the query returns nothing.
    async fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> EngineResult<SqlValue> {
        let rows = self.query(sql, params).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.values().first().cloned())
            .unwrap_or(SqlValue::Null))
    }
}
