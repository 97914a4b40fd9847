//! Physical table specs and the structural table contract.
//!
//! A [`TableSpec`] binds a table name and column layout to an engine
//! handle. It is cheap to clone and carries no cached state, so segment
//! tables can be materialized on demand from metadata rows.
//!
//! [`TableContract`] is the shape downstream DDL/query code relies on. Both
//! a plain [`TableSpec`] and a split table implement it.

pub mod ddl;

use std::sync::Arc;

use async_trait::async_trait;
use snafu::prelude::*;

use crate::{
    engine::{Engine, EngineError},
    query::Query,
    record::{Record, Row, RowError},
    schema::{ColumnSpec, IndexSpec},
    value::{SqlValue, quote_identifier},
};

/// Errors from operations on a single physical table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The engine rejected a statement.
    #[snafu(display("Engine error on table {table}: {source}"))]
    Engine {
        /// Physical table name.
        table: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// A row read back could not be converted to a record.
    #[snafu(display("Row conversion failed for table {table}: {source}"))]
    Row {
        /// Physical table name.
        table: String,
        /// Underlying row error.
        source: RowError,
    },

    /// The table has no primary key to address rows by.
    #[snafu(display("Table {table} has no primary key"))]
    MissingPrimaryKey {
        /// Physical table name.
        table: String,
    },

    /// No row matched the primary key.
    #[snafu(display("No row in {table} matches the primary key"))]
    NotFound {
        /// Physical table name.
        table: String,
    },

    /// The live schema differs from the declared one.
    #[snafu(display("Table {table} is out of sync: {}", statements.join("; ")))]
    OutOfSync {
        /// Physical table name.
        table: String,
        /// Statements that would bring it in sync.
        statements: Vec<String>,
    },
}

impl TableError {
    /// True when the engine reported a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, TableError::Engine { source, .. } if source.is_unique_violation())
    }
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// One column changed by [`TableSpec::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDiff {
    /// Column name.
    pub column: String,
    /// Value before the mutation.
    pub before: SqlValue,
    /// Value after the mutation.
    pub after: SqlValue,
}

/// Structural contract shared by plain and split tables.
#[async_trait]
pub trait TableContract: Send + Sync {
    /// Logical table name.
    fn name(&self) -> &str;

    /// Declared columns.
    fn columns(&self) -> &[ColumnSpec];

    /// Primary-key columns.
    fn primary_columns(&self) -> Vec<&ColumnSpec> {
        self.columns().iter().filter(|c| c.primary).collect()
    }

    /// Column by name (case-insensitive).
    fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Rust type name of the record stored in the table.
    fn data_type(&self) -> &'static str;

    /// SQL source expression usable in a `FROM` clause.
    async fn expression(&self) -> String;

    /// Declare a secondary index; `false` when it can't be applied.
    async fn add_index(&mut self, unique: bool, columns: &[&str]) -> bool;

    /// Statements dropping foreign keys held by the table.
    fn drop_foreign_key_sql(&self) -> Vec<String>;
}

/// A physical table: name, layout and engine handle.
#[derive(Clone)]
pub struct TableSpec {
    name: String,
    columns: Vec<ColumnSpec>,
    indexes: Vec<IndexSpec>,
    auto_increment_offset: Option<i64>,
    data_type: &'static str,
    engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for TableSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSpec")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("indexes", &self.indexes)
            .field("auto_increment_offset", &self.auto_increment_offset)
            .finish_non_exhaustive()
    }
}

impl TableSpec {
    /// Spec for an arbitrary layout.
    pub fn new(
        engine: Arc<dyn Engine>,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
        indexes: Vec<IndexSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes,
            auto_increment_offset: None,
            data_type: "Row",
            engine,
        }
    }

    /// Spec for the layout declared by record type `R`.
    pub fn for_record<R: Record>(engine: Arc<dyn Engine>, name: impl Into<String>) -> Self {
        Self {
            data_type: std::any::type_name::<R>(),
            ..Self::new(engine, name, R::columns(), R::indexes())
        }
    }

    /// Same layout under another physical name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Set the first value the auto-increment column hands out.
    pub fn with_auto_increment_offset(mut self, offset: Option<i64>) -> Self {
        self.auto_increment_offset = offset;
        self
    }

    /// Physical table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Declared secondary indexes.
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Configured auto-increment start, if any.
    pub fn auto_increment_offset(&self) -> Option<i64> {
        self.auto_increment_offset
    }

    /// Engine handle.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The auto-increment column, if the layout has one.
    pub fn auto_increment_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    fn primary_keys(&self) -> Vec<&ColumnSpec> {
        self.columns.iter().filter(|c| c.primary).collect()
    }

    /// Register a secondary index in the declared layout. Returns `false` when an index
    /// of the same shape is already declared. DDL is issued by the next sync.
    pub fn register_index(&mut self, unique: bool, columns: &[&str]) -> bool {
        let candidate = if unique {
            IndexSpec::unique(columns)
        } else {
            IndexSpec::new(columns)
        };
        if self.indexes.iter().any(|idx| idx.same_shape(&candidate)) {
            return false;
        }
        self.indexes.push(candidate);
        true
    }

    /// Quoted name, usable as a query source.
    pub fn expression(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Query over this table.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.engine), self.expression())
    }

    /// True when the physical table exists.
    pub async fn exists(&self) -> TableResult<bool> {
        self.engine
            .table_exists(&self.name)
            .await
            .context(EngineSnafu { table: &self.name })
    }

    /// Drop the physical table if it exists.
    pub async fn drop_table(&self) -> TableResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.expression());
        self.execute_sql(&sql, &[]).await?;
        Ok(())
    }

    /// Create `index` on the physical table.
    pub async fn create_index(&self, index: &IndexSpec) -> TableResult<()> {
        self.execute_sql(&index.create_sql(&self.name), &[]).await?;
        Ok(())
    }

    async fn execute_sql(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> TableResult<crate::engine::ExecOutcome> {
        self.engine
            .execute(sql, params)
            .await
            .context(EngineSnafu { table: &self.name })
    }

    /// Columns and values to write for `row`; unassigned auto-increment
    /// keys (`0` or NULL) are left for the engine to allocate.
    fn insert_columns<'r>(&self, row: &'r Row) -> Vec<(&'r str, &'r SqlValue)> {
        row.iter()
            .filter(|(column, value)| {
                let unassigned = value.is_null() || value.as_i64() == Some(0);
                !(unassigned
                    && self
                        .column(column)
                        .is_some_and(|c| c.auto_increment))
            })
            .collect()
    }

    /// `INSERT` statement with literal values, used for previews.
    pub fn insert_sql_literal(&self, row: &Row) -> String {
        let pairs = self.insert_columns(row);
        let cols: Vec<String> = pairs.iter().map(|(c, _)| quote_identifier(c)).collect();
        let vals: Vec<String> = pairs.iter().map(|(_, v)| v.to_sql_literal()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.expression(),
            cols.join(", "),
            vals.join(", ")
        )
    }

    /// Insert `record`; returns the key the engine allocated (or the key the
    /// record already carried).
    pub async fn insert<R: Record>(&self, record: &R) -> TableResult<i64> {
        let row = record.to_row();
        let pairs = self.insert_columns(&row);
        let cols: Vec<String> = pairs.iter().map(|(c, _)| quote_identifier(c)).collect();
        let placeholders = vec!["?"; pairs.len()].join(", ");
        let params: Vec<SqlValue> = pairs.iter().map(|(_, v)| (*v).clone()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.expression(),
            cols.join(", ")
        );
        let outcome = self.execute_sql(&sql, &params).await?;
        Ok(outcome.last_insert_id.unwrap_or_default())
    }

    /// Row whose primary key equals `key` (single-column keys only).
    pub async fn fetch_by_key(&self, key: impl Into<SqlValue>) -> TableResult<Option<Row>> {
        let pk = self
            .primary_keys()
            .first()
            .map(|c| c.name.clone())
            .context(MissingPrimaryKeySnafu { table: &self.name })?;
        self.query()
            .equals(&pk, key)
            .first()
            .await
            .context(EngineSnafu { table: &self.name })
    }

    /// Populate `record` in place from the row matching its primary key.
    pub async fn fetch<R: Record>(&self, record: &mut R) -> TableResult<()> {
        let current = record.to_row();
        let keys = self.primary_keys();
        ensure!(!keys.is_empty(), MissingPrimaryKeySnafu { table: &self.name });

        let mut query = self.query();
        for key in keys {
            let value = current
                .require(&key.name)
                .context(RowSnafu { table: &self.name })?;
            query = query.equals(&key.name, value.clone());
        }
        let row = query
            .first()
            .await
            .context(EngineSnafu { table: &self.name })?
            .context(NotFoundSnafu { table: &self.name })?;
        *record = R::from_row(&row).context(RowSnafu { table: &self.name })?;
        Ok(())
    }

    /// Apply `mutate` to `record` and persist only the columns it changed.
    /// Rows are addressed by their primary key as it was before the mutation.
    pub async fn update<R, F>(&self, record: &mut R, mutate: F) -> TableResult<Vec<UpdateDiff>>
    where
        R: Record,
        F: FnOnce(&mut R) + Send,
    {
        let before = record.to_row();
        mutate(record);
        let after = record.to_row();

        let diffs: Vec<UpdateDiff> = after
            .iter()
            .filter_map(|(column, value)| {
                let old = before.get(column).cloned().unwrap_or(SqlValue::Null);
                (old != *value).then(|| UpdateDiff {
                    column: column.to_string(),
                    before: old,
                    after: value.clone(),
                })
            })
            .collect();
        if diffs.is_empty() {
            return Ok(diffs);
        }

        let keys = self.primary_keys();
        ensure!(!keys.is_empty(), MissingPrimaryKeySnafu { table: &self.name });

        let mut params: Vec<SqlValue> = diffs.iter().map(|d| d.after.clone()).collect();
        let sets: Vec<String> = diffs
            .iter()
            .map(|d| format!("{} = ?", quote_identifier(&d.column)))
            .collect();
        let mut wheres = Vec::with_capacity(keys.len());
        for key in keys {
            let value = before
                .require(&key.name)
                .context(RowSnafu { table: &self.name })?;
            params.push(value.clone());
            wheres.push(format!("{} = ?", quote_identifier(&key.name)));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.expression(),
            sets.join(", "),
            wheres.join(" AND ")
        );
        self.execute_sql(&sql, &params).await?;
        Ok(diffs)
    }

    /// `MIN`/`MAX` style aggregate over one column; NULL on an empty table.
    pub async fn aggregate(&self, function: &str, column: &str) -> TableResult<SqlValue> {
        let expr = format!("{function}({}) AS \"value\"", quote_identifier(column));
        let row = self
            .query()
            .select(&[expr])
            .first()
            .await
            .context(EngineSnafu { table: &self.name })?;
        Ok(row
            .and_then(|r| r.values().first().cloned())
            .unwrap_or(SqlValue::Null))
    }
}

#[async_trait]
impl TableContract for TableSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    fn data_type(&self) -> &'static str {
        self.data_type
    }

    async fn expression(&self) -> String {
        TableSpec::expression(self)
    }

    async fn add_index(&mut self, unique: bool, columns: &[&str]) -> bool {
        self.register_index(unique, columns)
    }

    /// Column specs carry no foreign keys, so there is never anything to drop.
    fn drop_foreign_key_sql(&self) -> Vec<String> {
        Vec::new()
    }
}
