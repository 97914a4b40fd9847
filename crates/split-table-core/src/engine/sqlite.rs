//! SQLite [`Engine`] backed by an `sqlx` connection pool.
//!
//! Auto-increment offsets rely on SQLite's `sqlite_sequence` table, which
//! is created with the first `AUTOINCREMENT` table; see
//! [`TableSpec::create_sql`](crate::TableSpec::create_sql).

use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use log::debug;
use snafu::prelude::*;
use sqlx::{
    Column as _, Decode, Row as _, Sqlite, TypeInfo, ValueRef,
    query::Query,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
        SqliteValueRef,
    },
};

use crate::{
    engine::{ColumnInfo, ConnectSnafu, Engine, EngineError, EngineResult, ExecOutcome},
    record::Row,
    value::{SqlValue, format_datetime, quote_literal},
};

/// Default pool size for file-backed databases.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// SQLite engine.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
}

impl SqliteEngine {
    /// Open (creating if needed) a database file.
    pub async fn open(path: &Path) -> EngineResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context(ConnectSnafu {
                url: path.display().to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Connect using an `sqlite:` URL.
    pub async fn connect(url: &str) -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .context(ConnectSnafu { url })?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context(ConnectSnafu { url })?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Blob(v) => query.bind(v.as_slice()),
        SqlValue::Boolean(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(format_datetime(v)),
    }
}

fn build_query<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), bind_value)
}

fn map_sqlx_error(sql: &str, source: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db) = &source {
        if db.is_unique_violation() {
            return EngineError::UniqueViolation {
                sql: sql.to_string(),
                message: db.message().to_string(),
            };
        }
    }
    EngineError::Database {
        sql: sql.to_string(),
        source,
    }
}

fn decode_error<'a>(
    column: &'a str,
    type_name: &'static str,
) -> impl FnOnce(Box<dyn std::error::Error + Send + Sync>) -> EngineError + 'a {
    move |source| EngineError::Decode {
        column: column.to_string(),
        type_name,
        source,
    }
}

/// Convert a borrowed SQLite value into an owned [`SqlValue`].
///
/// SQLite reports the storage class of each value, so booleans come back as
/// INTEGER and datetimes as TEXT; typed views on [`SqlValue`] handle both.
fn value_from_sqlite(column: &str, raw: SqliteValueRef<'_>) -> EngineResult<SqlValue> {
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "NULL" => Ok(SqlValue::Null),
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
            let v = <i64 as Decode<'_, Sqlite>>::decode(raw)
                .map_err(decode_error(column, "INTEGER"))?;
            Ok(SqlValue::Integer(v))
        }
        "REAL" | "NUMERIC" => {
            let v = <f64 as Decode<'_, Sqlite>>::decode(raw)
                .map_err(decode_error(column, "REAL"))?;
            Ok(SqlValue::Real(v))
        }
        "TEXT" | "DATETIME" | "DATE" | "TIME" => {
            let v = <String as Decode<'_, Sqlite>>::decode(raw)
                .map_err(decode_error(column, "TEXT"))?;
            Ok(SqlValue::Text(v))
        }
        "BLOB" => {
            let v = <Vec<u8> as Decode<'_, Sqlite>>::decode(raw)
                .map_err(decode_error(column, "BLOB"))?;
            Ok(SqlValue::Blob(v))
        }
        _ => Err(EngineError::UnsupportedValue {
            column: column.to_string(),
            type_name,
        }),
    }
}

fn row_from_sqlite(row: &SqliteRow) -> EngineResult<Row> {
    let mut out = Row::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(i)
            .map_err(|source| EngineError::Database {
                sql: format!("<column {name}>"),
                source,
            })?;
        out.push(name, value_from_sqlite(name, raw)?);
    }
    Ok(out)
}

#[async_trait]
impl Engine for SqliteEngine {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> EngineResult<ExecOutcome> {
        debug!("execute: {sql}");
        let result = build_query(sql, params)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> EngineResult<Vec<Row>> {
        debug!("query: {sql}");
        let rows = build_query(sql, params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        rows.iter().map(row_from_sqlite).collect()
    }

    async fn describe_columns(&self, table: &str) -> EngineResult<Option<Vec<ColumnInfo>>> {
        let sql = format!("PRAGMA table_info({})", quote_literal(table));
        let rows = self.query(&sql, &[]).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: text_field(row, "name"),
                declared_type: text_field(row, "type"),
                not_null: int_field(row, "notnull") != 0,
                primary: int_field(row, "pk") != 0,
            })
            .collect();
        Ok(Some(columns))
    }

    async fn index_names(&self, table: &str) -> EngineResult<Vec<String>> {
        let sql = format!("PRAGMA index_list({})", quote_literal(table));
        let rows = self.query(&sql, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| text_field(row, "name"))
            .filter(|name| !name.starts_with("sqlite_autoindex_"))
            .collect())
    }
}

fn text_field(row: &Row, column: &str) -> String {
    row.get(column)
        .and_then(SqlValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(SqlValue::as_i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn open_temp() -> Result<(TempDir, SqliteEngine), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let engine = SqliteEngine::open(&tmp.path().join("engine.db")).await?;
        Ok((tmp, engine))
    }

    #[tokio::test]
    async fn describe_missing_table_returns_none() -> TestResult {
        let (_tmp, engine) = open_temp().await?;
        assert!(engine.describe_columns("nope").await?.is_none());
        assert!(!engine.table_exists("nope").await?);
        Ok(())
    }

    #[tokio::test]
    async fn execute_reports_last_insert_id_and_query_decodes_values() -> TestResult {
        let (_tmp, engine) = open_temp().await?;
        engine
            .execute(
                "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" TEXT, \"score\" REAL, \"flag\" BOOLEAN)",
                &[],
            )
            .await?;
        let params = vec![
            SqlValue::from("alpha"),
            SqlValue::Real(1.5),
            SqlValue::Boolean(true),
        ];
        let outcome = engine
            .execute(
                "INSERT INTO \"t\" (\"name\", \"score\", \"flag\") VALUES (?, ?, ?)",
                &params,
            )
            .await?;
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let rows = engine.query("SELECT * FROM \"t\"", &[]).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_string("name")?, Some("alpha".to_string()));
        assert_eq!(rows[0].get_f64("score")?, Some(1.5));
        assert_eq!(rows[0].get_bool("flag")?, Some(true));

        let cols = engine.describe_columns("t").await?.unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "score", "flag"]);
        assert!(cols[0].primary);
        Ok(())
    }

    #[tokio::test]
    async fn unique_violation_is_classified() -> TestResult {
        let (_tmp, engine) = open_temp().await?;
        engine
            .execute("CREATE TABLE \"u\" (\"k\" TEXT)", &[])
            .await?;
        engine
            .execute("CREATE UNIQUE INDEX \"uix_u_k\" ON \"u\" (\"k\")", &[])
            .await?;
        let params = vec![SqlValue::from("x")];
        engine
            .execute("INSERT INTO \"u\" (\"k\") VALUES (?)", &params)
            .await?;
        let err = engine
            .execute("INSERT INTO \"u\" (\"k\") VALUES (?)", &params)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {err}");
        assert_eq!(engine.index_names("u").await?, vec!["uix_u_k".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn scalar_of_empty_result_is_null() -> TestResult {
        let (_tmp, engine) = open_temp().await?;
        engine
            .execute("CREATE TABLE \"e\" (\"v\" INTEGER)", &[])
            .await?;
        let v = engine
            .query_scalar("SELECT \"v\" FROM \"e\"", &[])
            .await?;
        assert_eq!(v, SqlValue::Null);
        let max = engine
            .query_scalar("SELECT MAX(\"v\") FROM \"e\"", &[])
            .await?;
        assert_eq!(max, SqlValue::Null);
        Ok(())
    }
}
