//! Terminal rendering for catalog entries and exported rows.

use clap::ValueEnum;
use serde_json::{Map, Value};
use snafu::ResultExt;
use split_table_core::{ColumnSpec, Row, SqlValue, TableMetadata};
use tabled::{builder::Builder, settings::Style};

use crate::error::{CliResult, RenderJsonSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

const META_HEADERS: [&str; 9] = [
    "id",
    "table",
    "start",
    "end",
    "start_date",
    "end_date",
    "deleted",
    "delete_at",
    "created_at",
];

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn render_grid<H: AsRef<str>>(headers: &[H], rows: Vec<Vec<String>>) -> String {
    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(|h| h.as_ref().to_string()));
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

pub fn render_metas(metas: &[TableMetadata], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(metas).context(RenderJsonSnafu),
        OutputFormat::Table => {
            if metas.is_empty() {
                return Ok("(no segments)".to_string());
            }
            let rows = metas
                .iter()
                .map(|m| {
                    vec![
                        m.id.to_string(),
                        m.table.clone(),
                        opt(m.start),
                        opt(m.end),
                        opt(m.start_date.map(|d| d.to_rfc3339())),
                        opt(m.end_date.map(|d| d.to_rfc3339())),
                        m.deleted.to_string(),
                        opt(m.delete_at.map(|d| d.to_rfc3339())),
                        m.created_at.to_rfc3339(),
                    ]
                })
                .collect();
            Ok(render_grid(&META_HEADERS, rows))
        }
    }
}

fn json_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::from(*v),
        SqlValue::Real(v) => Value::from(*v),
        SqlValue::Boolean(v) => Value::from(*v),
        SqlValue::DateTime(v) => Value::from(v.to_rfc3339()),
        other => Value::from(other.to_string()),
    }
}

pub fn render_rows(rows: &[Row], format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => {
            let objects: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let map: Map<String, Value> = row
                        .iter()
                        .map(|(c, v)| (c.to_string(), json_value(v)))
                        .collect();
                    Value::Object(map)
                })
                .collect();
            serde_json::to_string_pretty(&objects).context(RenderJsonSnafu)
        }
        OutputFormat::Table => {
            let Some(first) = rows.first() else {
                return Ok("(no rows)".to_string());
            };
            let body = rows
                .iter()
                .map(|row| row.values().iter().map(ToString::to_string).collect())
                .collect();
            Ok(render_grid(first.columns(), body))
        }
    }
}

pub fn render_columns(columns: &[ColumnSpec]) -> String {
    let rows = columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.sql_type.declared().to_string(),
                c.primary.to_string(),
                c.auto_increment.to_string(),
                c.nullable.to_string(),
                opt(c.default.as_ref()),
            ]
        })
        .collect();
    render_grid(
        &["column", "type", "primary", "auto_increment", "nullable", "default"],
        rows,
    )
}
