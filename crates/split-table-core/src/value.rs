//! Owned SQL values exchanged with the relational engine.
//!
//! [`SqlValue`] is the single currency between records, the query builder
//! and the [`Engine`](crate::Engine) trait. It can be bound as a statement
//! parameter or rendered as a SQL literal (used when previewing DDL/DML via
//! `sync_sql`).
//!
//! Datetimes are stored as fixed-width UTC text (`2025-01-01 00:00:00.000000`)
//! so that lexical order equals chronological order, which keeps `MIN`/`MAX`
//! aggregates over date columns meaningful.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Storage format for datetime values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// An owned SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE floating point.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Boolean, stored as 0/1.
    Boolean(bool),
    /// UTC timestamp, stored as [`DATETIME_FORMAT`] text.
    DateTime(DateTime<Utc>),
}

impl SqlValue {
    /// True for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view; booleans map to 0/1.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Boolean(v) => Some(i64::from(*v)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view; any non-zero integer is true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Boolean(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Datetime view; text is parsed with [`parse_datetime`].
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::DateTime(dt) => Some(*dt),
            SqlValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Render the value as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::Real(v) if v.is_finite() => format!("{v:?}"),
            SqlValue::Real(_) => "NULL".to_string(),
            SqlValue::Text(s) => quote_literal(s),
            SqlValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            SqlValue::Boolean(v) => i64::from(*v).to_string(),
            SqlValue::DateTime(dt) => quote_literal(&format_datetime(dt)),
        }
    }

    /// Short name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
            SqlValue::Boolean(_) => "BOOLEAN",
            SqlValue::DateTime(_) => "DATETIME",
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str(""),
            SqlValue::Integer(v) => write!(f, "{v}"),
            SqlValue::Real(v) => write!(f, "{v}"),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
            SqlValue::Boolean(v) => write!(f, "{v}"),
            SqlValue::DateTime(dt) => f.write_str(&format_datetime(dt)),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Boolean(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Format a timestamp in the storage format.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored datetime. Accepts the storage format (with or without
/// fractional seconds) and RFC 3339.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Quote an identifier (table or column name) for SQL.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Quote a string literal for SQL.
pub fn quote_literal(raw: &str) -> String {
    let escaped = raw.replace('\'', "''");
    format!("'{escaped}'")
}
