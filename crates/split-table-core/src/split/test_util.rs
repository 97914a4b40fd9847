use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::{
    engine::{Engine, sqlite::SqliteEngine},
    record::{Record, Row, RowError, SplitRecord},
    schema::{ColumnSpec, SqlType},
};

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Minimal split record: key, timestamp and two payload columns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Event {
    pub(crate) id: i64,
    pub(crate) at: DateTime<Utc>,
    pub(crate) level: i64,
    pub(crate) note: Option<String>,
}

impl Event {
    pub(crate) fn at(at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            at,
            level: 0,
            note: None,
        }
    }
}

impl Record for Event {
    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", SqlType::Integer)
                .primary()
                .auto_increment(),
            ColumnSpec::new("at", SqlType::DateTime).not_null(),
            ColumnSpec::new("level", SqlType::Integer)
                .not_null()
                .default_value("0"),
            ColumnSpec::new("note", SqlType::Text),
        ]
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("at", self.at)
            .with("level", self.level)
            .with("note", self.note.clone())
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get_i64("id")?.unwrap_or_default(),
            at: row.get_datetime("at")?.unwrap_or_default(),
            level: row.get_i64("level")?.unwrap_or_default(),
            note: row.get_string("note")?,
        })
    }
}

impl SplitRecord for Event {
    fn split_index(&self) -> i64 {
        self.id
    }

    fn set_split_index(&mut self, index: i64) {
        self.id = index;
    }

    fn split_date(&self) -> Option<DateTime<Utc>> {
        Some(self.at)
    }
}

/// Record with an optional date and a second, manually assigned key column.
/// Only used where no table is ever materialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Draft {
    pub(crate) id: i64,
    pub(crate) ref_no: i64,
    pub(crate) at: Option<DateTime<Utc>>,
}

impl Record for Draft {
    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", SqlType::Integer)
                .primary()
                .auto_increment(),
            ColumnSpec::new("ref_no", SqlType::Integer).primary(),
            ColumnSpec::new("at", SqlType::DateTime),
        ]
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("ref_no", self.ref_no)
            .with("at", self.at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get_i64("id")?.unwrap_or_default(),
            ref_no: row.get_i64("ref_no")?.unwrap_or_default(),
            at: row.get_datetime("at")?,
        })
    }
}

impl SplitRecord for Draft {
    fn split_index(&self) -> i64 {
        self.id
    }

    fn set_split_index(&mut self, index: i64) {
        self.id = index;
    }

    fn split_date(&self) -> Option<DateTime<Utc>> {
        self.at
    }
}

/// File-backed SQLite engine in a fresh temp dir. Keep the dir alive for
/// the duration of the test.
pub(crate) async fn temp_engine() -> Result<(TempDir, Arc<dyn Engine>), Box<dyn std::error::Error>>
{
    let tmp = TempDir::new()?;
    let engine = SqliteEngine::open(&tmp.path().join("split.db")).await?;
    Ok((tmp, Arc::new(engine)))
}

/// `2025-01-01T00:00:00Z` plus `hours`.
pub(crate) fn ts(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}
