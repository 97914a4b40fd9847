//! Operations-log record written by `splitable insert`.

use chrono::{DateTime, Utc};
use split_table_core::{ColumnSpec, IndexSpec, Record, Row, RowError, SplitRecord, SqlType};

pub const INDEX_COLUMN: &str = "id";
pub const DATE_COLUMN: &str = "ops_time";

/// One audit event: who did what to which object, and when.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub ops_time: DateTime<Utc>,
    pub obj_type: String,
    pub obj_id: i64,
    pub action: String,
    pub notes: Option<String>,
    pub success: bool,
}

impl Record for EventRecord {
    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new(INDEX_COLUMN, SqlType::Integer)
                .primary()
                .auto_increment(),
            ColumnSpec::new(DATE_COLUMN, SqlType::DateTime).not_null(),
            ColumnSpec::new("obj_type", SqlType::Text)
                .not_null()
                .default_value("''"),
            ColumnSpec::new("obj_id", SqlType::Integer)
                .not_null()
                .default_value("0"),
            ColumnSpec::new("action", SqlType::Text)
                .not_null()
                .default_value("''"),
            ColumnSpec::new("notes", SqlType::Text),
            ColumnSpec::new("success", SqlType::Boolean)
                .not_null()
                .default_value("1"),
        ]
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::new(&["obj_type", "obj_id"])]
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with(INDEX_COLUMN, self.id)
            .with(DATE_COLUMN, self.ops_time)
            .with("obj_type", self.obj_type.as_str())
            .with("obj_id", self.obj_id)
            .with("action", self.action.as_str())
            .with("notes", self.notes.clone())
            .with("success", self.success)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get_i64(INDEX_COLUMN)?.unwrap_or_default(),
            ops_time: row.get_datetime(DATE_COLUMN)?.unwrap_or_default(),
            obj_type: row.get_string("obj_type")?.unwrap_or_default(),
            obj_id: row.get_i64("obj_id")?.unwrap_or_default(),
            action: row.get_string("action")?.unwrap_or_default(),
            notes: row.get_string("notes")?,
            success: row.get_bool("success")?.unwrap_or(true),
        })
    }
}

impl SplitRecord for EventRecord {
    fn split_index(&self) -> i64 {
        self.id
    }

    fn set_split_index(&mut self, index: i64) {
        self.id = index;
    }

    fn split_date(&self) -> Option<DateTime<Utc>> {
        Some(self.ops_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn row_conversion_keeps_every_field() {
        let event = EventRecord {
            id: 3,
            ops_time: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            obj_type: "user".to_string(),
            obj_id: 42,
            action: "login".to_string(),
            notes: None,
            success: false,
        };
        let back = EventRecord::from_row(&event.to_row()).unwrap();
        assert_eq!(back, event);
    }
}
