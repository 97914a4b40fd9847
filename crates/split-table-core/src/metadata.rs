//! Segment catalog.
//!
//! Every split table keeps its segment history in `<logical>_metadata`. Rows
//! are never hard-deleted: purge only flips `deleted` and stamps
//! `delete_at`, so the catalog doubles as an audit trail of dropped
//! segments.
//!
//! Two unique indexes guard the catalog. One keeps physical names unique;
//! the other is partial and admits a single open (`end IS NULL`) live
//! segment, which turns concurrent roll-overs into a unique violation for
//! the loser instead of two competing open segments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    engine::Engine,
    record::{MissingColumnSnafu, Record, Row, RowError},
    schema::{ColumnSpec, IndexSpec, SqlType},
    table::{EngineSnafu, RowSnafu, TableResult, TableSpec, UpdateDiff},
    value::quote_identifier,
};

/// Suffix appended to the logical name to form the catalog table name.
pub const METADATA_SUFFIX: &str = "_metadata";

/// One segment's catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Catalog key; `0` until inserted.
    pub id: i64,
    /// Physical segment table name.
    pub table: String,
    /// First index in the segment (inclusive). `None` means from the beginning.
    pub start: Option<i64>,
    /// Last index in the segment (inclusive). `None` while the segment is open.
    pub end: Option<i64>,
    /// Date of the first row. `None` until the first insert lands.
    pub start_date: Option<DateTime<Utc>>,
    /// Date of the last row. `None` while open.
    pub end_date: Option<DateTime<Utc>>,
    /// Soft-delete marker set by purge.
    pub deleted: bool,
    /// When purge dropped the segment.
    pub delete_at: Option<DateTime<Utc>>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl TableMetadata {
    /// New open segment entry.
    pub fn new(
        table: impl Into<String>,
        start: Option<i64>,
        start_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: 0,
            table: table.into(),
            start,
            end: None,
            start_date,
            end_date: None,
            deleted: false,
            delete_at: None,
            created_at: Utc::now(),
        }
    }

    /// True while the segment accepts writes.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// True when `index` falls in `[start, end]`; missing bounds are open.
    pub fn contains_index(&self, index: i64) -> bool {
        self.start.map_or(true, |start| start <= index) && self.end.map_or(true, |end| index <= end)
    }
}

impl Record for TableMetadata {
    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", SqlType::Integer)
                .primary()
                .auto_increment(),
            ColumnSpec::new("table", SqlType::Text).not_null(),
            ColumnSpec::new("start", SqlType::Integer),
            ColumnSpec::new("end", SqlType::Integer),
            ColumnSpec::new("start_date", SqlType::DateTime),
            ColumnSpec::new("end_date", SqlType::DateTime),
            ColumnSpec::new("deleted", SqlType::Boolean)
                .not_null()
                .default_value("0"),
            ColumnSpec::new("delete_at", SqlType::DateTime),
            ColumnSpec::new("created_at", SqlType::DateTime).not_null(),
        ]
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique(&["table"]),
            IndexSpec::unique(&["deleted"]).with_predicate(format!(
                "{} IS NULL AND {} = 0",
                quote_identifier("end"),
                quote_identifier("deleted")
            )),
        ]
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("table", self.table.as_str())
            .with("start", self.start)
            .with("end", self.end)
            .with("start_date", self.start_date)
            .with("end_date", self.end_date)
            .with("deleted", self.deleted)
            .with("delete_at", self.delete_at)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            id: row.get_i64("id")?.unwrap_or_default(),
            table: row
                .get_string("table")?
                .context(MissingColumnSnafu { column: "table" })?,
            start: row.get_i64("start")?,
            end: row.get_i64("end")?,
            start_date: row.get_datetime("start_date")?,
            end_date: row.get_datetime("end_date")?,
            deleted: row.get_bool("deleted")?.unwrap_or(false),
            delete_at: row.get_datetime("delete_at")?,
            created_at: row
                .get_datetime("created_at")?
                .context(MissingColumnSnafu {
                    column: "created_at",
                })?,
        })
    }
}

/// Persistent catalog of one split table's segments.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    spec: TableSpec,
}

impl MetadataStore {
    /// Catalog for logical table `logical`, stored in `<logical>_metadata`.
    pub fn new(engine: Arc<dyn Engine>, logical: &str) -> Self {
        let name = format!("{logical}{METADATA_SUFFIX}");
        Self {
            spec: TableSpec::for_record::<TableMetadata>(engine, name),
        }
    }

    /// Physical spec of the catalog table.
    pub fn table_spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Catalog table name.
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// True once the catalog table has been created.
    pub async fn exists(&self) -> TableResult<bool> {
        self.spec.exists().await
    }

    async fn list(&self, live_only: bool) -> TableResult<Vec<TableMetadata>> {
        let mut query = self.spec.query();
        if live_only {
            query = query.equals("deleted", false);
        }
        let rows = query
            .asc("id")
            .all()
            .await
            .context(EngineSnafu { table: self.name() })?;
        rows.iter()
            .map(TableMetadata::from_row)
            .collect::<Result<_, _>>()
            .context(RowSnafu { table: self.name() })
    }

    /// Live (not soft-deleted) segments, oldest first. Empty for a brand new
    /// split table.
    pub async fn get_table_metas(&self) -> TableResult<Vec<TableMetadata>> {
        self.list(true).await
    }

    /// Every segment ever created, including purged ones, oldest first.
    pub async fn get_all_metas(&self) -> TableResult<Vec<TableMetadata>> {
        self.list(false).await
    }

    /// Persist a new entry and store its allocated id in `meta.id`.
    pub async fn insert(&self, meta: &mut TableMetadata) -> TableResult<()> {
        meta.id = self.spec.insert(meta).await?;
        Ok(())
    }

    /// Apply `mutate` to `meta` and persist the changed columns.
    pub async fn update<F>(&self, meta: &mut TableMetadata, mutate: F) -> TableResult<Vec<UpdateDiff>>
    where
        F: FnOnce(&mut TableMetadata) + Send,
    {
        self.spec.update(meta, mutate).await
    }

    /// True when any entry, purged or not, already uses `table`.
    pub async fn name_taken(&self, table: &str) -> TableResult<bool> {
        let found = self
            .spec
            .query()
            .equals("table", table)
            .count()
            .await
            .context(EngineSnafu { table: self.name() })?;
        Ok(found > 0)
    }

    /// Id the next inserted entry is expected to get.
    pub async fn next_id(&self) -> TableResult<i64> {
        let max = self.spec.aggregate("MAX", "id").await?;
        Ok(max.as_i64().unwrap_or_default() + 1)
    }

    /// Statements creating or evolving the catalog table.
    pub async fn sync_sql(&self) -> TableResult<Vec<String>> {
        self.spec.sync_sql().await
    }

    /// Create or evolve the catalog table.
    pub async fn sync(&self) -> TableResult<()> {
        self.spec.sync().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sqlite::SqliteEngine;
    use chrono::TimeZone;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn store(tmp: &TempDir) -> Result<MetadataStore, Box<dyn std::error::Error>> {
        let engine = SqliteEngine::open(&tmp.path().join("meta.db")).await?;
        let store = MetadataStore::new(Arc::new(engine), "opslog");
        store.sync().await?;
        Ok(store)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn contains_index_treats_missing_bounds_as_open() {
        let mut meta = TableMetadata::new("t_1", Some(101), None);
        assert!(meta.contains_index(101));
        assert!(meta.contains_index(i64::MAX));
        assert!(!meta.contains_index(100));

        meta.end = Some(250);
        assert!(meta.contains_index(250));
        assert!(!meta.contains_index(251));
        assert!(!meta.is_open());

        let legacy = TableMetadata::new("t", None, None);
        assert!(legacy.contains_index(-5));
    }

    #[tokio::test]
    async fn insert_list_and_update_round_trip() -> TestResult {
        let tmp = TempDir::new()?;
        let store = store(&tmp).await?;
        assert_eq!(store.name(), "opslog_metadata");
        assert!(store.get_table_metas().await?.is_empty());
        assert_eq!(store.next_id().await?, 1);

        let mut first = TableMetadata::new("opslog_1", Some(1), Some(at(1)));
        store.insert(&mut first).await?;
        assert_eq!(first.id, 1);

        let diffs = store
            .update(&mut first, |m| {
                m.end = Some(40);
                m.end_date = Some(at(2));
            })
            .await?;
        let changed: Vec<&str> = diffs.iter().map(|d| d.column.as_str()).collect();
        assert_eq!(changed, vec!["end", "end_date"]);

        let mut second = TableMetadata::new("opslog_2", Some(41), Some(at(3)));
        store.insert(&mut second).await?;

        let metas = store.get_table_metas().await?;
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].table, "opslog_1");
        assert_eq!(metas[0].end, Some(40));
        assert_eq!(metas[0].end_date, Some(at(2)));
        assert_eq!(metas[1].start, Some(41));
        assert!(metas[1].is_open());
        assert!(store.name_taken("opslog_2").await?);
        assert!(!store.name_taken("opslog_3").await?);
        Ok(())
    }

    #[tokio::test]
    async fn soft_deleted_entries_stay_in_history() -> TestResult {
        let tmp = TempDir::new()?;
        let store = store(&tmp).await?;
        let mut first = TableMetadata::new("opslog_1", Some(1), Some(at(1)));
        store.insert(&mut first).await?;
        store
            .update(&mut first, |m| {
                m.end = Some(10);
                m.deleted = true;
                m.delete_at = Some(at(9));
            })
            .await?;

        assert!(store.get_table_metas().await?.is_empty());
        let all = store.get_all_metas().await?;
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted);
        assert_eq!(all[0].delete_at, Some(at(9)));
        assert!(store.name_taken("opslog_1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn second_open_segment_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let store = store(&tmp).await?;
        let mut first = TableMetadata::new("opslog_1", Some(1), Some(at(1)));
        store.insert(&mut first).await?;

        let mut rival = TableMetadata::new("opslog_2", Some(1), Some(at(1)));
        let err = store.insert(&mut rival).await.unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {err}");
        Ok(())
    }
}
