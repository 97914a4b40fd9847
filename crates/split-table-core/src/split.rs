//! Split-table façade.
//!
//! A [`SplitTableSpec`] presents one logical table over a sequence of
//! physical segment tables listed in its [`MetadataStore`]. Writes go to the
//! newest (open) segment and roll over to a fresh one once the open segment
//! spans more than `max_duration`; reads see the `UNION ALL` of every live
//! segment; point fetches go straight to the segment whose index range holds
//! the key.
//!
//! No segment state is cached in memory. Every operation reads the catalog,
//! so several processes can share one logical table.
//!
//! Submodules:
//! - `insert`: roll-over policy and the write path.
//! - `purge`: retention of the newest `max_segments` segments.
//! - `sync`: catalog/segment DDL and adoption of a legacy unsegmented table.

pub mod error;
mod insert;
mod purge;
mod sync;

use std::{fmt, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use log::warn;
use snafu::prelude::*;

pub use error::{SplitResult, SplitTableError};
use error::{
    AddIndexSnafu, DecodeSnafu, FetchRowSnafu, ListMetadataSnafu, NotFoundSnafu,
    NotSupportedSnafu, QuerySnafu, SegmentNotFoundSnafu,
};

use crate::{
    config::SplitTableConfig,
    engine::Engine,
    metadata::{MetadataStore, TableMetadata},
    query::Query,
    record::{Row, SplitRecord},
    schema::{
        ColumnSpec, ConfigError, DateNotDateTimeSnafu, DurationOutOfRangeSnafu,
        IndexNotAutoIncrementSnafu, IndexNotPrimarySnafu, IndexSpec, MissingDateColumnSnafu,
        MissingIndexColumnSnafu, SqlType,
    },
    table::{TableContract, TableError, TableSpec},
    value::quote_identifier,
};

/// Page size used by [`SplitTableSpec::export_segment`] when none is given.
pub const DEFAULT_EXPORT_LIMIT: u64 = 1024;

/// Auto-increment start of the first segment when the prototype sets none.
const DEFAULT_FIRST_INDEX: i64 = 1;

/// A logical table stored as time-bounded segments.
pub struct SplitTableSpec<R: SplitRecord> {
    name: String,
    index_column: String,
    date_column: String,
    max_duration: Option<chrono::Duration>,
    max_segments: Option<usize>,
    prototype: TableSpec,
    metadata: MetadataStore,
    _record: PhantomData<fn() -> R>,
}

impl<R: SplitRecord> Clone for SplitTableSpec<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            index_column: self.index_column.clone(),
            date_column: self.date_column.clone(),
            max_duration: self.max_duration,
            max_segments: self.max_segments,
            prototype: self.prototype.clone(),
            metadata: self.metadata.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: SplitRecord> fmt::Debug for SplitTableSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitTableSpec")
            .field("name", &self.name)
            .field("index_column", &self.index_column)
            .field("date_column", &self.date_column)
            .field("max_duration", &self.max_duration)
            .field("max_segments", &self.max_segments)
            .finish_non_exhaustive()
    }
}

impl<R: SplitRecord> SplitTableSpec<R> {
    /// Build a split table over `engine` for record type `R`.
    ///
    /// `index_column` must be the auto-increment integer primary key and
    /// `date_column` a datetime column of `R`. `max_duration` bounds the span
    /// of one segment (no roll-over when `None`); `max_segments` is the
    /// number of live segments [`purge`](Self::purge) keeps (no purge when
    /// `None`). Zero values for either limit mean "unset".
    ///
    /// # Errors
    /// Returns [`ConfigError`] when either column is missing or has the wrong
    /// shape, or when `max_duration` does not fit a signed duration.
    pub fn new(
        engine: Arc<dyn Engine>,
        table: &str,
        index_column: &str,
        date_column: &str,
        max_duration: Option<std::time::Duration>,
        max_segments: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let prototype = TableSpec::for_record::<R>(Arc::clone(&engine), table);

        let index = prototype
            .column(index_column)
            .context(MissingIndexColumnSnafu {
                table,
                column: index_column,
            })?;
        ensure!(
            index.primary,
            IndexNotPrimarySnafu {
                table,
                column: index_column,
            }
        );
        ensure!(
            index.is_auto_increment_integer(),
            IndexNotAutoIncrementSnafu {
                table,
                column: index_column,
            }
        );
        let index_column = index.name.clone();

        let date = prototype
            .column(date_column)
            .context(MissingDateColumnSnafu {
                table,
                column: date_column,
            })?;
        ensure!(
            date.sql_type == SqlType::DateTime,
            DateNotDateTimeSnafu {
                table,
                column: date_column,
                found: date.sql_type,
            }
        );
        let date_column = date.name.clone();

        let max_duration = match max_duration.filter(|d| !d.is_zero()) {
            Some(d) => Some(
                chrono::Duration::from_std(d)
                    .ok()
                    .context(DurationOutOfRangeSnafu { table })?,
            ),
            None => None,
        };

        Ok(Self {
            name: table.to_string(),
            index_column,
            date_column,
            max_duration,
            max_segments: max_segments.filter(|&n| n > 0),
            metadata: MetadataStore::new(engine, table),
            prototype,
            _record: PhantomData,
        })
    }

    /// Build a split table from a [`SplitTableConfig`].
    pub fn from_config(engine: Arc<dyn Engine>, config: &SplitTableConfig) -> Result<Self, ConfigError> {
        let span = config.max_span()?;
        Self::new(
            engine,
            &config.table,
            &config.index_column,
            &config.date_column,
            span.map(|s| s.as_duration()),
            config.max_segments,
        )
    }

    /// Set the first index handed out by the very first segment.
    pub fn with_auto_increment_offset(mut self, offset: Option<i64>) -> Self {
        self.prototype = self.prototype.with_auto_increment_offset(offset);
        self
    }

    /// Logical table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index (primary key) column.
    pub fn index_column(&self) -> &str {
        &self.index_column
    }

    /// Date column driving roll-over.
    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    /// Maximum span of one segment.
    pub fn max_duration(&self) -> Option<chrono::Duration> {
        self.max_duration
    }

    /// Number of live segments purge keeps.
    pub fn max_segments(&self) -> Option<usize> {
        self.max_segments
    }

    /// Shared segment layout.
    pub fn prototype(&self) -> &TableSpec {
        &self.prototype
    }

    /// Segment catalog.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(self.prototype.engine())
    }

    fn first_index(&self) -> i64 {
        self.prototype
            .auto_increment_offset()
            .unwrap_or(DEFAULT_FIRST_INDEX)
    }

    /// Live segments, oldest first.
    pub async fn get_table_metas(&self) -> SplitResult<Vec<TableMetadata>> {
        self.metadata
            .get_table_metas()
            .await
            .context(ListMetadataSnafu { table: &self.name })
    }

    /// Every segment ever created, purged ones included.
    pub async fn get_all_metas(&self) -> SplitResult<Vec<TableMetadata>> {
        self.metadata
            .get_all_metas()
            .await
            .context(ListMetadataSnafu { table: &self.name })
    }

    /// Physical table for `meta`: the prototype under the segment's name,
    /// with keys continuing from the segment's start.
    pub fn get_table_spec(&self, meta: &TableMetadata) -> TableSpec {
        self.prototype
            .with_name(meta.table.as_str())
            .with_auto_increment_offset(meta.start)
    }

    /// `UNION ALL` of every live segment, as a parenthesized source
    /// expression. The quoted logical name when no segment exists yet.
    pub async fn try_expression(&self) -> SplitResult<String> {
        let metas = self.get_table_metas().await?;
        if metas.is_empty() {
            return Ok(quote_identifier(&self.name));
        }
        let selects: Vec<String> = metas
            .iter()
            .map(|meta| format!("SELECT * FROM {}", quote_identifier(&meta.table)))
            .collect();
        Ok(format!("({})", selects.join(" UNION ALL ")))
    }

    /// Like [`try_expression`](Self::try_expression), but falls back to the
    /// quoted logical name when the catalog can't be read.
    pub async fn expression(&self) -> String {
        match self.try_expression().await {
            Ok(expr) => expr,
            Err(err) => {
                warn!("split table {}: falling back to bare table name: {err}", self.name);
                quote_identifier(&self.name)
            }
        }
    }

    /// Query handle over all live segments.
    pub fn instance(&self) -> SplitInstance<'_, R> {
        SplitInstance { spec: self }
    }

    /// Populate `record` from the segment holding its index.
    pub async fn fetch(&self, record: &mut R) -> SplitResult<()> {
        let index = record.split_index();
        let metas = self.get_table_metas().await?;
        let meta = metas
            .iter()
            .find(|meta| meta.contains_index(index))
            .context(NotFoundSnafu {
                table: &self.name,
                index,
            })?;
        match self.get_table_spec(meta).fetch(record).await {
            Ok(()) => Ok(()),
            Err(TableError::NotFound { .. }) => NotFoundSnafu {
                table: &self.name,
                index,
            }
            .fail(),
            Err(source) => Err(source).context(FetchRowSnafu {
                table: meta.table.as_str(),
            }),
        }
    }

    /// Declare a secondary index and create it on every live segment.
    /// Segments created later get it from the prototype.
    /// The prototype is left untouched when any step fails.
    pub async fn try_add_index(&mut self, unique: bool, columns: &[&str]) -> SplitResult<()> {
        let index = if unique {
            IndexSpec::unique(columns)
        } else {
            IndexSpec::new(columns)
        };
        let metas = self.get_table_metas().await?;
        for meta in &metas {
            self.get_table_spec(meta)
                .create_index(&index)
                .await
                .context(AddIndexSnafu { table: meta.table.as_str() })?;
        }
        self.prototype.register_index(unique, columns);
        Ok(())
    }

    /// Like [`try_add_index`](Self::try_add_index), reporting failure as
    /// `false`.
    pub async fn add_index(&mut self, unique: bool, columns: &[&str]) -> bool {
        match self.try_add_index(unique, columns).await {
            Ok(()) => true,
            Err(err) => {
                warn!("split table {}: add index {columns:?} failed: {err}", self.name);
                false
            }
        }
    }

    /// One page of rows from the live segment `table`, ordered by index.
    pub async fn export_segment(
        &self,
        table: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> SplitResult<Vec<Row>> {
        let metas = self.get_table_metas().await?;
        let meta = metas
            .iter()
            .find(|meta| meta.table == table)
            .context(SegmentNotFoundSnafu { table })?;
        let mut query = self
            .get_table_spec(meta)
            .query()
            .asc(&self.index_column)
            .limit(limit.filter(|&l| l > 0).unwrap_or(DEFAULT_EXPORT_LIMIT));
        if let Some(offset) = offset.filter(|&o| o > 0) {
            query = query.offset(offset);
        }
        query.all().await.context(QuerySnafu { table })
    }

    /// Not available: a logical row may live in any historical segment.
    pub fn insert_or_update(&self, _record: &mut R) -> SplitResult<()> {
        NotSupportedSnafu {
            operation: "insert_or_update",
        }
        .fail()
    }

    /// Not available on split tables.
    pub fn update(&self, _record: &mut R) -> SplitResult<()> {
        NotSupportedSnafu { operation: "update" }.fail()
    }

    /// Not available on split tables.
    pub fn increment(&self, _record: &mut R, _column: &str) -> SplitResult<()> {
        NotSupportedSnafu {
            operation: "increment",
        }
        .fail()
    }

    /// Not available on split tables.
    pub fn decrement(&self, _record: &mut R, _column: &str) -> SplitResult<()> {
        NotSupportedSnafu {
            operation: "decrement",
        }
        .fail()
    }
}

#[async_trait]
impl<R: SplitRecord + 'static> TableContract for SplitTableSpec<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnSpec] {
        self.prototype.columns()
    }

    fn data_type(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    async fn expression(&self) -> String {
        SplitTableSpec::expression(self).await
    }

    async fn add_index(&mut self, unique: bool, columns: &[&str]) -> bool {
        SplitTableSpec::add_index(self, unique, columns).await
    }

    fn drop_foreign_key_sql(&self) -> Vec<String> {
        self.prototype.drop_foreign_key_sql()
    }
}

/// Queryable view over every live segment of a split table. The union is
/// resolved each time a query is built.
#[derive(Debug)]
pub struct SplitInstance<'a, R: SplitRecord> {
    spec: &'a SplitTableSpec<R>,
}

impl<R: SplitRecord> SplitInstance<'_, R> {
    /// Query over the current union of live segments.
    pub async fn query(&self) -> SplitResult<Query> {
        let source = self.spec.try_expression().await?;
        Ok(Query::new(self.spec.engine(), source))
    }

    /// Number of rows across all live segments.
    pub async fn count(&self) -> SplitResult<i64> {
        self.query()
            .await?
            .count()
            .await
            .context(QuerySnafu { table: self.spec.name() })
    }

    /// Every row across all live segments, ordered by index.
    pub async fn fetch_all(&self) -> SplitResult<Vec<R>> {
        let rows = self
            .query()
            .await?
            .asc(self.spec.index_column())
            .all()
            .await
            .context(QuerySnafu { table: self.spec.name() })?;
        rows.iter()
            .map(R::from_row)
            .collect::<Result<_, _>>()
            .context(DecodeSnafu { table: self.spec.name() })
    }
}

#[cfg(test)]
pub(crate) mod test_util;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::test_util::{Draft, Event, TestResult, temp_engine, ts};

    #[tokio::test]
    async fn construction_checks_index_and_date_columns() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let ok = SplitTableSpec::<Event>::new(Arc::clone(&engine), "events", "ID", "at", None, None)?;
        assert_eq!(ok.index_column(), "id");

        let cases: [(&str, &str, fn(&ConfigError) -> bool); 4] = [
            ("nope", "at", |e| matches!(e, ConfigError::MissingIndexColumn { .. })),
            ("level", "at", |e| matches!(e, ConfigError::IndexNotPrimary { .. })),
            ("id", "nope", |e| matches!(e, ConfigError::MissingDateColumn { .. })),
            ("id", "note", |e| {
                matches!(e, ConfigError::DateNotDateTime { found: SqlType::Text, .. })
            }),
        ];
        for (index, date, check) in cases {
            let err = SplitTableSpec::<Event>::new(Arc::clone(&engine), "events", index, date, None, None)
                .unwrap_err();
            assert!(check(&err), "unexpected error for ({index}, {date}): {err:?}");
        }

        let err = SplitTableSpec::<Draft>::new(engine, "drafts", "ref_no", "at", None, None)
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::IndexNotAutoIncrement { ref column, .. } if column == "ref_no"),
            "{err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_add_index_leaves_prototype_unchanged() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let mut spec = SplitTableSpec::<Event>::new(engine, "events", "id", "at", None, None)?;
        let before = spec.prototype().indexes().to_vec();

        // no catalog table yet, so listing segments fails
        assert!(!spec.add_index(false, &["at"]).await);
        assert_eq!(spec.prototype().indexes(), before.as_slice());
        assert!(spec.sync_sql().await?.iter().all(|s| !s.contains("(\"at\")")));

        spec.sync().await?;
        assert!(spec.add_index(false, &["at"]).await);
        assert_eq!(spec.prototype().indexes().len(), before.len() + 1);
        Ok(())
    }

    #[tokio::test]
    async fn zero_limits_mean_unset() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = SplitTableSpec::<Event>::new(
            engine,
            "events",
            "id",
            "at",
            Some(std::time::Duration::ZERO),
            Some(0),
        )?;
        assert_eq!(spec.max_duration(), None);
        assert_eq!(spec.max_segments(), None);
        Ok(())
    }

    #[tokio::test]
    async fn from_config_parses_span() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let mut config = SplitTableConfig::new("events", "id", "at");
        config.max_duration = Some("2d".to_string());
        config.max_segments = Some(3);
        let spec = SplitTableSpec::<Event>::from_config(engine, &config)?;
        assert_eq!(spec.max_duration(), Some(chrono::Duration::days(2)));
        assert_eq!(spec.max_segments(), Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn expression_unions_live_segments_in_order() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = SplitTableSpec::<Event>::new(engine, "events", "id", "at", None, None)?;

        // no catalog table yet: degraded, not an error
        assert_eq!(spec.expression().await, "\"events\"");
        assert!(spec.try_expression().await.is_err());

        spec.sync().await?;
        let mut second = TableMetadata::new("events_b", Some(100), Some(ts(0)));
        let mut metas = spec.get_table_metas().await?;
        spec.metadata()
            .update(&mut metas[0], |m| {
                m.end = Some(99);
                m.end_date = Some(ts(0));
            })
            .await?;
        spec.metadata().insert(&mut second).await?;

        let expected = format!(
            "(SELECT * FROM \"{}\" UNION ALL SELECT * FROM \"events_b\")",
            metas[0].table
        );
        assert_eq!(spec.try_expression().await?, expected);
        assert_eq!(TableContract::expression(&spec).await, expected);
        Ok(())
    }

    #[tokio::test]
    async fn contract_reports_prototype_shape() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = SplitTableSpec::<Event>::new(engine, "events", "id", "at", None, None)?;
        let contract: &dyn TableContract = &spec;
        assert_eq!(contract.name(), "events");
        let pk: Vec<&str> = contract
            .primary_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(pk, vec!["id"]);
        assert!(contract.column_spec("AT").is_some());
        assert!(contract.data_type().ends_with("Event"));
        assert!(contract.drop_foreign_key_sql().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn mutations_are_not_supported() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = SplitTableSpec::<Event>::new(engine, "events", "id", "at", None, None)?;
        let mut event = Event::at(ts(0));
        let results = [
            spec.insert_or_update(&mut event),
            spec.update(&mut event),
            spec.increment(&mut event, "level"),
            spec.decrement(&mut event, "level"),
        ];
        for result in results {
            assert!(matches!(result, Err(SplitTableError::NotSupported { .. })));
        }
        Ok(())
    }
}
