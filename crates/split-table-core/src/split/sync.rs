//! Schema sync for the catalog and every segment.
//!
//! With live segments, each one is synced against the prototype so schema
//! evolution reaches the whole history. Without any, a table under the bare
//! logical name is adopted in place (its catalog entry starts at the
//! smallest index and date it holds); otherwise an empty first segment is
//! created.

use log::info;
use snafu::prelude::*;

use crate::{
    metadata::TableMetadata,
    record::{Record, SplitRecord},
    split::{
        SplitTableSpec,
        error::{
            InsertMetadataSnafu, SchemaOutOfSyncSnafu, SplitResult, SyncMetadataSnafu,
            SyncSegmentSnafu,
        },
    },
    table::TableSpec,
};

impl<R: SplitRecord> SplitTableSpec<R> {
    /// Create or evolve the catalog and the segment tables.
    pub async fn sync(&self) -> SplitResult<()> {
        self.metadata
            .sync()
            .await
            .context(SyncMetadataSnafu { table: self.metadata.name() })?;

        let metas = self.get_table_metas().await?;
        if metas.is_empty() {
            let legacy = self.legacy_table();
            if legacy
                .exists()
                .await
                .context(SyncSegmentSnafu { table: &self.name })?
            {
                legacy
                    .sync()
                    .await
                    .context(SyncSegmentSnafu { table: &self.name })?;
                let mut meta = self.legacy_meta(&legacy).await?;
                self.metadata
                    .insert(&mut meta)
                    .await
                    .context(InsertMetadataSnafu { table: &self.name })?;
                info!(
                    "split table {}: adopted existing table starting at index {:?}",
                    self.name, meta.start
                );
            } else {
                self.create_segment(self.first_index(), None).await?;
            }
            return Ok(());
        }

        for meta in &metas {
            self.get_table_spec(meta)
                .sync()
                .await
                .context(SyncSegmentSnafu {
                    table: meta.table.as_str(),
                })?;
        }
        Ok(())
    }

    /// Statements [`sync`](Self::sync) would run, as literal SQL. Includes
    /// the catalog insert for a first or adopted segment.
    pub async fn sync_sql(&self) -> SplitResult<Vec<String>> {
        let catalog = self.metadata.name();
        let catalog_exists = self
            .metadata
            .exists()
            .await
            .context(SyncMetadataSnafu { table: catalog })?;
        let mut stmts = self
            .metadata
            .sync_sql()
            .await
            .context(SyncMetadataSnafu { table: catalog })?;

        let metas = if catalog_exists {
            self.get_table_metas().await?
        } else {
            Vec::new()
        };
        if metas.is_empty() {
            let legacy = self.legacy_table();
            let meta = if legacy
                .exists()
                .await
                .context(SyncSegmentSnafu { table: &self.name })?
            {
                stmts.extend(
                    legacy
                        .sync_sql()
                        .await
                        .context(SyncSegmentSnafu { table: &self.name })?,
                );
                self.legacy_meta(&legacy).await?
            } else {
                let name = self.segment_name(None, catalog_exists).await?;
                let meta = TableMetadata::new(name, Some(self.first_index()), None);
                stmts.extend(self.get_table_spec(&meta).create_sql());
                meta
            };
            stmts.push(
                self.metadata
                    .table_spec()
                    .insert_sql_literal(&meta.to_row()),
            );
            return Ok(stmts);
        }

        for meta in &metas {
            stmts.extend(
                self.get_table_spec(meta)
                    .sync_sql()
                    .await
                    .context(SyncSegmentSnafu {
                        table: meta.table.as_str(),
                    })?,
            );
        }
        Ok(stmts)
    }

    /// Error with the pending statements unless everything is in sync.
    pub async fn check_sync(&self) -> SplitResult<()> {
        let statements = self.sync_sql().await?;
        ensure!(
            statements.is_empty(),
            SchemaOutOfSyncSnafu {
                table: &self.name,
                statements,
            }
        );
        Ok(())
    }

    fn legacy_table(&self) -> TableSpec {
        self.prototype.clone()
    }

    /// Catalog entry for an adopted table, starting at its smallest index
    /// and date. Both stay unset for an empty table and are backfilled by
    /// the first insert.
    async fn legacy_meta(&self, legacy: &TableSpec) -> SplitResult<TableMetadata> {
        let min_index = legacy
            .aggregate("MIN", &self.index_column)
            .await
            .context(SyncSegmentSnafu { table: legacy.name() })?;
        let min_date = legacy
            .aggregate("MIN", &self.date_column)
            .await
            .context(SyncSegmentSnafu { table: legacy.name() })?;
        Ok(TableMetadata::new(
            legacy.name(),
            min_index.as_i64(),
            min_date.as_datetime(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        Engine, SplitTableError, SplitTableSpec,
        split::test_util::{Event, TestResult, temp_engine},
    };

    fn spec(engine: Arc<dyn Engine>) -> Result<SplitTableSpec<Event>, crate::ConfigError> {
        SplitTableSpec::new(engine, "events", "id", "at", None, None)
    }

    #[tokio::test]
    async fn fresh_sync_creates_catalog_and_first_segment() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = spec(Arc::clone(&engine))?;
        spec.sync().await?;

        let metas = spec.get_table_metas().await?;
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].start, Some(1));
        assert!(metas[0].start_date.is_none());
        assert!(engine.table_exists(&metas[0].table).await?);
        assert!(!engine.table_exists("events").await?);

        // second run only checks
        spec.sync().await?;
        assert_eq!(spec.get_table_metas().await?.len(), 1);
        spec.check_sync().await?;
        Ok(())
    }

    #[tokio::test]
    async fn check_sync_lists_pending_statements() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let spec = spec(engine)?;
        let err = spec.check_sync().await.unwrap_err();
        match err {
            SplitTableError::SchemaOutOfSync { statements, .. } => {
                assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"events_metadata\""));
                let last = statements.last().cloned().unwrap_or_default();
                assert!(last.starts_with("INSERT INTO \"events_metadata\""), "{last}");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn new_index_propagates_to_existing_segments() -> TestResult {
        let (_tmp, engine) = temp_engine().await?;
        let mut spec = spec(Arc::clone(&engine))?;
        spec.sync().await?;
        let segment = spec.get_table_metas().await?[0].table.clone();

        assert!(spec.add_index(false, &["level"]).await);
        let names = engine.index_names(&segment).await?;
        assert!(names.contains(&format!("ix_{segment}_level")), "{names:?}");
        spec.check_sync().await?;
        Ok(())
    }
}
