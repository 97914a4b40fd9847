//! Write path and roll-over policy.
//!
//! Every insert re-reads the catalog and resolves the open segment:
//!
//! 1. no live segment: open the first one, starting at the prototype's
//!    auto-increment offset;
//! 2. open segment without a start date (created by sync or adopted from an
//!    empty legacy table): backfill start and start date from this record;
//! 3. record date more than `max_duration` past the open segment's start
//!    date: seal it at the maximum index and date actually stored, then open
//!    a new segment right after the sealed range;
//! 4. otherwise write to the open segment.
//!
//! Sealing happens lazily on the first insert past the boundary, so the
//! recorded end is derived from data rather than from a clock.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    metadata::TableMetadata,
    record::SplitRecord,
    split::{
        SplitTableSpec,
        error::{
            CreateSegmentSnafu, InsertMetadataSnafu, InsertRowSnafu, MissingDateSnafu,
            RollOverConflictSnafu, SealPointSnafu, SplitResult, UpdateMetadataSnafu,
        },
    },
    table::TableSpec,
};

impl<R: SplitRecord> SplitTableSpec<R> {
    /// Insert `record` into the open segment, rolling over first when the
    /// open segment has grown past `max_duration`. The key allocated by the
    /// engine is written back with [`SplitRecord::set_split_index`].
    ///
    /// # Errors
    /// Fails when the record has no date, when any catalog or DDL step
    /// fails, or with [`RollOverConflict`](crate::SplitTableError::RollOverConflict) when a
    /// concurrent writer opened a segment first.
    pub async fn insert(&self, record: &mut R) -> SplitResult<()> {
        let date = record.split_date().context(MissingDateSnafu {
            table: &self.name,
            column: &self.date_column,
        })?;
        let target = self.resolve_segment(date).await?;
        let index = target
            .insert(record)
            .await
            .context(InsertRowSnafu { table: target.name() })?;
        record.set_split_index(index);
        Ok(())
    }

    async fn resolve_segment(&self, date: DateTime<Utc>) -> SplitResult<TableSpec> {
        let metas = self.get_table_metas().await?;
        let Some(mut last) = metas.into_iter().last() else {
            info!("split table {}: opening first segment", self.name);
            return self.create_segment(self.first_index(), Some(date)).await;
        };

        if !last.is_open() {
            // a previous roll-over sealed this segment but never opened the next one
            let start = last.end.map_or(self.first_index(), |end| end + 1);
            return self.create_segment(start, Some(date)).await;
        }

        let Some(start_date) = last.start_date else {
            let first = self.first_index();
            self.metadata
                .update(&mut last, move |m| {
                    m.start.get_or_insert(first);
                    m.start_date = Some(date);
                })
                .await
                .context(UpdateMetadataSnafu {
                    table: last.table.as_str(),
                })?;
            debug!(
                "split table {}: backfilled start of segment {}",
                self.name, last.table
            );
            return Ok(self.get_table_spec(&last));
        };

        match self.max_duration {
            Some(max) if date - start_date > max => {
                self.seal(&mut last).await?;
                let start = last.end.map_or(self.first_index(), |end| end + 1);
                self.create_segment(start, Some(date)).await
            }
            _ => Ok(self.get_table_spec(&last)),
        }
    }

    /// Record the observed maximum index and date of `meta`'s segment as its
    /// end. An empty segment ends right before its start.
    async fn seal(&self, meta: &mut TableMetadata) -> SplitResult<()> {
        let spec = self.get_table_spec(meta);
        let max_index = spec
            .aggregate("MAX", &self.index_column)
            .await
            .context(SealPointSnafu { table: spec.name() })?;
        let max_date = spec
            .aggregate("MAX", &self.date_column)
            .await
            .context(SealPointSnafu { table: spec.name() })?;

        let start = meta.start.unwrap_or(self.first_index());
        let end = max_index.as_i64().unwrap_or(start - 1);
        let end_date = max_date.as_datetime().or(meta.start_date);
        self.metadata
            .update(meta, move |m| {
                m.end = Some(end);
                m.end_date = end_date;
            })
            .await
            .context(UpdateMetadataSnafu {
                table: meta.table.as_str(),
            })?;
        info!(
            "split table {}: sealed segment {} at index {end}",
            self.name, meta.table
        );
        Ok(())
    }

    /// Physical name for a segment starting at `start_date`:
    /// `<logical>_<epoch seconds>`, suffixed with the next catalog id when
    /// that name is already used by a catalog entry or an existing table.
    pub(crate) async fn segment_name(
        &self,
        start_date: Option<DateTime<Utc>>,
        check_catalog: bool,
    ) -> SplitResult<String> {
        let epoch = start_date.unwrap_or_else(Utc::now).timestamp();
        let base = format!("{}_{epoch}", self.name);

        let in_catalog = check_catalog
            && self
                .metadata
                .name_taken(&base)
                .await
                .context(CreateSegmentSnafu { table: &base })?;
        let on_disk = self
            .prototype
            .with_name(base.as_str())
            .exists()
            .await
            .context(CreateSegmentSnafu { table: &base })?;
        if !in_catalog && !on_disk {
            return Ok(base);
        }

        let next_id = if check_catalog {
            self.metadata
                .next_id()
                .await
                .context(CreateSegmentSnafu { table: &base })?
        } else {
            1
        };
        Ok(format!("{base}_{next_id}"))
    }

    /// Open a new segment: catalog entry first, then the physical table.
    pub(crate) async fn create_segment(
        &self,
        start: i64,
        start_date: Option<DateTime<Utc>>,
    ) -> SplitResult<TableSpec> {
        let name = self.segment_name(start_date, true).await?;
        let mut meta = TableMetadata::new(name, Some(start), start_date);
        if let Err(source) = self.metadata.insert(&mut meta).await {
            if source.is_unique_violation() {
                return RollOverConflictSnafu { table: &self.name }.fail();
            }
            return Err(source).context(InsertMetadataSnafu { table: meta.table });
        }

        let spec = self.get_table_spec(&meta);
        if let Err(source) = spec.sync().await {
            let orphan = meta.table.clone();
            if let Err(err) = self
                .metadata
                .update(&mut meta, |m| {
                    m.deleted = true;
                    m.delete_at = Some(Utc::now());
                })
                .await
            {
                warn!("split table {}: could not retire orphan entry {orphan}: {err}", self.name);
            }
            return Err(source).context(CreateSegmentSnafu { table: orphan });
        }

        info!(
            "split table {}: opened segment {} at index {start}",
            self.name, meta.table
        );
        Ok(spec)
    }
}
