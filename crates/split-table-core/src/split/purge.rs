//! Retention: drop the oldest segments beyond `max_segments`.
//!
//! Purge only ever removes segments older than the newest `max_segments`,
//! oldest first, and never the open segment. Dropped segments stay in the
//! catalog as soft-deleted entries. A failure stops the run with the
//! segments processed so far already purged; running again picks up where
//! it stopped.

use chrono::Utc;
use log::{debug, info};
use snafu::prelude::*;

use crate::{
    record::SplitRecord,
    split::{
        SplitTableSpec,
        error::{DropSegmentSnafu, SplitResult, UpdateMetadataSnafu},
    },
};

impl<R: SplitRecord> SplitTableSpec<R> {
    /// Drop every segment beyond the newest `max_segments`. Returns the
    /// physical names dropped, oldest first. A no-op without
    /// `max_segments`.
    pub async fn purge(&self) -> SplitResult<Vec<String>> {
        self.purge_matching(|_| true).await
    }

    /// Like [`purge`](Self::purge), restricted to `tables`. Candidates are
    /// still taken oldest first, and the run stops at the first candidate
    /// not listed, so a newer segment is never dropped while an older one
    /// survives. An empty list purges every candidate.
    pub async fn purge_tables(&self, tables: &[&str]) -> SplitResult<Vec<String>> {
        self.purge_matching(|name| tables.is_empty() || tables.contains(&name))
            .await
    }

    async fn purge_matching<F>(&self, selected: F) -> SplitResult<Vec<String>>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        let Some(max) = self.max_segments else {
            debug!("split table {}: no segment limit, nothing to purge", self.name);
            return Ok(Vec::new());
        };
        let metas = self.get_table_metas().await?;
        if metas.len() <= max {
            return Ok(Vec::new());
        }

        let excess = metas.len() - max;
        let mut purged = Vec::with_capacity(excess);
        for mut meta in metas.into_iter().take(excess) {
            if !selected(&meta.table) {
                break;
            }
            self.get_table_spec(&meta)
                .drop_table()
                .await
                .context(DropSegmentSnafu {
                    table: meta.table.as_str(),
                })?;
            let now = Utc::now();
            self.metadata
                .update(&mut meta, move |m| {
                    m.deleted = true;
                    m.delete_at = Some(now);
                })
                .await
                .context(UpdateMetadataSnafu {
                    table: meta.table.as_str(),
                })?;
            info!("split table {}: purged segment {}", self.name, meta.table);
            purged.push(meta.table);
        }
        Ok(purged)
    }
}
