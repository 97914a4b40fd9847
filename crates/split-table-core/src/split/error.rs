//! Error types and SNAFU context selectors for `split`.
//!
//! Each variant names the step that failed (listing metadata, sealing,
//! opening a segment, dropping one) so callers can tell a transient store
//! failure apart from a configuration or lookup problem. Nothing here is
//! retried internally.

use snafu::prelude::*;

use crate::{engine::EngineError, record::RowError, table::TableError};

/// Errors from split-table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SplitTableError {
    /// Listing the segment catalog failed.
    #[snafu(display("Failed to list segments of {table}: {source}"))]
    ListMetadata {
        /// Logical table name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// The record carries no value for the date column.
    #[snafu(display("Record for {table} has no value for date column {column}"))]
    MissingDate {
        /// Logical table name.
        table: String,
        /// Configured date column.
        column: String,
    },

    /// Writing a new catalog entry failed.
    #[snafu(display("Failed to record segment {table} in the catalog: {source}"))]
    InsertMetadata {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Updating a catalog entry failed.
    #[snafu(display("Failed to update catalog entry for segment {table}: {source}"))]
    UpdateMetadata {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Reading the observed maximum index/date of a segment failed.
    #[snafu(display("Failed to compute seal point of segment {table}: {source}"))]
    SealPoint {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Materializing a new segment table failed.
    #[snafu(display("Failed to create segment table {table}: {source}"))]
    CreateSegment {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Another writer opened a segment concurrently. Retrying the insert
    /// picks up the winner's segment.
    #[snafu(display("Concurrent roll-over detected on {table}; retry the insert"))]
    RollOverConflict {
        /// Logical table name.
        table: String,
    },

    /// The row insert into the open segment failed.
    #[snafu(display("Failed to insert into segment {table}: {source}"))]
    InsertRow {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Reading a row from a segment failed.
    #[snafu(display("Failed to fetch from segment {table}: {source}"))]
    FetchRow {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// No live segment holds the requested key.
    #[snafu(display("No row with index {index} in {table}"))]
    NotFound {
        /// Logical table name.
        table: String,
        /// Requested index.
        index: i64,
    },

    /// The operation is not available on split tables.
    #[snafu(display("{operation} is not supported on split tables"))]
    NotSupported {
        /// Operation name.
        operation: &'static str,
    },

    /// Dropping a purged segment failed.
    #[snafu(display("Failed to drop segment {table}: {source}"))]
    DropSegment {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Syncing a segment's schema failed.
    #[snafu(display("Failed to sync segment {table}: {source}"))]
    SyncSegment {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// Syncing the catalog table failed.
    #[snafu(display("Failed to sync catalog table {table}: {source}"))]
    SyncMetadata {
        /// Catalog table name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// The live schema differs from the declared one.
    #[snafu(display("Split table {table} is out of sync: {}", statements.join("; ")))]
    SchemaOutOfSync {
        /// Logical table name.
        table: String,
        /// Statements that would bring it in sync.
        statements: Vec<String>,
    },

    /// The named table is not a live segment.
    #[snafu(display("{table} is not a live segment"))]
    SegmentNotFound {
        /// Requested physical name.
        table: String,
    },

    /// Creating an index on a segment failed.
    #[snafu(display("Failed to add index on segment {table}: {source}"))]
    AddIndex {
        /// Physical segment name.
        table: String,
        /// Underlying table error.
        source: TableError,
    },

    /// A query over the segments failed.
    #[snafu(display("Query over {table} failed: {source}"))]
    Query {
        /// Logical table name or physical segment name.
        table: String,
        /// Underlying engine error.
        source: EngineError,
    },

    /// A row could not be converted to the record type.
    #[snafu(display("Failed to decode a row of {table}: {source}"))]
    Decode {
        /// Logical table name or physical segment name.
        table: String,
        /// Underlying row error.
        source: RowError,
    },
}

impl SplitTableError {
    /// True for [`SplitTableError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, SplitTableError::NotFound { .. })
    }

    /// True when the operation can be retried as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SplitTableError::RollOverConflict { .. })
    }
}

/// Result alias for split-table operations.
pub type SplitResult<T> = Result<T, SplitTableError>;
