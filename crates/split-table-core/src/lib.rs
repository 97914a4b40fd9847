//! Core engine for time-partitioned, auto-rolling split tables.
//!
//! A split table presents one logical, growable table that is physically
//! stored as a sequence of segment tables in a relational database. Each
//! segment covers a contiguous range of the auto-increment index and a
//! contiguous date range:
//!
//! - A metadata catalog (`<logical>_metadata`) records every segment's
//!   physical name and bounds, plus a soft-delete marker so dropped segments
//!   stay visible as history (`metadata` module).
//! - A [`SplitTableSpec`] façade writes to the newest segment, rolls over to a
//!   fresh one once the configured span is exceeded, and reads across the
//!   union of all live segments (`split` module).
//! - Purge drops the oldest segments once more than the configured number
//!   are live.
//! - Schema sync creates or evolves the catalog and every segment table, and
//!   adopts a pre-existing unsegmented table in place.
//!
//! The relational engine itself is reached through the [`Engine`] trait; a
//! SQLite implementation backed by `sqlx` ships in [`engine::sqlite`].
#![deny(missing_docs)]
pub mod config;
pub mod engine;
pub mod metadata;
pub mod query;
pub mod record;
pub mod schema;
pub mod split;
pub mod table;
pub mod value;

pub use config::{ParseSegmentSpanError, SegmentSpan, SplitTableConfig};
pub use engine::{ColumnInfo, Engine, EngineError, ExecOutcome, sqlite::SqliteEngine};
pub use metadata::{MetadataStore, TableMetadata};
pub use query::{Order, Query};
pub use record::{Record, Row, RowError, SplitRecord};
pub use schema::{ColumnSpec, ConfigError, IndexSpec, SqlType};
pub use split::{SplitInstance, SplitTableError, SplitTableSpec};
pub use table::{TableContract, TableError, TableSpec, UpdateDiff};
pub use value::SqlValue;
