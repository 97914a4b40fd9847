//! CLI tool for administering split tables stored in SQLite.

mod error;
mod record;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::debug;
use snafu::ResultExt;
use split_table_core::{
    SegmentSpan, SplitTableConfig, SplitTableSpec, SqliteEngine, TableContract,
};

use crate::{
    error::{
        CliResult, ConfigSnafu, InvalidSpanSnafu, InvalidTimestampSnafu, OpenDatabaseSnafu,
        ReadConfigSnafu, SplitSnafu,
    },
    record::{DATE_COLUMN, EventRecord, INDEX_COLUMN},
    render::{OutputFormat, render_columns, render_metas, render_rows},
};

type EventTable = SplitTableSpec<EventRecord>;

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or evolve the catalog and every segment table
    Sync,

    /// Print the statements `sync` would run, without running them
    SyncSql,

    /// Exit non-zero when the schema is out of sync
    CheckSync,

    /// List segment catalog entries
    Metas {
        /// Include purged (soft-deleted) segments
        #[arg(long, default_value_t = false)]
        all: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Drop the oldest segments beyond --max-segments
    Purge {
        /// Restrict the purge to these segments (repeatable)
        #[arg(long = "segment")]
        segments: Vec<String>,
    },

    /// Print one page of rows from a live segment
    Export {
        #[arg(long)]
        segment: String,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Append one event, rolling over to a new segment when due
    Insert {
        #[arg(long = "obj-type")]
        obj_type: String,

        #[arg(long = "obj-id")]
        obj_id: i64,

        #[arg(long)]
        action: String,

        #[arg(long)]
        notes: Option<String>,

        /// RFC 3339 event time (default: now)
        #[arg(long)]
        at: Option<String>,

        /// Record the action as failed
        #[arg(long, default_value_t = false)]
        failed: bool,
    },

    /// Show the column layout and the union expression over live segments
    Describe,
}

#[derive(Debug, Parser)]
#[command(name = "splitable", about = "Administer time-partitioned split tables")]
struct Cli {
    /// SQLite database file (created if missing)
    #[arg(long, global = true, default_value = "splitable.db")]
    db: PathBuf,

    /// Logical table name
    #[arg(long, global = true, default_value = "opslog")]
    table: String,

    /// Segment span before roll-over, e.g. 7d, 12h, 30m
    #[arg(long = "max-duration", global = true)]
    max_duration: Option<String>,

    /// Number of live segments kept by purge
    #[arg(long = "max-segments", global = true)]
    max_segments: Option<usize>,

    /// JSON split table config; --max-duration and --max-segments override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn parse_span(spec: &str) -> CliResult<SegmentSpan> {
    SegmentSpan::parse(spec).context(InvalidSpanSnafu {
        spec: spec.to_string(),
    })
}

fn parse_at(value: &str) -> CliResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .context(InvalidTimestampSnafu {
            value: value.to_string(),
        })
}

async fn load_config(cli: &Cli) -> CliResult<SplitTableConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .context(ReadConfigSnafu {
                    path: path.display().to_string(),
                })?;
            SplitTableConfig::from_json(&raw).context(ConfigSnafu)?
        }
        None => SplitTableConfig::new(&cli.table, INDEX_COLUMN, DATE_COLUMN),
    };

    if let Some(spec) = &cli.max_duration {
        config.max_duration = Some(parse_span(spec)?.to_string());
    }
    if cli.max_segments.is_some() {
        config.max_segments = cli.max_segments;
    }
    debug!("split table config: {config:?}");
    Ok(config)
}

async fn open_table(db: &Path, config: &SplitTableConfig) -> CliResult<EventTable> {
    let engine = SqliteEngine::open(db).await.context(OpenDatabaseSnafu {
        path: db.display().to_string(),
    })?;
    SplitTableSpec::from_config(Arc::new(engine), config).context(ConfigSnafu)
}

async fn cmd_sync(table: &EventTable) -> CliResult<()> {
    table.sync().await.context(SplitSnafu)?;
    println!("Synced split table {}", table.name());
    Ok(())
}

async fn cmd_sync_sql(table: &EventTable) -> CliResult<()> {
    for stmt in table.sync_sql().await.context(SplitSnafu)? {
        println!("{stmt};");
    }
    Ok(())
}

async fn cmd_check_sync(table: &EventTable) -> CliResult<()> {
    table.check_sync().await.context(SplitSnafu)?;
    println!("Split table {} is in sync", table.name());
    Ok(())
}

async fn cmd_metas(table: &EventTable, all: bool, format: OutputFormat) -> CliResult<()> {
    let metas = if all {
        table.get_all_metas().await
    } else {
        table.get_table_metas().await
    }
    .context(SplitSnafu)?;
    println!("{}", render_metas(&metas, format)?);
    Ok(())
}

async fn cmd_purge(table: &EventTable, segments: Vec<String>) -> CliResult<()> {
    if table.max_segments().is_none() {
        println!("No segment limit configured; nothing to purge");
        return Ok(());
    }
    let names: Vec<&str> = segments.iter().map(String::as_str).collect();
    let purged = table.purge_tables(&names).await.context(SplitSnafu)?;
    if purged.is_empty() {
        println!("Nothing to purge");
    }
    for name in purged {
        println!("Purged segment: {name}");
    }
    Ok(())
}

async fn cmd_export(
    table: &EventTable,
    segment: &str,
    limit: Option<u64>,
    offset: Option<u64>,
    format: OutputFormat,
) -> CliResult<()> {
    let rows = table
        .export_segment(segment, limit, offset)
        .await
        .context(SplitSnafu)?;
    println!("{}", render_rows(&rows, format)?);
    Ok(())
}

async fn cmd_insert(table: &EventTable, mut event: EventRecord) -> CliResult<()> {
    table.insert(&mut event).await.context(SplitSnafu)?;
    println!("Inserted event {} at {}", event.id, event.ops_time.to_rfc3339());
    Ok(())
}

async fn cmd_describe(table: &EventTable) -> CliResult<()> {
    let rows = table.instance().count().await.context(SplitSnafu)?;
    println!("Split table {} ({})", TableContract::name(table), table.data_type());
    println!("{}", render_columns(TableContract::columns(table)));
    let primary: Vec<&str> = table
        .primary_columns()
        .into_iter()
        .map(|c| c.name.as_str())
        .collect();
    println!("Primary key: {}", primary.join(", "));
    println!("Rows: {rows}");
    println!("Expression: {}", TableContract::expression(table).await);
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).await?;
    let table = open_table(&cli.db, &config).await?;

    match cli.cmd {
        Command::Sync => cmd_sync(&table).await,
        Command::SyncSql => cmd_sync_sql(&table).await,
        Command::CheckSync => cmd_check_sync(&table).await,
        Command::Metas { all, format } => cmd_metas(&table, all, format).await,
        Command::Purge { segments } => cmd_purge(&table, segments).await,
        Command::Export {
            segment,
            limit,
            offset,
            format,
        } => cmd_export(&table, &segment, limit, offset, format).await,
        Command::Insert {
            obj_type,
            obj_id,
            action,
            notes,
            at,
            failed,
        } => {
            let ops_time = match at {
                Some(raw) => parse_at(&raw)?,
                None => Utc::now(),
            };
            let event = EventRecord {
                id: 0,
                ops_time,
                obj_type,
                obj_id,
                action,
                notes,
                success: !failed,
            };
            cmd_insert(&table, event).await
        }
        Command::Describe => cmd_describe(&table).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
