use split_table_core::{ConfigError, EngineError, ParseSegmentSpanError, SplitTableError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --max-duration '{spec}': {source}"))]
    InvalidSpan {
        spec: String,
        source: ParseSegmentSpanError,
    },

    #[snafu(display("Invalid --at '{value}': expected an RFC 3339 timestamp ({source})"))]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[snafu(display("Failed to read config file: {path}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Invalid split table configuration: {source}"))]
    Config { source: ConfigError },

    #[snafu(display(
        "Failed to open database at {path}. \
         Ensure the parent directory exists and is writable."
    ))]
    OpenDatabase {
        path: String,
        source: EngineError,
    },

    #[snafu(display("{source}"))]
    Split {
        #[snafu(source(from(SplitTableError, Box::new)))]
        source: Box<SplitTableError>,
    },

    #[snafu(display("Failed to render JSON output: {source}"))]
    RenderJson { source: serde_json::Error },
}
