//! Split-table configuration.
//!
//! A [`SplitTableConfig`] names the logical table, its index and date
//! columns, and the roll-over and retention limits. It is usually loaded from
//! JSON; spans are written in a human-friendly form such as `7d` or `12h`
//! and parsed by [`SegmentSpan`].

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::schema::{ConfigError, InvalidConfigSnafu, InvalidSpanSnafu};

/// Errors produced when parsing a segment span such as `7d`.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseSegmentSpanError {
    /// The span string was empty or only whitespace.
    #[snafu(display("segment span is empty"))]
    Empty,

    /// The span did not include a numeric value.
    #[snafu(display("segment span '{spec}' is missing a numeric value"))]
    MissingNumber {
        /// The original span string.
        spec: String,
    },

    /// The span did not include a unit suffix.
    #[snafu(display("segment span '{spec}' is missing a unit suffix (expected s|m|h|d|w)"))]
    MissingUnit {
        /// The original span string.
        spec: String,
    },

    /// The numeric part failed to parse.
    #[snafu(display("invalid span value in '{spec}': {source}"))]
    InvalidNumber {
        /// The original span string.
        spec: String,
        /// The parse error returned by `u64::from_str`.
        source: std::num::ParseIntError,
    },

    /// The numeric part was zero.
    #[snafu(display("span value must be > 0 (got {value}) in '{spec}'"))]
    NonPositive {
        /// The original span string.
        spec: String,
        /// The parsed value.
        value: u64,
    },

    /// The numeric part did not fit in a `u32`.
    #[snafu(display("span value too large for u32 (got {value}) in '{spec}'"))]
    TooLarge {
        /// The original span string.
        spec: String,
        /// The parsed value.
        value: u64,
    },

    /// The unit suffix is not recognized.
    #[snafu(display("unknown segment span unit '{unit}' in '{spec}' (expected s|m|h|d|w)"))]
    UnknownUnit {
        /// The original span string.
        spec: String,
        /// The unrecognized unit.
        unit: String,
    },
}

/// Maximum wall-clock span of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentSpan {
    /// A fixed number of seconds.
    Seconds(u32),
    /// A fixed number of minutes.
    Minutes(u32),
    /// A fixed number of hours.
    Hours(u32),
    /// A fixed number of days.
    Days(u32),
    /// A fixed number of weeks.
    Weeks(u32),
}

impl SegmentSpan {
    /// Parse a span such as `7d`, `12h`, `30m`, `45s` or `2w`.
    ///
    /// # Errors
    /// Returns [`ParseSegmentSpanError`] when the span is empty, lacks a
    /// number or unit, has a zero or oversized number, or uses an unknown
    /// unit.
    pub fn parse(spec: &str) -> Result<Self, ParseSegmentSpanError> {
        spec.parse()
    }

    /// Length of the span.
    pub fn as_duration(self) -> Duration {
        let secs = match self {
            SegmentSpan::Seconds(n) => u64::from(n),
            SegmentSpan::Minutes(n) => u64::from(n) * 60,
            SegmentSpan::Hours(n) => u64::from(n) * 3_600,
            SegmentSpan::Days(n) => u64::from(n) * 86_400,
            SegmentSpan::Weeks(n) => u64::from(n) * 604_800,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for SegmentSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentSpan::Seconds(n) => write!(f, "{n}s"),
            SegmentSpan::Minutes(n) => write!(f, "{n}m"),
            SegmentSpan::Hours(n) => write!(f, "{n}h"),
            SegmentSpan::Days(n) => write!(f, "{n}d"),
            SegmentSpan::Weeks(n) => write!(f, "{n}w"),
        }
    }
}

impl FromStr for SegmentSpan {
    type Err = ParseSegmentSpanError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let spec = input.trim();
        if spec.is_empty() {
            return Err(ParseSegmentSpanError::Empty);
        }

        let Some(unit_start) = spec
            .char_indices()
            .find(|(_, c)| c.is_ascii_alphabetic())
            .map(|(i, _)| i)
        else {
            return MissingUnitSnafu { spec }.fail();
        };
        if unit_start == 0 {
            return MissingNumberSnafu { spec }.fail();
        }

        let (num_str, unit_str) = spec.split_at(unit_start);
        let value: u64 = num_str
            .trim()
            .parse()
            .context(InvalidNumberSnafu { spec })?;
        ensure!(value > 0, NonPositiveSnafu { spec, value });
        let v = u32::try_from(value)
            .ok()
            .context(TooLargeSnafu { spec, value })?;

        match unit_str.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(SegmentSpan::Seconds(v)),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(SegmentSpan::Minutes(v)),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(SegmentSpan::Hours(v)),
            "d" | "day" | "days" => Ok(SegmentSpan::Days(v)),
            "w" | "wk" | "wks" | "week" | "weeks" => Ok(SegmentSpan::Weeks(v)),
            _ => UnknownUnitSnafu {
                spec,
                unit: unit_str.trim(),
            }
            .fail(),
        }
    }
}

/// Declarative description of one split table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTableConfig {
    /// Logical table name.
    pub table: String,
    /// Auto-increment primary key column.
    pub index_column: String,
    /// Datetime column driving roll-over.
    pub date_column: String,
    /// Maximum span of one segment (`7d`, `12h`, ...). No roll-over when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
    /// Number of live segments kept by purge. No purge when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segments: Option<usize>,
}

impl SplitTableConfig {
    /// Config with no roll-over and no retention limit.
    pub fn new(
        table: impl Into<String>,
        index_column: impl Into<String>,
        date_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            index_column: index_column.into(),
            date_column: date_column.into(),
            max_duration: None,
            max_segments: None,
        }
    }

    /// Parse a config from JSON.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).context(InvalidConfigSnafu)
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).context(InvalidConfigSnafu)
    }

    /// Parsed [`SplitTableConfig::max_duration`].
    pub fn max_span(&self) -> Result<Option<SegmentSpan>, ConfigError> {
        self.max_duration
            .as_deref()
            .map(SegmentSpan::parse)
            .transpose()
            .context(InvalidSpanSnafu)
    }
}
