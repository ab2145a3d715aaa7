//! Data source trait, time ranges and structured fetch errors.
//!
//! The `DataSource` trait abstracts over upstreams (Yahoo Finance, CSV
//! snapshots, synthetic data) so the pipeline can swap implementations and
//! tests can substitute fixtures.

use crate::table::RawTable;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Structured error types for fetches.
///
/// An unknown ticker is not an error: sources return an empty table for it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} for {ticker}")]
    Http { status: u16, ticker: String },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Lookback periods offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
}

impl Period {
    pub const ALL: [Period; 8] = [
        Period::OneDay,
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::TwoYears,
        Period::FiveYears,
    ];

    /// Code understood by Yahoo's `range` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
        }
    }

    /// Calendar-day length.
    pub fn days(&self) -> i64 {
        match self {
            Period::OneDay => 1,
            Period::FiveDays => 5,
            Period::OneMonth => 30,
            Period::ThreeMonths => 91,
            Period::SixMonths => 182,
            Period::OneYear => 365,
            Period::TwoYears => 730,
            Period::FiveYears => 1826,
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Period::ALL
            .into_iter()
            .find(|p| p.code() == s)
            .ok_or_else(|| format!("unknown period '{s}' (expected one of 1d 5d 1mo 3mo 6mo 1y 2y 5y)"))
    }
}

/// Requested history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeRangeSpec {
    /// Trailing period ending at the anchor date.
    Period(Period),
    /// Inclusive date range.
    Between { start: NaiveDate, end: NaiveDate },
}

impl Default for TimeRangeSpec {
    fn default() -> Self {
        TimeRangeSpec::Period(Period::OneYear)
    }
}

impl TimeRangeSpec {
    /// Inclusive (start, end) dates; periods end at `anchor`.
    pub fn resolve(&self, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            TimeRangeSpec::Period(p) => (anchor - Duration::days(p.days()), anchor),
            TimeRangeSpec::Between { start, end } => (start, end),
        }
    }
}

impl fmt::Display for TimeRangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRangeSpec::Period(p) => f.write_str(p.code()),
            TimeRangeSpec::Between { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

impl FromStr for TimeRangeSpec {
    type Err = String;

    /// A period code (`1y`) or `YYYY-MM-DD..YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((start, end)) = s.split_once("..") else {
            return s.parse().map(TimeRangeSpec::Period);
        };
        let parse = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                .map_err(|e| format!("invalid date '{}': {e}", d.trim()))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start > end {
            return Err(format!("range start {start} is after end {end}"));
        }
        Ok(TimeRangeSpec::Between { start, end })
    }
}

impl TryFrom<String> for TimeRangeSpec {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeRangeSpec> for String {
    fn from(range: TimeRangeSpec) -> Self {
        range.to_string()
    }
}

/// Timeout and retry policy handed to remote sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub retries: u32,
}

impl FetchSettings {
    /// Most retries a configuration may ask for.
    pub const MAX_RETRIES: u32 = 10;
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
        }
    }
}

/// Where a source's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Yahoo,
    Csv,
    Synthetic,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" => Ok(SourceKind::Yahoo),
            "csv" => Ok(SourceKind::Csv),
            "synthetic" => Ok(SourceKind::Synthetic),
            other => Err(format!("unknown source '{other}' (expected yahoo, csv or synthetic)")),
        }
    }
}

/// Trait for upstream market data sources.
///
/// `fetch` may return an empty table (unknown ticker, no rows in range) and
/// may fail transiently; retry and timeout policy live inside the source.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch daily rows for `ticker` over `range`.
    fn fetch(&self, ticker: &str, range: &TimeRangeSpec) -> Result<RawTable, FetchError>;
}
