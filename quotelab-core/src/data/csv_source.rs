//! CSV snapshot source.
//!
//! Reads `{dir}/{TICKER}.csv`. Two layouts are understood:
//!
//! - flat: one header row, first column is the date
//! - hierarchical, as written by multi-ticker downloaders: two header rows
//!   carrying an outer (ticker) and inner (field) label per column. The
//!   first header cell says which row is which: `Ticker` puts tickers on
//!   row one, `Price` puts fields on row one and tickers on row two.
//!
//! Rows whose first cell is `Date` are an extra label row and are skipped.
//! Period ranges are anchored at the last date in the file so snapshots stay
//! usable as they age.

use super::provider::{DataSource, FetchError, TimeRangeSpec};
use crate::table::{Cell, FlatColumn, GroupedColumn, RawColumns, RawTable};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use tracing::debug;

pub struct CsvSource {
    dir: PathBuf,
}

enum Layout {
    Flat,
    TickerFirst,
    FieldFirst,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }

    /// Parse a whole CSV document into a raw table, before range filtering.
    pub fn parse(text: &str) -> Result<RawTable, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| FetchError::Parse(e.to_string()))?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut rows = records.into_iter();
        let Some(first) = rows.next() else {
            return Ok(RawTable::empty());
        };
        let layout = match first.first().map(String::as_str) {
            Some("Ticker") => Layout::TickerFirst,
            Some("Price") => Layout::FieldFirst,
            _ => Layout::Flat,
        };
        let second = match layout {
            Layout::Flat => None,
            _ => Some(rows.next().unwrap_or_default()),
        };

        let width = first.len().saturating_sub(1);
        let mut index = Vec::new();
        let mut values: Vec<Vec<Cell>> = vec![Vec::new(); width];
        for row in rows {
            let Some(stamp) = row.first() else { continue };
            if stamp.is_empty() || stamp == "Date" {
                continue;
            }
            index.push(parse_timestamp(stamp)?);
            for (col, slot) in values.iter_mut().enumerate() {
                slot.push(parse_cell(row.get(col + 1).map(String::as_str))?);
            }
        }

        let labels = |header: &[String]| -> Vec<String> {
            (0..width)
                .map(|i| header.get(i + 1).cloned().unwrap_or_default())
                .collect()
        };
        Ok(match (layout, second) {
            (Layout::Flat, _) | (_, None) => RawTable::flat(
                index,
                labels(&first)
                    .into_iter()
                    .zip(values)
                    .map(|(label, v)| FlatColumn::new(label, v))
                    .collect(),
            ),
            (Layout::TickerFirst, Some(second)) => RawTable::hierarchical(
                index,
                labels(&first)
                    .into_iter()
                    .zip(labels(&second))
                    .zip(values)
                    .map(|((outer, inner), v)| GroupedColumn::new(outer, inner, v))
                    .collect(),
            ),
            (Layout::FieldFirst, Some(second)) => RawTable::hierarchical(
                index,
                labels(&second)
                    .into_iter()
                    .zip(labels(&first))
                    .zip(values)
                    .map(|((outer, inner), v)| GroupedColumn::new(outer, inner, v))
                    .collect(),
            ),
        })
    }
}

/// Keep only rows whose date falls inside `range`.
fn filter_range(table: RawTable, range: &TimeRangeSpec) -> RawTable {
    let Some(last) = table.index.iter().map(|t| t.date()).max() else {
        return table;
    };
    let (start, end) = range.resolve(last);
    let keep: Vec<bool> = table
        .index
        .iter()
        .map(|t| (start..=end).contains(&t.date()))
        .collect();
    if keep.iter().all(|&k| k) {
        return table;
    }

    let select = |values: Vec<Cell>| -> Vec<Cell> {
        values
            .into_iter()
            .zip(&keep)
            .filter_map(|(v, &k)| k.then_some(v))
            .collect()
    };
    let index = select_index(&table.index, &keep);
    match table.columns {
        RawColumns::Flat(cols) => RawTable::flat(
            index,
            cols.into_iter()
                .map(|c| FlatColumn::new(c.label, select(c.values)))
                .collect(),
        ),
        RawColumns::Hierarchical(cols) => RawTable::hierarchical(
            index,
            cols.into_iter()
                .map(|c| GroupedColumn::new(c.outer, c.inner, select(c.values)))
                .collect(),
        ),
    }
}

fn select_index(index: &[NaiveDateTime], keep: &[bool]) -> Vec<NaiveDateTime> {
    index
        .iter()
        .zip(keep)
        .filter_map(|(t, &k)| k.then_some(*t))
        .collect()
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, FetchError> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    // Exchange-local stamps such as `2024-01-02 00:00:00-05:00` keep their
    // wall-clock date.
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Ok(ts.naive_local());
        }
    }
    Err(FetchError::Parse(format!("unrecognized date '{s}'")))
}

fn parse_cell(s: Option<&str>) -> Result<Cell, FetchError> {
    match s {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("nan") || v.eq_ignore_ascii_case("null") => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| FetchError::Parse(format!("invalid number '{v}'"))),
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, ticker: &str, range: &TimeRangeSpec) -> Result<RawTable, FetchError> {
        let path = self.path_for(ticker);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(ticker, path = %path.display(), "no CSV snapshot");
                return Ok(RawTable::empty());
            }
            Err(e) => return Err(e.into()),
        };
        let table = Self::parse(&text)?;
        debug!(ticker, rows = table.height(), "read CSV snapshot");
        Ok(filter_range(table, range))
    }
}
