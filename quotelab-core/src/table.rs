//! Tabular market data: the raw shape returned by upstream sources and the
//! canonical per-ticker series produced by normalization.
//!
//! Cells are `Option<f64>`. `None` is the explicit "undefined" marker used by
//! every rolling statistic before its window fills, and for gaps in raw data.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single numeric cell. `None` means undefined.
pub type Cell = Option<f64>;

/// Column label for closing prices. Required in every non-empty series.
pub const CLOSE: &str = "Close";

/// A flat column: one label, one value per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatColumn {
    pub label: String,
    pub values: Vec<Cell>,
}

impl FlatColumn {
    pub fn new(label: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }
}

/// A column under a two-level header: outer = ticker, inner = field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedColumn {
    pub outer: String,
    pub inner: String,
    pub values: Vec<Cell>,
}

impl GroupedColumn {
    pub fn new(outer: impl Into<String>, inner: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            outer: outer.into(),
            inner: inner.into(),
            values,
        }
    }
}

/// Column shape of a raw table, tagged explicitly so the normalizer can
/// dispatch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawColumns {
    Flat(Vec<FlatColumn>),
    Hierarchical(Vec<GroupedColumn>),
}

/// Tabular data for one fetch, as produced by a data source.
///
/// Rows are indexed by timestamp; the index is expected ascending but may
/// contain duplicates. Labels may use any letter casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub index: Vec<NaiveDateTime>,
    pub columns: RawColumns,
}

impl RawTable {
    pub fn flat(index: Vec<NaiveDateTime>, columns: Vec<FlatColumn>) -> Self {
        Self {
            index,
            columns: RawColumns::Flat(columns),
        }
    }

    pub fn hierarchical(index: Vec<NaiveDateTime>, columns: Vec<GroupedColumn>) -> Self {
        Self {
            index,
            columns: RawColumns::Hierarchical(columns),
        }
    }

    /// A table with zero rows and zero columns.
    pub fn empty() -> Self {
        Self::flat(Vec::new(), Vec::new())
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.index.len()
    }

    /// Number of columns (leaf columns for hierarchical tables).
    pub fn width(&self) -> usize {
        match &self.columns {
            RawColumns::Flat(cols) => cols.len(),
            RawColumns::Hierarchical(cols) => cols.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// A named numeric column of a canonical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesColumn {
    pub name: String,
    pub values: Vec<Cell>,
}

/// Normalized per-ticker daily series.
///
/// Invariants (upheld by the normalizer and by `with_column`):
/// - the index is strictly increasing,
/// - every column has exactly one value per index entry,
/// - column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSeries {
    index: Vec<NaiveDate>,
    columns: Vec<SeriesColumn>,
}

impl CanonicalSeries {
    /// Zero rows, zero columns. The "skip this ticker" result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a series from parts, checking the structural invariants.
    ///
    /// Returns `None` if the index is not strictly increasing, a column length
    /// does not match the index, or a column name repeats.
    pub fn from_parts(index: Vec<NaiveDate>, columns: Vec<SeriesColumn>) -> Option<Self> {
        if index.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        for (i, col) in columns.iter().enumerate() {
            if col.values.len() != index.len() {
                return None;
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return None;
            }
        }
        Some(Self { index, columns })
    }

    /// Convenience constructor for a close-only series.
    pub fn from_closes(index: Vec<NaiveDate>, closes: Vec<f64>) -> Option<Self> {
        Self::from_parts(
            index,
            vec![SeriesColumn {
                name: CLOSE.to_string(),
                values: closes.into_iter().map(Some).collect(),
            }],
        )
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[SeriesColumn] {
        &self.columns
    }

    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// True for the explicit empty series (no rows or no columns).
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// The `Close` column, if present.
    pub fn close(&self) -> Option<&[Cell]> {
        self.column(CLOSE)
    }

    /// Replace the column `name` in place, or append it if absent.
    ///
    /// Panics if `values` does not have one entry per row; indicator
    /// transforms always produce same-length output.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Cell>) -> Self {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.index.len(),
            "column '{name}' length does not match series height"
        );
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(SeriesColumn { name, values }),
        }
        self
    }

    /// The last `n` rows.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.index.len().saturating_sub(n);
        Self {
            index: self.index[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| SeriesColumn {
                    name: c.name.clone(),
                    values: c.values[start..].to_vec(),
                })
                .collect(),
        }
    }

    /// Merge `newer` into this series keyed by date.
    ///
    /// Rows from `newer` replace rows with the same date. The result has the
    /// union of both column sets: existing order first, then columns only
    /// `newer` has. Cells with no source are undefined.
    pub fn upsert(&self, newer: &CanonicalSeries) -> CanonicalSeries {
        if self.is_empty() {
            return newer.clone();
        }
        if newer.is_empty() {
            return self.clone();
        }

        let mut names: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        for col in &newer.columns {
            if !names.contains(&col.name) {
                names.push(col.name.clone());
            }
        }

        // date → (source, row)
        let mut rows: BTreeMap<NaiveDate, (&CanonicalSeries, usize)> = BTreeMap::new();
        for (i, date) in self.index.iter().enumerate() {
            rows.insert(*date, (self, i));
        }
        for (i, date) in newer.index.iter().enumerate() {
            rows.insert(*date, (newer, i));
        }

        let index: Vec<NaiveDate> = rows.keys().copied().collect();
        let columns = names
            .into_iter()
            .map(|name| {
                let values = rows
                    .values()
                    .map(|(src, row)| src.column(&name).and_then(|v| v[*row]))
                    .collect();
                SeriesColumn { name, values }
            })
            .collect();

        CanonicalSeries { index, columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn from_parts_rejects_unsorted_index() {
        let result = CanonicalSeries::from_closes(vec![day(3), day(2)], vec![1.0, 2.0]);
        assert!(result.is_none());
    }

    #[test]
    fn from_parts_rejects_duplicate_names() {
        let col = SeriesColumn {
            name: "Close".into(),
            values: vec![Some(1.0)],
        };
        assert!(CanonicalSeries::from_parts(vec![day(2)], vec![col.clone(), col]).is_none());
    }

    #[test]
    fn with_column_replaces_in_place() {
        let series = CanonicalSeries::from_closes(vec![day(2), day(3)], vec![1.0, 2.0])
            .unwrap()
            .with_column("RSI", vec![None, Some(1.0)])
            .with_column("Close", vec![Some(5.0), Some(6.0)]);

        assert_eq!(series.column_names(), vec!["Close", "RSI"]);
        assert_eq!(series.close().unwrap(), &[Some(5.0), Some(6.0)]);
    }

    #[test]
    fn empty_series_is_empty() {
        let series = CanonicalSeries::empty();
        assert!(series.is_empty());
        assert_eq!(series.height(), 0);
        assert_eq!(series.width(), 0);
    }

    #[test]
    fn tail_keeps_last_rows() {
        let series =
            CanonicalSeries::from_closes(vec![day(2), day(3), day(4)], vec![1.0, 2.0, 3.0]).unwrap();
        let tail = series.tail(2);
        assert_eq!(tail.index(), &[day(3), day(4)]);
        assert_eq!(tail.close().unwrap(), &[Some(2.0), Some(3.0)]);
        assert_eq!(series.tail(10).height(), 3);
    }

    #[test]
    fn upsert_overwrites_conflicting_dates() {
        let old = CanonicalSeries::from_closes(vec![day(2), day(3)], vec![1.0, 2.0]).unwrap();
        let new = CanonicalSeries::from_closes(vec![day(3), day(4)], vec![20.0, 30.0])
            .unwrap()
            .with_column("Volume", vec![Some(7.0), Some(8.0)]);

        let merged = old.upsert(&new);

        assert_eq!(merged.index(), &[day(2), day(3), day(4)]);
        assert_eq!(merged.close().unwrap(), &[Some(1.0), Some(20.0), Some(30.0)]);
        assert_eq!(merged.column("Volume").unwrap(), &[None, Some(7.0), Some(8.0)]);
    }

    #[test]
    fn raw_table_shape_queries() {
        let ts = day(2).and_hms_opt(0, 0, 0).unwrap();
        let table = RawTable::hierarchical(
            vec![ts],
            vec![
                GroupedColumn::new("AAPL", "close", vec![Some(1.0)]),
                GroupedColumn::new("AAPL", "open", vec![Some(1.0)]),
            ],
        );
        assert_eq!(table.height(), 1);
        assert_eq!(table.width(), 2);
        assert!(!table.is_empty());
        assert!(RawTable::empty().is_empty());
    }
}
