//! Schema normalization: raw upstream tables → `CanonicalSeries`.
//!
//! Steps, in order:
//! 1. zero rows → empty series
//! 2. capitalize every label (both levels of a hierarchical header)
//! 3. hierarchical: select the requested ticker's sub-table, else the first one
//! 4. a lone column is a bare closing-price sequence → `Close`
//! 5. require a `close` column (case-insensitive)
//! 6. rename to canonical names, drop duplicates
//!
//! Finally the index is truncated to dates, stable-sorted, and duplicate dates
//! keep their first row.

use crate::table::{CanonicalSeries, FlatColumn, GroupedColumn, RawColumns, RawTable, SeriesColumn};
use thiserror::Error;
use tracing::{debug, warn};

/// Case-insensitive mapping onto the canonical schema.
const CANONICAL_NAMES: [(&str, &str); 6] = [
    ("close", "Close"),
    ("open", "Open"),
    ("high", "High"),
    ("low", "Low"),
    ("volume", "Volume"),
    ("adj close", "Adj Close"),
];

/// Known fields that must never be reinterpreted as a closing price.
const NON_CLOSE_FIELDS: [&str; 4] = ["open", "high", "low", "volume"];

/// Why a raw table could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("raw table has no rows")]
    NoRows,

    #[error("missing required Close column (available: {available:?})")]
    MissingClose { available: Vec<String> },

    #[error("column '{label}' has {len} values for {height} rows")]
    RaggedColumn {
        label: String,
        len: usize,
        height: usize,
    },

    #[error("normalized series violates canonical invariants")]
    Inconsistent,
}

/// Normalizer for raw tables.
pub struct Normalizer;

impl Normalizer {
    /// Normalize a raw table for `ticker`. Never fails: every shape problem
    /// degrades to `CanonicalSeries::empty()`.
    pub fn normalize(raw: RawTable, ticker: &str) -> CanonicalSeries {
        match Self::normalize_checked(raw, ticker) {
            Ok(series) => series,
            Err(ShapeError::NoRows) => {
                debug!(ticker, "raw table is empty");
                CanonicalSeries::empty()
            }
            Err(e) => {
                warn!(ticker, error = %e, "could not normalize raw table");
                CanonicalSeries::empty()
            }
        }
    }

    /// Normalize, reporting the reason when the result would be empty.
    pub fn normalize_checked(raw: RawTable, ticker: &str) -> Result<CanonicalSeries, ShapeError> {
        if raw.is_empty() {
            return Err(ShapeError::NoRows);
        }

        let RawTable { index, columns } = raw;
        let height = index.len();

        let mut selected: Vec<FlatColumn> = match columns {
            RawColumns::Flat(cols) => cols
                .into_iter()
                .map(|c| FlatColumn::new(capitalize(&c.label), c.values))
                .collect(),
            RawColumns::Hierarchical(cols) => select_ticker(cols, ticker),
        };

        if let Some(col) = selected.iter().find(|c| c.values.len() != height) {
            return Err(ShapeError::RaggedColumn {
                label: col.label.clone(),
                len: col.values.len(),
                height,
            });
        }

        if let [only] = selected.as_mut_slice() {
            if !is_non_close_field(&only.label) {
                debug!(ticker, label = %only.label, "treating single column as Close");
                only.label = crate::table::CLOSE.to_string();
            }
        }

        if !selected
            .iter()
            .any(|c| c.label.eq_ignore_ascii_case("close"))
        {
            return Err(ShapeError::MissingClose {
                available: selected.into_iter().map(|c| c.label).collect(),
            });
        }

        let mut named: Vec<SeriesColumn> = Vec::with_capacity(selected.len());
        for col in selected {
            let name = canonical_name(&col.label);
            if named.iter().any(|c| c.name == name) {
                debug!(ticker, label = %col.label, "dropping duplicate column");
                continue;
            }
            named.push(SeriesColumn {
                name,
                values: col.values,
            });
        }

        // Stable sort keeps source order among equal dates; first one wins.
        let mut order: Vec<usize> = (0..height).collect();
        order.sort_by_key(|&i| index[i].date());

        let mut dates = Vec::with_capacity(height);
        let mut keep = Vec::with_capacity(height);
        for i in order {
            let date = index[i].date();
            if dates.last() == Some(&date) {
                continue;
            }
            dates.push(date);
            keep.push(i);
        }
        if keep.len() < height {
            debug!(ticker, dropped = height - keep.len(), "dropped duplicate dates");
        }

        let columns = named
            .into_iter()
            .map(|c| SeriesColumn {
                name: c.name,
                values: keep.iter().map(|&i| c.values[i]).collect(),
            })
            .collect();

        CanonicalSeries::from_parts(dates, columns).ok_or(ShapeError::Inconsistent)
    }
}

/// Upper-case the first character; the rest is kept as given.
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Map a label onto the canonical schema; unmapped labels pass through.
pub fn canonical_name(label: &str) -> String {
    let lower = label.to_lowercase();
    CANONICAL_NAMES
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| label.to_string())
}

fn is_non_close_field(label: &str) -> bool {
    let lower = label.to_lowercase();
    NON_CLOSE_FIELDS.contains(&lower.as_str())
}

/// Pick the sub-table for `ticker` (after capitalization) or, failing that,
/// the first outer label in column order.
fn select_ticker(cols: Vec<GroupedColumn>, ticker: &str) -> Vec<FlatColumn> {
    let cols: Vec<GroupedColumn> = cols
        .into_iter()
        .map(|c| GroupedColumn::new(capitalize(&c.outer), capitalize(&c.inner), c.values))
        .collect();

    let wanted = capitalize(ticker);
    let outer = if cols.iter().any(|c| c.outer == wanted) {
        wanted
    } else {
        match cols.first() {
            Some(first) => {
                debug!(ticker, fallback = %first.outer, "ticker not in column header, using first group");
                first.outer.clone()
            }
            None => return Vec::new(),
        }
    };

    cols.into_iter()
        .filter(|c| c.outer == outer)
        .map(|c| FlatColumn::new(c.inner, c.values))
        .collect()
}
