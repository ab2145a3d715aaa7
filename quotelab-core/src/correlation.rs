//! Cross-ticker correlation of daily returns.
//!
//! Close prices are inner-joined on date (a date survives only if every
//! ticker has it), turned into simple percentage returns, and correlated
//! pairwise with Pearson's coefficient.

use crate::table::CanonicalSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Why a correlation matrix could not be produced. Not a failure of the
/// run: the matrix is simply unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsufficientData {
    #[error("correlation needs at least 2 tickers, got {0}")]
    TooFewTickers(usize),

    #[error("correlation needs at least 2 aligned return observations, got {0}")]
    TooFewObservations(usize),

    #[error(
        "correlation needs at least 2 tickers with varying returns; constant: {}",
        .constant.join(", ")
    )]
    TooFewVarying { constant: Vec<String> },
}

/// Square, symmetric matrix keyed by ticker on both axes.
///
/// A ticker whose returns are constant over the aligned range keeps its
/// place on both axes, but every cell in its row and column is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    tickers: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Row-major values, rows and columns in `tickers()` order.
    pub fn values(&self) -> &[Vec<Option<f64>>] {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.tickers.len()
    }

    /// `None` for unknown tickers and for undefined cells.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        self.values[i][j]
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.size()).all(|i| (0..self.size()).all(|j| self.values[i][j] == self.values[j][i]))
    }
}

/// Close prices aligned on the dates every ticker shares.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedCloses {
    pub dates: Vec<NaiveDate>,
    /// Per ticker, one entry per aligned date.
    pub closes: BTreeMap<String, Vec<Option<f64>>>,
}

/// Inner join of every series' Close column on date.
pub fn aligned_closes(series_by_ticker: &BTreeMap<String, CanonicalSeries>) -> AlignedCloses {
    let mut common: Option<BTreeSet<NaiveDate>> = None;
    for series in series_by_ticker.values() {
        let dates: BTreeSet<NaiveDate> = match series.close() {
            Some(_) => series.index().iter().copied().collect(),
            None => BTreeSet::new(),
        };
        common = Some(match common {
            None => dates,
            Some(acc) => acc.intersection(&dates).copied().collect(),
        });
    }
    let dates: Vec<NaiveDate> = common.unwrap_or_default().into_iter().collect();

    let closes = series_by_ticker
        .iter()
        .map(|(ticker, series)| {
            let close = series.close().unwrap_or(&[]);
            let index = series.index();
            // Both `dates` and `index` are sorted: walk them together.
            let mut values = Vec::with_capacity(dates.len());
            let mut pos = 0;
            for date in &dates {
                while pos < index.len() && index[pos] < *date {
                    pos += 1;
                }
                values.push(close.get(pos).copied().flatten());
            }
            (ticker.clone(), values)
        })
        .collect();

    AlignedCloses { dates, closes }
}

/// Pairwise Pearson correlation of daily percentage returns.
pub fn correlate(
    series_by_ticker: &BTreeMap<String, CanonicalSeries>,
) -> Result<CorrelationMatrix, InsufficientData> {
    if series_by_ticker.len() < 2 {
        return Err(InsufficientData::TooFewTickers(series_by_ticker.len()));
    }

    let aligned = aligned_closes(series_by_ticker);
    let tickers: Vec<String> = aligned.closes.keys().cloned().collect();
    let returns: Vec<Vec<Option<f64>>> = aligned
        .closes
        .values()
        .map(|closes| pct_change(closes))
        .collect();

    // Drop the leading undefined row and any row undefined for some ticker.
    let rows = aligned.dates.len();
    let complete: Vec<usize> = (0..rows)
        .filter(|&r| returns.iter().all(|col| col[r].is_some()))
        .collect();
    if complete.len() < 2 {
        return Err(InsufficientData::TooFewObservations(complete.len()));
    }
    let columns: Vec<Vec<f64>> = returns
        .iter()
        .map(|col| complete.iter().filter_map(|&r| col[r]).collect())
        .collect();

    let varying: Vec<bool> = columns.iter().map(|c| !is_constant(c)).collect();
    if varying.iter().filter(|&&v| v).count() < 2 {
        return Err(InsufficientData::TooFewVarying {
            constant: tickers
                .iter()
                .zip(&varying)
                .filter(|(_, v)| !**v)
                .map(|(t, _)| t.clone())
                .collect(),
        });
    }

    let centered: Vec<(Vec<f64>, f64)> = columns.iter().map(|c| center(c)).collect();
    let n = tickers.len();
    let mut values = vec![vec![None; n]; n];
    for i in (0..n).filter(|&i| varying[i]) {
        values[i][i] = Some(1.0);
        for j in ((i + 1)..n).filter(|&j| varying[j]) {
            let r = pearson(&centered[i], &centered[j]);
            values[i][j] = Some(r);
            values[j][i] = Some(r);
        }
    }

    Ok(CorrelationMatrix { tickers, values })
}

/// Simple returns (c[t] - c[t-1]) / c[t-1]; the first entry is undefined.
fn pct_change(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    crate::indicators::rolling::lagged(closes, |prev, curr| {
        if prev == 0.0 {
            None
        } else {
            Some((curr - prev) / prev)
        }
    })
}

/// Deviations from the mean and their sum of squares.
fn center(values: &[f64]) -> (Vec<f64>, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let dev: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let ss = dev.iter().map(|d| d * d).sum();
    (dev, ss)
}

/// True when the spread is zero up to floating-point noise relative to the
/// magnitude of the values.
fn is_constant(values: &[f64]) -> bool {
    let (_, ss) = center(values);
    let scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    ss <= values.len() as f64 * (1e-12 * scale).powi(2)
}

fn pearson(a: &(Vec<f64>, f64), b: &(Vec<f64>, f64)) -> f64 {
    let cov: f64 = a.0.iter().zip(&b.0).map(|(x, y)| x * y).sum();
    (cov / (a.1 * b.1).sqrt()).clamp(-1.0, 1.0)
}
