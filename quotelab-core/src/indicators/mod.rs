//! Indicator transforms over a `CanonicalSeries`.
//!
//! Each transform appends named columns and leaves existing columns, their
//! order, and the row index untouched. Rolling statistics use a fixed-size
//! trailing window; rows before the window fills are `None`, as are windows
//! containing any undefined input.

pub mod bollinger;
pub mod rolling;
pub mod rsi;
pub mod sma;
pub mod volatility;

pub use bollinger::BollingerBands;
pub use rsi::Rsi;
pub use sma::MovingAverages;
pub use volatility::Volatility;

use crate::table::CanonicalSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("series has no '{0}' column")]
    MissingColumn(String),

    #[error("{indicator} window must be >= 1, got {window}")]
    InvalidWindow {
        indicator: &'static str,
        window: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown indicator '{0}' (expected sma, rsi, volatility or bollinger)")]
    UnknownIndicator(String),
}

/// A pure transform: series in, series with extra columns out.
pub trait Indicator: Send + Sync {
    /// Short identifier ("sma", "rsi", ...).
    fn name(&self) -> &str;

    /// Names of the columns this transform appends.
    fn columns(&self) -> Vec<String>;

    fn apply(&self, series: CanonicalSeries) -> Result<CanonicalSeries, IndicatorError>;
}

/// The selectable indicator families, ordered by application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Sma,
    Rsi,
    Volatility,
    Bollinger,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 4] = [
        IndicatorKind::Sma,
        IndicatorKind::Rsi,
        IndicatorKind::Volatility,
        IndicatorKind::Bollinger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Volatility => "volatility",
            IndicatorKind::Bollinger => "bollinger",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" | "ma" | "moving_averages" => Ok(IndicatorKind::Sma),
            "rsi" => Ok(IndicatorKind::Rsi),
            "volatility" | "vol" => Ok(IndicatorKind::Volatility),
            "bollinger" | "bb" => Ok(IndicatorKind::Bollinger),
            other => Err(IndicatorError::UnknownIndicator(other.to_string())),
        }
    }
}

/// Caller-selected subset of indicators. Iteration follows the fixed
/// application order regardless of how the set was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSelection(BTreeSet<IndicatorKind>);

impl IndicatorSelection {
    pub fn all() -> Self {
        Self(IndicatorKind::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn only(kinds: &[IndicatorKind]) -> Self {
        Self(kinds.iter().copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for IndicatorSelection {
    type Err = IndicatorError;

    /// Comma-separated kinds, or `all` / `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => return Ok(Self::all()),
            "" | "none" => return Ok(Self::none()),
            _ => {}
        }
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(IndicatorKind::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }
}

/// Parameters for every transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub sma_windows: Vec<usize>,
    pub rsi_window: usize,
    pub volatility_window: usize,
    /// Annualization factor is `sqrt(trading_days)`.
    pub trading_days: u32,
    pub bollinger_window: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            sma_windows: vec![20, 50, 200],
            rsi_window: 14,
            volatility_window: 20,
            trading_days: 252,
            bollinger_window: 20,
            bollinger_k: 2.0,
        }
    }
}

impl IndicatorSettings {
    /// Build the transform for one indicator family.
    pub fn build(&self, kind: IndicatorKind) -> Result<Box<dyn Indicator>, IndicatorError> {
        Ok(match kind {
            IndicatorKind::Sma => Box::new(MovingAverages::new(self.sma_windows.clone())?),
            IndicatorKind::Rsi => Box::new(Rsi::new(self.rsi_window)?),
            IndicatorKind::Volatility => Box::new(Volatility::new(
                self.volatility_window,
                self.trading_days,
            )?),
            IndicatorKind::Bollinger => Box::new(BollingerBands::new(
                self.bollinger_window,
                self.bollinger_k,
            )?),
        })
    }

    /// Transforms for `selection`, in application order.
    pub fn transforms(
        &self,
        selection: &IndicatorSelection,
    ) -> Result<Vec<Box<dyn Indicator>>, IndicatorError> {
        selection.iter().map(|kind| self.build(kind)).collect()
    }
}

/// Build a close-only series on consecutive days for tests.
#[cfg(test)]
pub fn make_series(closes: &[f64]) -> CanonicalSeries {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let index = (0..closes.len())
        .map(|i| base_date + chrono::Duration::days(i as i64))
        .collect();
    CanonicalSeries::from_closes(index, closes.to_vec()).unwrap()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
