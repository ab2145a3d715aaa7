//! Annualized historical volatility.
//!
//! r[t] = ln(Close[t] / Close[t-1]); Volatility = stddev(r, window) * sqrt(trading_days).
//! Sample standard deviation. First valid value at index `window`.
//!
//! Unlike the other transforms this one requires a Close column and fails
//! with `IndicatorError::MissingColumn` without it.

use super::rolling::{lagged, rolling, sample_std};
use super::{Indicator, IndicatorError};
use crate::table::{CanonicalSeries, Cell, CLOSE};

pub const COLUMN: &str = "Volatility";

#[derive(Debug, Clone)]
pub struct Volatility {
    window: usize,
    trading_days: u32,
}

impl Volatility {
    pub fn new(window: usize, trading_days: u32) -> Result<Self, IndicatorError> {
        if window == 0 {
            return Err(IndicatorError::InvalidWindow {
                indicator: "Volatility",
                window,
            });
        }
        if trading_days == 0 {
            return Err(IndicatorError::InvalidParameter(
                "trading_days must be >= 1".into(),
            ));
        }
        Ok(Self {
            window,
            trading_days,
        })
    }

    /// Log returns; undefined on the first row and for non-positive prices.
    pub fn log_returns(closes: &[Cell]) -> Vec<Cell> {
        lagged(closes, |prev, curr| {
            if prev > 0.0 && curr > 0.0 {
                Some((curr / prev).ln())
            } else {
                None
            }
        })
    }

    pub fn compute(&self, closes: &[Cell]) -> Vec<Cell> {
        let factor = f64::from(self.trading_days).sqrt();
        rolling(&Self::log_returns(closes), self.window, sample_std)
            .into_iter()
            .map(|std| std.map(|s| s * factor))
            .collect()
    }
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        "volatility"
    }

    fn columns(&self) -> Vec<String> {
        vec![COLUMN.to_string()]
    }

    fn apply(&self, series: CanonicalSeries) -> Result<CanonicalSeries, IndicatorError> {
        let values = self.compute(
            series
                .close()
                .ok_or_else(|| IndicatorError::MissingColumn(CLOSE.to_string()))?,
        );
        Ok(series.with_column(COLUMN, values))
    }
}
