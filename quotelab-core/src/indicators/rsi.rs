//! Relative Strength Index (RSI).
//!
//! delta = Close[t] - Close[t-1]; gain/loss are trailing simple means of the
//! positive and negative parts of delta.
//! RSI = 100 - 100 / (1 + gain / loss)
//! The first `window` rows are undefined (delta[0] is undefined).
//! Edge case: loss == 0 → RSI = 100.

use super::rolling::{diff, mean, rolling};
use super::{Indicator, IndicatorError};
use crate::table::{CanonicalSeries, Cell};

pub const COLUMN: &str = "RSI";

#[derive(Debug, Clone)]
pub struct Rsi {
    window: usize,
}

impl Rsi {
    pub fn new(window: usize) -> Result<Self, IndicatorError> {
        if window == 0 {
            return Err(IndicatorError::InvalidWindow {
                indicator: "RSI",
                window,
            });
        }
        Ok(Self { window })
    }

    /// RSI values for a close sequence.
    pub fn compute(&self, closes: &[Cell]) -> Vec<Cell> {
        let delta = diff(closes);
        let gains: Vec<Cell> = delta.iter().map(|d| d.map(|d| d.max(0.0))).collect();
        let losses: Vec<Cell> = delta.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();

        let avg_gain = rolling(&gains, self.window, mean);
        let avg_loss = rolling(&losses, self.window, mean);

        avg_gain
            .into_iter()
            .zip(avg_loss)
            .map(|(gain, loss)| Some(rsi_value(gain?, loss?)))
            .collect()
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn columns(&self) -> Vec<String> {
        vec![COLUMN.to_string()]
    }

    fn apply(&self, series: CanonicalSeries) -> Result<CanonicalSeries, IndicatorError> {
        let values = match series.close() {
            Some(closes) => self.compute(closes),
            None => vec![None; series.height()],
        };
        Ok(series.with_column(COLUMN, values))
    }
}
