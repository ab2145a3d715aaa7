//! Simple Moving Averages.
//!
//! One `SMA_{w}` column per configured window: rolling mean of Close over the
//! trailing `w` rows. First valid value at index `w - 1`.

use super::rolling::{mean, rolling};
use super::{Indicator, IndicatorError};
use crate::table::CanonicalSeries;

#[derive(Debug, Clone)]
pub struct MovingAverages {
    windows: Vec<usize>,
}

impl MovingAverages {
    pub fn new(windows: Vec<usize>) -> Result<Self, IndicatorError> {
        if let Some(&bad) = windows.iter().find(|&&w| w == 0) {
            return Err(IndicatorError::InvalidWindow {
                indicator: "SMA",
                window: bad,
            });
        }
        Ok(Self { windows })
    }

    pub fn column_name(window: usize) -> String {
        format!("SMA_{window}")
    }
}

impl Indicator for MovingAverages {
    fn name(&self) -> &str {
        "sma"
    }

    fn columns(&self) -> Vec<String> {
        self.windows.iter().map(|&w| Self::column_name(w)).collect()
    }

    fn apply(&self, series: CanonicalSeries) -> Result<CanonicalSeries, IndicatorError> {
        let closes = series
            .close()
            .map(<[_]>::to_vec)
            .unwrap_or_else(|| vec![None; series.height()]);

        Ok(self.windows.iter().fold(series, |acc, &w| {
            acc.with_column(Self::column_name(w), rolling(&closes, w, mean))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_series, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let series = make_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let out = MovingAverages::new(vec![5]).unwrap().apply(series).unwrap();
        let sma = out.column("SMA_5").unwrap();

        assert_eq!(sma.len(), 7);
        for (i, v) in sma.iter().enumerate().take(4) {
            assert!(v.is_none(), "expected undefined at index {i}");
        }
        // SMA[4] = mean(10,11,12,13,14) = 12.0
        assert_approx(sma[4].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(sma[5].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(sma[6].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let series = make_series(&[100.0, 200.0, 300.0]);
        let out = MovingAverages::new(vec![1]).unwrap().apply(series).unwrap();
        assert_eq!(out.column("SMA_1"), out.close());
    }

    #[test]
    fn default_windows_produce_three_columns() {
        let series = make_series(&[50.0; 250]);
        let out = MovingAverages::new(vec![20, 50, 200])
            .unwrap()
            .apply(series)
            .unwrap();
        assert_eq!(out.column_names(), vec!["Close", "SMA_20", "SMA_50", "SMA_200"]);
        assert!(out.column("SMA_200").unwrap()[198].is_none());
        assert_approx(out.column("SMA_200").unwrap()[199].unwrap(), 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_few_rows() {
        let series = make_series(&[10.0, 11.0]);
        let out = MovingAverages::new(vec![5]).unwrap().apply(series).unwrap();
        assert!(out.column("SMA_5").unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn sma_without_close_is_undefined_not_an_error() {
        let out = MovingAverages::new(vec![2])
            .unwrap()
            .apply(CanonicalSeries::empty())
            .unwrap();
        assert_eq!(out.column("SMA_2").unwrap().len(), 0);
    }

    #[test]
    fn rejects_zero_window() {
        assert!(MovingAverages::new(vec![20, 0]).is_err());
    }
}
