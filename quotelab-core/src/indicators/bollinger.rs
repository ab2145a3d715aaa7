//! Bollinger Bands: moving average +/- k standard deviations.
//!
//! - Middle Band: rolling mean of Close
//! - Upper Band: middle + k * stddev
//! - Lower Band: middle - k * stddev
//!
//! Sample stddev (divide by N - 1). Lookback: window - 1.

use super::rolling::{mean, rolling, sample_std};
use super::{Indicator, IndicatorError};
use crate::table::{CanonicalSeries, Cell};

pub const MIDDLE: &str = "Middle Band";
pub const UPPER: &str = "Upper Band";
pub const LOWER: &str = "Lower Band";

/// Middle, upper and lower band values, row-aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub middle: Vec<Cell>,
    pub upper: Vec<Cell>,
    pub lower: Vec<Cell>,
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    window: usize,
    k: f64,
}

impl BollingerBands {
    pub fn new(window: usize, k: f64) -> Result<Self, IndicatorError> {
        if window == 0 {
            return Err(IndicatorError::InvalidWindow {
                indicator: "Bollinger",
                window,
            });
        }
        if !k.is_finite() || k < 0.0 {
            return Err(IndicatorError::InvalidParameter(format!(
                "Bollinger k must be a non-negative number, got {k}"
            )));
        }
        Ok(Self { window, k })
    }

    pub fn compute(&self, closes: &[Cell]) -> Bands {
        let middle = rolling(closes, self.window, mean);
        let std = rolling(closes, self.window, sample_std);

        let band = |sign: f64| -> Vec<Cell> {
            middle
                .iter()
                .zip(&std)
                .map(|(m, s)| Some((*m)? + sign * self.k * (*s)?))
                .collect()
        };
        let upper = band(1.0);
        let lower = band(-1.0);

        Bands {
            middle,
            upper,
            lower,
        }
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn columns(&self) -> Vec<String> {
        vec![MIDDLE.to_string(), UPPER.to_string(), LOWER.to_string()]
    }

    fn apply(&self, series: CanonicalSeries) -> Result<CanonicalSeries, IndicatorError> {
        let closes = series
            .close()
            .map(<[_]>::to_vec)
            .unwrap_or_else(|| vec![None; series.height()]);
        let bands = self.compute(&closes);

        Ok(series
            .with_column(MIDDLE, bands.middle)
            .with_column(UPPER, bands.upper)
            .with_column(LOWER, bands.lower))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_series, DEFAULT_EPSILON};

    fn bands_of(closes: &[f64], window: usize, k: f64) -> Bands {
        let closes: Vec<Cell> = closes.iter().copied().map(Some).collect();
        BollingerBands::new(window, k).unwrap().compute(&closes)
    }

    #[test]
    fn middle_is_sma() {
        let bands = bands_of(&[10.0, 11.0, 12.0, 13.0, 14.0], 3, 2.0);
        assert!(bands.middle[0].is_none());
        assert!(bands.middle[1].is_none());
        assert_approx(bands.middle[2].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(bands.middle[3].unwrap(), 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bands_are_symmetric() {
        let bands = bands_of(&[10.0, 11.0, 12.0, 13.0, 14.0], 3, 2.0);
        for i in 2..5 {
            let up = bands.upper[i].unwrap() - bands.middle[i].unwrap();
            let down = bands.middle[i].unwrap() - bands.lower[i].unwrap();
            assert_approx(up, down, DEFAULT_EPSILON);
            // sample std of three consecutive integers is 1.0
            assert_approx(up, 2.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn constant_price_zero_width() {
        let bands = bands_of(&[100.0, 100.0, 100.0, 100.0], 3, 2.0);
        assert_approx(bands.upper[2].unwrap(), 100.0, DEFAULT_EPSILON);
        assert_approx(bands.lower[2].unwrap(), 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn apply_appends_three_columns_in_order() {
        let out = BollingerBands::new(3, 2.0)
            .unwrap()
            .apply(make_series(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        assert_eq!(
            out.column_names(),
            vec!["Close", "Middle Band", "Upper Band", "Lower Band"]
        );
    }

    #[test]
    fn rejects_negative_k() {
        assert!(BollingerBands::new(20, -1.0).is_err());
    }
}
