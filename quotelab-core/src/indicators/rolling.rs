//! Trailing-window helpers shared by the indicator transforms.

use crate::table::Cell;

/// Apply `stat` over every full trailing window of `values`.
///
/// Output has the same length as the input. Entry `i` is `None` when fewer
/// than `window` observations end at `i`, or when any value in the window is
/// undefined or non-finite.
pub fn rolling<F>(values: &[Cell], window: usize, stat: F) -> Vec<Cell>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let n = values.len();
    let mut result = vec![None; n];
    if window == 0 || n < window {
        return result;
    }

    let mut buf = Vec::with_capacity(window);
    for i in (window - 1)..n {
        buf.clear();
        for v in &values[(i + 1 - window)..=i] {
            match v {
                Some(x) if x.is_finite() => buf.push(*x),
                _ => break,
            }
        }
        if buf.len() == window {
            result[i] = stat(&buf);
        }
    }
    result
}

/// Arithmetic mean.
pub fn mean(window: &[f64]) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    Some(window.iter().sum::<f64>() / window.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). Undefined below 2 points.
pub fn sample_std(window: &[f64]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }
    let m = mean(window)?;
    let ss: f64 = window.iter().map(|x| (x - m) * (x - m)).sum();
    Some((ss / (window.len() - 1) as f64).sqrt())
}

/// Pairwise difference with the previous entry; the first entry is undefined.
pub fn diff(values: &[Cell]) -> Vec<Cell> {
    lagged(values, |prev, curr| Some(curr - prev))
}

/// Combine each entry with its predecessor. Undefined when either side is.
pub fn lagged<F>(values: &[Cell], f: F) -> Vec<Cell>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    for w in values.windows(2) {
        out.push(match (w[0], w[1]) {
            (Some(prev), Some(curr)) => f(prev, curr).filter(|v| v.is_finite()),
            _ => None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rolling_mean_warmup_is_undefined() {
        let values: Vec<Cell> = [1.0, 2.0, 3.0, 4.0].into_iter().map(Some).collect();
        let out = rolling(&values, 3, mean);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_approx(out[2].unwrap(), 2.0, DEFAULT_EPSILON);
        assert_approx(out[3].unwrap(), 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn undefined_input_poisons_its_windows() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        let out = rolling(&values, 2, mean);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert_approx(out[3].unwrap(), 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_counts_as_undefined() {
        let values = vec![Some(1.0), Some(f64::NAN), Some(3.0)];
        let out = rolling(&values, 2, mean);
        assert_eq!(out, vec![None, None, None]);
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        // mean 2.5, squared deviations sum 5.0, / 3 → 1.666..
        let std = sample_std(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_approx(std, (5.0f64 / 3.0).sqrt(), DEFAULT_EPSILON);
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn diff_first_is_undefined() {
        let values = vec![Some(1.0), Some(4.0), None, Some(2.0)];
        assert_eq!(diff(&values), vec![None, Some(3.0), None, None]);
    }
}
