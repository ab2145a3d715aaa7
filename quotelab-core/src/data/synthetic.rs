//! Deterministic synthetic price data for offline runs and tests.
//!
//! Each ticker gets its own random walk seeded from the BLAKE3 hash of its
//! symbol, so the same ticker and range always produce the same rows.

use super::provider::{DataSource, FetchError, TimeRangeSpec};
use crate::table::{FlatColumn, RawTable};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const START_PRICE: f64 = 100.0;

pub struct SyntheticSource {
    anchor: NaiveDate,
}

impl SyntheticSource {
    /// Period ranges end at `anchor`.
    pub fn new(anchor: NaiveDate) -> Self {
        Self { anchor }
    }

    /// Weekday rows in `[start, end]` as a flat lowercase table.
    pub fn generate(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> RawTable {
        let seed: [u8; 32] = *blake3::hash(ticker.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut index = Vec::new();
        let (mut open, mut high, mut low, mut close, mut volume) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let mut price = START_PRICE;

        for day in start.iter_days().take_while(|d| *d <= end) {
            if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let o = price;
            let c = price * (1.0 + daily_return);
            let h = o.max(c) * (1.0 + rng.gen_range(0.0..0.01));
            let l = o.min(c) * (1.0 - rng.gen_range(0.0..0.01));
            let v = rng.gen_range(500_000..5_000_000u64) as f64;

            index.push(NaiveDateTime::new(day, NaiveTime::MIN));
            open.push(Some(o));
            high.push(Some(h));
            low.push(Some(l));
            close.push(Some(c));
            volume.push(Some(v));
            price = c;
        }

        RawTable::flat(
            index,
            vec![
                FlatColumn::new("open", open),
                FlatColumn::new("high", high),
                FlatColumn::new("low", low),
                FlatColumn::new("adj close", close.clone()),
                FlatColumn::new("close", close),
                FlatColumn::new("volume", volume),
            ],
        )
    }
}

impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, ticker: &str, range: &TimeRangeSpec) -> Result<RawTable, FetchError> {
        let (start, end) = range.resolve(self.anchor);
        Ok(self.generate(ticker, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    #[test]
    fn deterministic_per_ticker() {
        let source = SyntheticSource::new(anchor());
        let range = TimeRangeSpec::default();
        let a = source.fetch("AAPL", &range).unwrap();
        let b = source.fetch("AAPL", &range).unwrap();
        let c = source.fetch("MSFT", &range).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn weekdays_only() {
        let source = SyntheticSource::new(anchor());
        let table = source.fetch("AAPL", &"1mo".parse().unwrap()).unwrap();
        assert!(!table.is_empty());
        assert!(table
            .index
            .iter()
            .all(|t| !matches!(t.date().weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn high_low_bracket_open_close() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let table = SyntheticSource::new(anchor()).generate("XYZ", start, anchor());
        let crate::table::RawColumns::Flat(cols) = &table.columns else {
            panic!("expected flat columns");
        };
        let get = |label: &str| &cols.iter().find(|c| c.label == label).unwrap().values;
        let (o, h, l, c) = (get("open"), get("high"), get("low"), get("close"));
        for i in 0..table.height() {
            let (o, h, l, c) = (o[i].unwrap(), h[i].unwrap(), l[i].unwrap(), c[i].unwrap());
            assert!(h >= o.max(c) && l <= o.min(c));
        }
    }
}
