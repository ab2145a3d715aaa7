//! End-to-end pipeline scenarios with fixture sources and stores.
//!
//! Covers:
//! 1. Three growing tickers → all succeed, SMA_20 from row 19, positive correlation
//! 2. Empty fetch → ticker failed as "no data" and excluded from correlation
//! 3. Fetch errors and shape errors isolated per ticker
//! 4. Store acquire/release around each run, store failures, unavailable store

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quotelab_core::data::{DataSource, FetchError, TimeRangeSpec};
use quotelab_core::indicators::MovingAverages;
use quotelab_core::pipeline::{FailureReason, Pipeline, TickerStatus};
use quotelab_core::store::{MemoryStore, SeriesStore, StoreError};
use quotelab_core::table::{FlatColumn, GroupedColumn, RawTable};
use quotelab_core::{CanonicalSeries, IndicatorKind, IndicatorSelection, IndicatorSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Fixtures ─────────────────────────────────────────────────────────

fn stamp(i: usize) -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    NaiveDateTime::new(base + chrono::Duration::days(i as i64), NaiveTime::MIN)
}

/// Strictly increasing closes with a per-ticker slope.
fn linear_table(rows: usize, start: f64, step: f64) -> RawTable {
    let closes = (0..rows).map(|i| Some(start + step * i as f64)).collect();
    RawTable::flat(
        (0..rows).map(stamp).collect(),
        vec![
            FlatColumn::new("close", closes),
            FlatColumn::new("volume", vec![Some(1_000.0); rows]),
        ],
    )
}

enum Canned {
    Table(RawTable),
    Error(&'static str),
}

/// Serves canned tables; unknown tickers get an empty table.
#[derive(Default)]
struct FixtureSource {
    tables: HashMap<String, Canned>,
}

impl FixtureSource {
    fn with(mut self, ticker: &str, table: RawTable) -> Self {
        self.tables.insert(ticker.into(), Canned::Table(table));
        self
    }

    fn failing(mut self, ticker: &str, message: &'static str) -> Self {
        self.tables.insert(ticker.into(), Canned::Error(message));
        self
    }
}

impl DataSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, ticker: &str, _range: &TimeRangeSpec) -> Result<RawTable, FetchError> {
        match self.tables.get(ticker) {
            Some(Canned::Table(t)) => Ok(t.clone()),
            Some(Canned::Error(msg)) => Err(FetchError::Network((*msg).into())),
            None => Ok(RawTable::empty()),
        }
    }
}

fn abc_source() -> FixtureSource {
    FixtureSource::default()
        .with("A", linear_table(30, 100.0, 1.0))
        .with("B", linear_table(30, 50.0, 2.0))
        .with("C", linear_table(30, 20.0, 0.5))
}

fn sma_only() -> IndicatorSelection {
    IndicatorSelection::only(&[IndicatorKind::Sma])
}

/// Delegates to a shared MemoryStore so tests can inspect it after the
/// pipeline takes ownership.
struct SharedStore(Arc<MemoryStore>);

impl SeriesStore for SharedStore {
    fn store(&self, ticker: &str, series: &CanonicalSeries) -> Result<(), StoreError> {
        self.0.store(ticker, series)
    }
    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError> {
        self.0.load(ticker)
    }
    fn acquire(&self) -> Result<(), StoreError> {
        self.0.acquire()
    }
    fn release(&self) {
        self.0.release()
    }
}

/// Refuses writes for one ticker; counts releases.
struct PickyStore {
    reject: &'static str,
    releases: Arc<AtomicUsize>,
}

impl SeriesStore for PickyStore {
    fn store(&self, ticker: &str, _series: &CanonicalSeries) -> Result<(), StoreError> {
        if ticker == self.reject {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        } else {
            Ok(())
        }
    }
    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError> {
        Err(StoreError::NotFound {
            ticker: ticker.into(),
        })
    }
    fn acquire(&self) -> Result<(), StoreError> {
        Ok(())
    }
    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cannot be opened at all.
struct OfflineStore;

impl SeriesStore for OfflineStore {
    fn store(&self, _ticker: &str, _series: &CanonicalSeries) -> Result<(), StoreError> {
        panic!("store must not be used after a failed acquire");
    }
    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError> {
        Err(StoreError::NotFound {
            ticker: ticker.into(),
        })
    }
    fn acquire(&self) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("database locked")))
    }
    fn release(&self) {
        panic!("release without acquire");
    }
}

// ── 1. Happy path ────────────────────────────────────────────────────

#[test]
fn three_growing_tickers_all_succeed() {
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default());
    let report = pipeline.run(&["A", "B", "C"], &TimeRangeSpec::default(), &sma_only());

    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert_eq!(report.succeeded.len(), 3);

    for (ticker, series) in &report.succeeded {
        assert_eq!(series.height(), 30, "{ticker}");
        let sma = series.column(&MovingAverages::column_name(20)).unwrap();
        assert!(sma[..19].iter().all(Option::is_none), "{ticker}");
        assert!(sma[19..].iter().all(Option::is_some), "{ticker}");

        let closes: Vec<f64> = series.close().unwrap().iter().map(|c| c.unwrap()).collect();
        let expected = closes[10..30].iter().sum::<f64>() / 20.0;
        assert!((sma[29].unwrap() - expected).abs() < 1e-9);
        assert!(!series.has_column("RSI"));
    }

    let matrix = report.correlation.expect("correlation available");
    assert_eq!(matrix.tickers(), &["A", "B", "C"]);
    for a in ["A", "B", "C"] {
        assert_eq!(matrix.get(a, a), Some(1.0));
        for b in ["A", "B", "C"] {
            assert!(matrix.get(a, b).unwrap() > 0.0, "{a}/{b}");
        }
    }
    assert!(report.correlation_note.is_none());
}

#[test]
fn all_indicators_append_in_fixed_order() {
    let source = FixtureSource::default().with("A", linear_table(40, 100.0, 1.0));
    let pipeline = Pipeline::new(Box::new(source), IndicatorSettings::default());
    let report = pipeline.run(&["A"], &TimeRangeSpec::default(), &IndicatorSelection::all());

    let series = &report.succeeded["A"];
    assert_eq!(
        series.column_names(),
        vec![
            "Close",
            "Volume",
            "SMA_20",
            "SMA_50",
            "SMA_200",
            "RSI",
            "Volatility",
            "Middle Band",
            "Upper Band",
            "Lower Band"
        ]
    );
    // Strictly rising prices: no losses, RSI pinned at 100 once defined.
    let rsi = series.column("RSI").unwrap();
    assert!(rsi[14..].iter().all(|v| *v == Some(100.0)));
}

#[test]
fn tickers_are_normalized_before_fetch() {
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default());
    let report = pipeline.run(&[" a", "b ", "A"], &TimeRangeSpec::default(), &sma_only());
    assert_eq!(
        report.succeeded.keys().collect::<Vec<_>>(),
        vec!["A", "B"]
    );
}

// ── 2. Empty fetch ───────────────────────────────────────────────────

#[test]
fn empty_fetch_fails_ticker_and_skips_correlation_input() {
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default());
    let report = pipeline.run(&["A", "B", "ZZZZ"], &TimeRangeSpec::default(), &sma_only());

    assert_eq!(report.failed.get("ZZZZ"), Some(&FailureReason::NoData));
    assert!(!report.succeeded.contains_key("ZZZZ"));
    assert_eq!(report.status("ZZZZ"), Some(TickerStatus::NoData));
    assert_eq!(report.status("A"), Some(TickerStatus::Succeeded));

    let matrix = report.correlation.unwrap();
    assert_eq!(matrix.size(), 2);
    assert_eq!(matrix.get("ZZZZ", "A"), None);
}

#[test]
fn single_success_has_no_correlation() {
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default());
    let report = pipeline.run(&["A", "ZZZZ"], &TimeRangeSpec::default(), &sma_only());

    assert_eq!(report.succeeded.len(), 1);
    assert!(report.correlation.is_none());
    assert!(report.correlation_note.is_some());
}

#[test]
fn flat_ticker_does_not_hide_other_correlations() {
    let source = abc_source().with("CASH", linear_table(30, 1.0, 0.0));
    let pipeline = Pipeline::new(Box::new(source), IndicatorSettings::default());
    let report = pipeline.run(&["A", "B", "CASH"], &TimeRangeSpec::default(), &sma_only());

    assert_eq!(report.succeeded.len(), 3);
    let matrix = report.correlation.expect("correlation available");
    assert_eq!(matrix.size(), 3);
    assert!(matrix.get("A", "B").unwrap() > 0.0);
    assert_eq!(matrix.get("CASH", "CASH"), None);
    assert_eq!(matrix.get("A", "CASH"), None);
}

// ── 3. Per-ticker isolation ──────────────────────────────────────────

#[test]
fn fetch_error_is_isolated() {
    let source = abc_source().failing("B", "connection reset");
    let pipeline = Pipeline::new(Box::new(source), IndicatorSettings::default());
    let report = pipeline.run(&["A", "B", "C"], &TimeRangeSpec::default(), &sma_only());

    assert!(matches!(report.failed.get("B"), Some(FailureReason::Fetch(msg)) if msg.contains("connection reset")));
    assert_eq!(report.status("B"), Some(TickerStatus::Errored));
    assert_eq!(report.succeeded.len(), 2);
    assert!(report.correlation.is_some());
}

#[test]
fn table_without_close_is_reported_as_missing_close() {
    let rows = 5;
    let table = RawTable::flat(
        (0..rows).map(stamp).collect(),
        vec![
            FlatColumn::new("open", vec![Some(1.0); rows]),
            FlatColumn::new("high", vec![Some(2.0); rows]),
        ],
    );
    let source = abc_source().with("X", table);
    let pipeline = Pipeline::new(Box::new(source), IndicatorSettings::default());
    let report = pipeline.run(&["A", "X"], &TimeRangeSpec::default(), &sma_only());

    assert_eq!(report.failed.get("X"), Some(&FailureReason::MissingClose));
    assert_eq!(report.status("X"), Some(TickerStatus::NoData));
}

#[test]
fn hierarchical_tables_select_the_requested_ticker() {
    let rows = 25;
    let column = |outer: &str, inner: &str, base: f64| {
        GroupedColumn::new(outer, inner, (0..rows).map(|i| Some(base + i as f64)).collect())
    };
    let table = RawTable::hierarchical(
        (0..rows).map(stamp).collect(),
        vec![
            column("MSFT", "close", 300.0),
            column("AAPL", "open", 180.0),
            column("AAPL", "close", 181.0),
        ],
    );
    let source = FixtureSource::default().with("AAPL", table);
    let pipeline = Pipeline::new(Box::new(source), IndicatorSettings::default());
    let report = pipeline.run(&["aapl"], &TimeRangeSpec::default(), &sma_only());

    let series = &report.succeeded["AAPL"];
    assert_eq!(series.close().unwrap()[0], Some(181.0));
    assert!(series.has_column("Open"));
}

#[test]
fn invalid_settings_fail_every_ticker() {
    let settings = IndicatorSettings {
        rsi_window: 0,
        ..IndicatorSettings::default()
    };
    let pipeline = Pipeline::new(Box::new(abc_source()), settings);
    let report = pipeline.run(
        &["A", "B"],
        &TimeRangeSpec::default(),
        &IndicatorSelection::only(&[IndicatorKind::Rsi]),
    );
    assert!(report.succeeded.is_empty());
    assert!(matches!(report.failed.get("A"), Some(FailureReason::Indicator(_))));
}

// ── 4. Persistence ───────────────────────────────────────────────────

#[test]
fn successful_series_are_stored_within_one_acquisition() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default())
        .with_store(Box::new(SharedStore(Arc::clone(&store))));

    let report = pipeline.run(&["A", "B", "ZZZZ"], &TimeRangeSpec::default(), &sma_only());
    assert_eq!(store.tickers(), vec!["A", "B"]);
    assert_eq!(store.load("A").unwrap(), report.succeeded["A"]);
    assert_eq!(store.acquisitions(), 1);
    assert_eq!(store.open_handles(), 0);

    pipeline.run(&["A"], &TimeRangeSpec::default(), &sma_only());
    assert_eq!(store.acquisitions(), 2);
    assert_eq!(store.open_handles(), 0);
}

#[test]
fn store_failure_fails_only_that_ticker() {
    let releases = Arc::new(AtomicUsize::new(0));
    let store = PickyStore {
        reject: "B",
        releases: Arc::clone(&releases),
    };
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default())
        .with_store(Box::new(store));
    let report = pipeline.run(&["A", "B", "C"], &TimeRangeSpec::default(), &sma_only());

    assert!(matches!(report.failed.get("B"), Some(FailureReason::Store(_))));
    assert_eq!(report.status("B"), Some(TickerStatus::Errored));
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_store_skips_persistence() {
    let pipeline = Pipeline::new(Box::new(abc_source()), IndicatorSettings::default())
        .with_store(Box::new(OfflineStore));
    let report = pipeline.run(&["A", "B"], &TimeRangeSpec::default(), &sma_only());

    assert!(report.failed.is_empty());
    assert_eq!(report.succeeded.len(), 2);
}
