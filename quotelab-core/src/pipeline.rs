//! Per-ticker orchestration: fetch → normalize → indicators → store, then
//! cross-ticker correlation.
//!
//! Tickers are processed one at a time. A failure at any stage removes that
//! ticker from the result and records why; it never stops the batch. Each
//! `run` owns all of its state, so overlapping runs on one `Pipeline` do not
//! interact.

use crate::correlation::{correlate, CorrelationMatrix};
use crate::data::{DataSource, FetchError, TimeRangeSpec};
use crate::indicators::{Indicator, IndicatorError, IndicatorSelection, IndicatorSettings};
use crate::normalize::{Normalizer, ShapeError};
use crate::store::{SeriesStore, StoreGuard};
use crate::table::CanonicalSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Why a ticker is missing from a run's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The source returned no rows.
    NoData,
    /// Rows came back, but without a closing price.
    MissingClose,
    MalformedTable(String),
    Fetch(String),
    Indicator(String),
    Store(String),
}

impl FailureReason {
    /// "Produced no data" as opposed to "errored".
    pub fn is_no_data(&self) -> bool {
        matches!(self, FailureReason::NoData | FailureReason::MissingClose)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoData => f.write_str("no data returned"),
            FailureReason::MissingClose => f.write_str("missing required Close column"),
            FailureReason::MalformedTable(e) => write!(f, "malformed table: {e}"),
            FailureReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            FailureReason::Indicator(e) => write!(f, "indicator failed: {e}"),
            FailureReason::Store(e) => write!(f, "store failed: {e}"),
        }
    }
}

impl From<ShapeError> for FailureReason {
    fn from(e: ShapeError) -> Self {
        match e {
            ShapeError::NoRows => FailureReason::NoData,
            ShapeError::MissingClose { .. } => FailureReason::MissingClose,
            other => FailureReason::MalformedTable(other.to_string()),
        }
    }
}

impl From<FetchError> for FailureReason {
    fn from(e: FetchError) -> Self {
        FailureReason::Fetch(e.to_string())
    }
}

impl From<IndicatorError> for FailureReason {
    fn from(e: IndicatorError) -> Self {
        FailureReason::Indicator(e.to_string())
    }
}

/// Outcome for one requested ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerStatus {
    Succeeded,
    NoData,
    Errored,
}

/// Everything one run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub succeeded: BTreeMap<String, CanonicalSeries>,
    pub failed: BTreeMap<String, FailureReason>,
    /// Present when at least two tickers succeeded with usable returns.
    pub correlation: Option<CorrelationMatrix>,
    /// Why `correlation` is absent, when it is.
    pub correlation_note: Option<String>,
}

impl RunReport {
    /// `None` for tickers that were not part of the run.
    pub fn status(&self, ticker: &str) -> Option<TickerStatus> {
        if self.succeeded.contains_key(ticker) {
            return Some(TickerStatus::Succeeded);
        }
        self.failed.get(ticker).map(|reason| {
            if reason.is_no_data() {
                TickerStatus::NoData
            } else {
                TickerStatus::Errored
            }
        })
    }
}

/// Canonical ticker list: trimmed, upper-cased, blanks dropped, first
/// occurrence kept.
pub fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers {
        let t = t.as_ref().trim().to_uppercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

pub struct Pipeline {
    source: Box<dyn DataSource>,
    store: Option<Box<dyn SeriesStore>>,
    settings: IndicatorSettings,
}

impl Pipeline {
    pub fn new(source: Box<dyn DataSource>, settings: IndicatorSettings) -> Self {
        Self {
            source,
            store: None,
            settings,
        }
    }

    /// Persist every successful series into `store`.
    pub fn with_store(mut self, store: Box<dyn SeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn run<S: AsRef<str>>(
        &self,
        tickers: &[S],
        range: &TimeRangeSpec,
        selection: &IndicatorSelection,
    ) -> RunReport {
        let tickers = normalize_tickers(tickers);
        let mut report = RunReport::default();
        info!(
            source = self.source.name(),
            tickers = tickers.len(),
            %range,
            "starting run"
        );

        // Bad parameters fail every ticker the same way.
        let transforms = match self.settings.transforms(selection) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "invalid indicator settings");
                for ticker in tickers {
                    report.failed.insert(ticker, e.clone().into());
                }
                report.correlation_note = Some("no ticker succeeded".into());
                return report;
            }
        };

        let guard = self.store.as_deref().and_then(|store| {
            StoreGuard::acquire(store)
                .map_err(|e| warn!(error = %e, "store unavailable, skipping persistence"))
                .ok()
        });

        for ticker in tickers {
            match self.process(&ticker, range, &transforms, guard.as_ref()) {
                Ok(series) => {
                    info!(ticker = %ticker, rows = series.height(), "ticker processed");
                    report.succeeded.insert(ticker, series);
                }
                Err(reason) => {
                    if reason.is_no_data() {
                        info!(ticker = %ticker, %reason, "ticker produced no data");
                    } else {
                        warn!(ticker = %ticker, %reason, "ticker failed");
                    }
                    report.failed.insert(ticker, reason);
                }
            }
        }
        drop(guard);

        match correlate(&report.succeeded) {
            Ok(matrix) => report.correlation = Some(matrix),
            Err(e) => {
                debug!(reason = %e, "correlation not available");
                report.correlation_note = Some(e.to_string());
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            correlation = report.correlation.is_some(),
            "run complete"
        );
        report
    }

    fn process(
        &self,
        ticker: &str,
        range: &TimeRangeSpec,
        transforms: &[Box<dyn Indicator>],
        store: Option<&StoreGuard<'_>>,
    ) -> Result<CanonicalSeries, FailureReason> {
        let raw = self.source.fetch(ticker, range)?;
        debug!(ticker, rows = raw.height(), columns = raw.width(), "fetched");

        let mut series = Normalizer::normalize_checked(raw, ticker)?;
        if series.is_empty() {
            return Err(FailureReason::NoData);
        }

        for transform in transforms {
            series = transform.apply(series)?;
        }

        if let Some(guard) = store {
            guard
                .store()
                .store(ticker, &series)
                .map_err(|e| FailureReason::Store(e.to_string()))?;
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_are_trimmed_uppercased_and_deduplicated() {
        assert_eq!(
            normalize_tickers(&[" aapl", "MSFT", "", "Aapl ", "goog"]),
            vec!["AAPL", "MSFT", "GOOG"]
        );
    }

    #[test]
    fn no_data_and_errors_are_distinguished() {
        assert!(FailureReason::NoData.is_no_data());
        assert!(FailureReason::MissingClose.is_no_data());
        assert!(!FailureReason::Fetch("timeout".into()).is_no_data());
        assert!(!FailureReason::Store("disk full".into()).is_no_data());
    }

    #[test]
    fn shape_errors_map_to_reasons() {
        assert_eq!(FailureReason::from(ShapeError::NoRows), FailureReason::NoData);
        assert_eq!(
            FailureReason::from(ShapeError::MissingClose { available: vec![] }),
            FailureReason::MissingClose
        );
        assert!(matches!(
            FailureReason::from(ShapeError::Inconsistent),
            FailureReason::MalformedTable(_)
        ));
    }

    #[test]
    fn status_of_unrequested_ticker_is_none() {
        assert_eq!(RunReport::default().status("AAPL"), None);
    }
}
