//! Yahoo Finance data source.
//!
//! Fetches daily rows from Yahoo's v8 chart API with retries and exponential
//! backoff. Output is a flat `RawTable` with lowercase labels
//! (`open high low close volume adj close`); the normalizer owns casing.
//!
//! Yahoo has no official API and changes format without notice. The CSV
//! source is the fallback when it is unavailable.

use super::provider::{DataSource, FetchError, FetchSettings, TimeRangeSpec};
use crate::table::{FlatColumn, RawTable};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Upper bound on a single retry wait.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Wait before retry `attempt` (1-based): doubles from `base`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

pub struct YahooSource {
    client: reqwest::blocking::Client,
    settings: FetchSettings,
    base_delay: Duration,
}

impl YahooSource {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(ticker: &str, range: &TimeRangeSpec) -> String {
        let window = match range {
            TimeRangeSpec::Period(p) => format!("range={}", p.code()),
            TimeRangeSpec::Between { start, end } => {
                let start_ts = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
                let end_ts = end.and_hms_opt(23, 59, 59).map(|t| t.and_utc().timestamp());
                format!(
                    "period1={}&period2={}",
                    start_ts.unwrap_or_default(),
                    end_ts.unwrap_or_default()
                )
            }
        };
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{ticker}\
             ?{window}&interval=1d&includeAdjustedClose=true"
        )
    }

    /// Turn a chart response into a raw table. Unknown tickers → empty table.
    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<RawTable, FetchError> {
        let result = match (resp.chart.result, resp.chart.error) {
            (Some(result), _) => result,
            (None, Some(err)) if err.code == "Not Found" => {
                debug!(ticker, "symbol not found upstream");
                return Ok(RawTable::empty());
            }
            (None, Some(err)) => {
                return Err(FetchError::ResponseFormat(format!(
                    "{}: {}",
                    err.code, err.description
                )))
            }
            (None, None) => {
                return Err(FetchError::ResponseFormat(
                    "empty result with no error".into(),
                ))
            }
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(RawTable::empty());
        };
        let Some(timestamps) = data.timestamp else {
            return Ok(RawTable::empty());
        };
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormat("no quote data".into()))?;
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut index: Vec<NaiveDateTime> = Vec::with_capacity(timestamps.len());
        let mut rows: Vec<usize> = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            // Holidays come back as all-null rows.
            if [&quote.open, &quote.high, &quote.low, &quote.close, &quote.volume]
                .into_iter()
                .all(|v| at(v).is_none())
            {
                continue;
            }
            let stamp = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| FetchError::ResponseFormat(format!("invalid timestamp: {ts}")))?;
            index.push(stamp);
            rows.push(i);
        }

        let pick = |v: &Vec<Option<f64>>| -> Vec<Option<f64>> {
            rows.iter().map(|&i| v.get(i).copied().flatten()).collect()
        };
        let mut columns = vec![
            FlatColumn::new("open", pick(&quote.open)),
            FlatColumn::new("high", pick(&quote.high)),
            FlatColumn::new("low", pick(&quote.low)),
            FlatColumn::new("close", pick(&quote.close)),
            FlatColumn::new("volume", pick(&quote.volume)),
        ];
        if let Some(adj) = &adj_closes {
            columns.push(FlatColumn::new("adj close", pick(adj)));
        }

        Ok(RawTable::flat(index, columns))
    }

    fn fetch_with_retry(&self, ticker: &str, range: &TimeRangeSpec) -> Result<RawTable, FetchError> {
        let url = Self::chart_url(ticker, range);
        let mut last_error = None;

        for attempt in 0..=self.settings.retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                debug!(ticker, attempt, ?delay, "retrying fetch");
                std::thread::sleep(delay);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    last_error = Some(FetchError::Timeout(self.settings.timeout_secs));
                    continue;
                }
                Err(e) if e.is_connect() => {
                    last_error = Some(FetchError::Network(e.to_string()));
                    continue;
                }
                Err(e) => return Err(FetchError::Network(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                // Yahoo answers unknown symbols with 404 plus a chart error body.
                return match resp.json::<ChartResponse>() {
                    Ok(chart) => Self::parse_response(ticker, chart),
                    Err(_) => Ok(RawTable::empty()),
                };
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(ticker, retry_after, "rate limited by Yahoo");
                last_error = Some(FetchError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                last_error = Some(FetchError::Http {
                    status: status.as_u16(),
                    ticker: ticker.to_string(),
                });
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    ticker: ticker.to_string(),
                });
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                FetchError::ResponseFormat(format!("failed to parse response for {ticker}: {e}"))
            })?;
            return Self::parse_response(ticker, chart);
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network("max retries exceeded".into())))
    }
}

impl DataSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, ticker: &str, range: &TimeRangeSpec) -> Result<RawTable, FetchError> {
        self.fetch_with_retry(ticker, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::Period;
    use crate::table::RawColumns;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open": [187.15, null, 182.15],
                        "high": [188.44, null, 183.09],
                        "low": [183.89, null, 180.88],
                        "close": [185.64, null, 181.91],
                        "volume": [82488700, null, 71983600]
                    }],
                    "adjclose": [{ "adjclose": [184.94, null, 181.22] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_chart_into_flat_lowercase_table() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let table = YahooSource::parse_response("AAPL", resp).unwrap();

        // The all-null holiday row is skipped.
        assert_eq!(table.height(), 2);
        let RawColumns::Flat(cols) = &table.columns else {
            panic!("expected flat columns");
        };
        let labels: Vec<_> = cols.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["open", "high", "low", "close", "volume", "adj close"]);
        assert_eq!(cols[3].values, vec![Some(185.64), Some(181.91)]);
    }

    #[test]
    fn not_found_is_an_empty_table() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(YahooSource::parse_response("ZZZZ", resp).unwrap().is_empty());
    }

    #[test]
    fn other_chart_errors_are_format_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            YahooSource::parse_response("AAPL", resp),
            Err(FetchError::ResponseFormat(_))
        ));
    }

    #[test]
    fn url_uses_range_for_periods() {
        let url = YahooSource::chart_url("AAPL", &TimeRangeSpec::Period(Period::OneYear));
        assert!(url.contains("/chart/AAPL?range=1y&interval=1d"));

        let between: TimeRangeSpec = "2024-01-02..2024-01-31".parse().unwrap();
        let url = YahooSource::chart_url("AAPL", &between);
        assert!(url.contains("period1=1704153600"));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 7), MAX_BACKOFF);
        // Large attempt counts saturate instead of overflowing.
        assert_eq!(backoff_delay(base, 33), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }
}
