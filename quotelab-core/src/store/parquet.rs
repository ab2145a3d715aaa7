//! Parquet-backed store with Hive-style partitioning.
//!
//! Layout: `{root}/ticker={TICKER}/series.parquet` plus a `meta.json`
//! sidecar (date range, row count, BLAKE3 content hash).
//!
//! - Writes are atomic: write to `.tmp`, rename into place
//! - `store` merges with what is already on disk, newer rows win per date
//! - Unreadable files are quarantined (`series.parquet.quarantined`) and
//!   replaced by the next write; a failed quarantine is logged and noted in
//!   the error

use super::{SeriesStore, StoreError};
use crate::table::{CanonicalSeries, SeriesColumn};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DATE_COLUMN: &str = "date";
const SERIES_FILE: &str = "series.parquet";
const META_FILE: &str = "meta.json";

/// Metadata sidecar for a stored ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMeta {
    pub ticker: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub data_hash: String,
    pub stored_at: NaiveDateTime,
}

pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/ticker={TICKER}/`
    fn ticker_dir(&self, ticker: &str) -> PathBuf {
        self.root.join(format!("ticker={ticker}"))
    }

    fn series_path(&self, ticker: &str) -> PathBuf {
        self.ticker_dir(ticker).join(SERIES_FILE)
    }

    fn meta_path(&self, ticker: &str) -> PathBuf {
        self.ticker_dir(ticker).join(META_FILE)
    }

    /// Tickers with a stored series, sorted.
    pub fn tickers(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(ticker) = name.to_str().and_then(|n| n.strip_prefix("ticker=")) else {
                continue;
            };
            if entry.path().join(SERIES_FILE).exists() {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Sidecar metadata for `ticker`, if stored.
    pub fn meta(&self, ticker: &str) -> Result<StoredMeta, StoreError> {
        let path = self.meta_path(ticker);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    ticker: ticker.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    fn write_meta(&self, ticker: &str, series: &CanonicalSeries) -> Result<(), StoreError> {
        let hash_input =
            serde_json::to_vec(series).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let meta = StoredMeta {
            ticker: ticker.to_string(),
            first_date: series.index().first().copied(),
            last_date: series.index().last().copied(),
            row_count: series.height(),
            columns: series.column_names().into_iter().map(String::from).collect(),
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            stored_at: chrono::Local::now().naive_local(),
        };
        let json =
            serde_json::to_string_pretty(&meta).map_err(|e| StoreError::Serialize(e.to_string()))?;
        write_atomic(&self.meta_path(ticker), |path| Ok(fs::write(path, json)?))
    }
}

impl SeriesStore for ParquetStore {
    fn store(&self, ticker: &str, series: &CanonicalSeries) -> Result<(), StoreError> {
        let merged = match self.load(ticker) {
            Ok(existing) => existing.upsert(series),
            Err(StoreError::NotFound { .. }) => series.clone(),
            Err(StoreError::Corrupt { path, reason }) => {
                warn!(ticker, path = %path.display(), %reason, "replacing corrupt stored series");
                series.clone()
            }
            Err(e) => return Err(e),
        };

        fs::create_dir_all(self.ticker_dir(ticker))?;
        let mut df = series_to_dataframe(&merged)?;
        write_atomic(&self.series_path(ticker), |path| {
            let file = fs::File::create(path)?;
            ParquetWriter::new(file)
                .finish(&mut df)
                .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
            Ok(())
        })?;
        self.write_meta(ticker, &merged)?;

        debug!(ticker, rows = merged.height(), added = series.height(), "stored series");
        Ok(())
    }

    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError> {
        let path = self.series_path(ticker);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    ticker: ticker.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let loaded = ParquetReader::new(file)
            .finish()
            .map_err(|e| e.to_string())
            .and_then(|df| dataframe_to_series(&df));
        match loaded {
            Ok(series) => Ok(series),
            Err(reason) => {
                let quarantine = path.with_extension("parquet.quarantined");
                let reason = match fs::rename(&path, &quarantine) {
                    Ok(()) => {
                        warn!(
                            ticker,
                            path = %quarantine.display(),
                            %reason,
                            "quarantined corrupt store file"
                        );
                        reason
                    }
                    Err(e) => {
                        warn!(
                            ticker,
                            path = %path.display(),
                            %reason,
                            error = %e,
                            "failed to quarantine corrupt store file"
                        );
                        format!("{reason} (quarantine failed: {e})")
                    }
                };
                Err(StoreError::Corrupt { path, reason })
            }
        }
    }

    fn acquire(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        info!(root = %self.root.display(), "opened parquet store");
        Ok(())
    }

    fn release(&self) {
        debug!(root = %self.root.display(), "closed parquet store");
    }
}

/// Run `write` against `{path}.tmp`, then rename over `path`.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io(e)
    })
}

// ── Parquet conversion ──────────────────────────────────────────────

/// 1970-01-01, the zero point of the Date dtype.
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn series_to_dataframe(series: &CanonicalSeries) -> Result<DataFrame, StoreError> {
    let days: Vec<i32> = series
        .index()
        .iter()
        .map(|d| (*d - epoch()).num_days() as i32)
        .collect();

    // Canonical names start uppercase, so none can collide with `date`.
    let mut columns = Vec::with_capacity(series.width() + 1);
    columns.push(
        Column::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
    );
    for col in series.columns() {
        columns.push(Column::new(col.name.as_str().into(), col.values.clone()));
    }

    DataFrame::new(columns).map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_series(df: &DataFrame) -> Result<CanonicalSeries, String> {
    let dates = df
        .column(DATE_COLUMN)
        .and_then(|c| c.date().cloned())
        .map_err(|e| format!("date column: {e}"))?;
    let index = (0..df.height())
        .map(|i| {
            dates
                .get(i)
                .map(|days| epoch() + chrono::Duration::days(i64::from(days)))
                .ok_or_else(|| format!("null date at row {i}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = Vec::with_capacity(df.width().saturating_sub(1));
    for col in df.get_columns() {
        let name = col.name().as_str();
        if name == DATE_COLUMN {
            continue;
        }
        let values: Vec<Option<f64>> = col
            .f64()
            .map_err(|e| format!("column '{name}': {e}"))?
            .into_iter()
            .collect();
        columns.push(SeriesColumn {
            name: name.to_string(),
            values,
        });
    }

    CanonicalSeries::from_parts(index, columns)
        .ok_or_else(|| "rows out of order or duplicate column names".to_string())
}
