//! QuoteLab Core: market-data normalization, indicators and correlation.
//!
//! This crate turns inconsistently shaped daily price tables into one
//! canonical per-ticker series and derives analytics from it:
//! - Raw and canonical table types
//! - Schema normalizer (flat or two-level headers, any label casing)
//! - Indicator transforms (moving averages, RSI, volatility, Bollinger Bands)
//! - Cross-ticker correlation of daily returns
//! - Per-ticker pipeline with failure isolation
//! - Data sources (Yahoo Finance, CSV snapshots, synthetic) and Parquet storage

pub mod config;
pub mod correlation;
pub mod data;
pub mod indicators;
pub mod normalize;
pub mod pipeline;
pub mod store;
pub mod table;

pub use config::{ConfigError, Settings, StoreSettings};
pub use correlation::{correlate, CorrelationMatrix, InsufficientData};
pub use indicators::{Indicator, IndicatorError, IndicatorKind, IndicatorSelection, IndicatorSettings};
pub use normalize::{Normalizer, ShapeError};
pub use pipeline::{FailureReason, Pipeline, RunReport, TickerStatus};
pub use table::{CanonicalSeries, Cell, RawTable};
