//! Upstream data sources

pub mod csv_source;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use csv_source::CsvSource;
pub use provider::{DataSource, FetchError, FetchSettings, Period, SourceKind, TimeRangeSpec};
pub use synthetic::SyntheticSource;
pub use yahoo::YahooSource;
