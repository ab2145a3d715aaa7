//! Persistence of canonical series.
//!
//! A store keeps one series per ticker keyed by (ticker, date): storing rows
//! for dates that already exist overwrites them, new dates are added.
//! Callers bracket a run with `acquire`/`release`, usually through
//! [`StoreGuard`].

pub mod memory;
pub mod parquet;

pub use memory::MemoryStore;
pub use parquet::{ParquetStore, StoredMeta};

use crate::table::CanonicalSeries;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored series for {ticker}")]
    NotFound { ticker: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt store file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Persistent storage for canonical series.
pub trait SeriesStore: Send + Sync {
    /// Upsert `series` under `ticker`.
    fn store(&self, ticker: &str, series: &CanonicalSeries) -> Result<(), StoreError>;

    /// Everything stored for `ticker`, ascending by date.
    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError>;

    /// Open the store for a batch of writes.
    fn acquire(&self) -> Result<(), StoreError>;

    /// Close the store after a batch. Must be safe to call after a failed run.
    fn release(&self);
}

/// Holds a store acquired for its lifetime and releases it on drop, on every
/// exit path.
pub struct StoreGuard<'a> {
    store: &'a dyn SeriesStore,
}

impl<'a> StoreGuard<'a> {
    pub fn acquire(store: &'a dyn SeriesStore) -> Result<Self, StoreError> {
        store.acquire()?;
        debug!("store acquired");
        Ok(Self { store })
    }

    pub fn store(&self) -> &'a dyn SeriesStore {
        self.store
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        self.store.release();
        debug!("store released");
    }
}
