//! In-process store with the same upsert semantics as the Parquet store.

use super::{SeriesStore, StoreError};
use crate::table::CanonicalSeries;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryStore {
    series: Mutex<BTreeMap<String, CanonicalSeries>>,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CanonicalSeries>> {
        // A panicking writer cannot leave a half-written entry behind.
        self.series.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored tickers, sorted.
    pub fn tickers(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Times `acquire` has been called.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Acquisitions not yet released.
    pub fn open_handles(&self) -> usize {
        self.acquisitions()
            .saturating_sub(self.releases.load(Ordering::SeqCst))
    }
}

impl SeriesStore for MemoryStore {
    fn store(&self, ticker: &str, series: &CanonicalSeries) -> Result<(), StoreError> {
        let mut map = self.lock();
        let merged = match map.get(ticker) {
            Some(existing) => existing.upsert(series),
            None => series.clone(),
        };
        map.insert(ticker.to_string(), merged);
        Ok(())
    }

    fn load(&self, ticker: &str) -> Result<CanonicalSeries, StoreError> {
        self.lock()
            .get(ticker)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                ticker: ticker.to_string(),
            })
    }

    fn acquire(&self) -> Result<(), StoreError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn later_store_overwrites_same_dates() {
        let store = MemoryStore::new();
        let first = CanonicalSeries::from_closes(vec![day(2), day(3)], vec![1.0, 2.0]).unwrap();
        let second = CanonicalSeries::from_closes(vec![day(3), day(4)], vec![20.0, 30.0]).unwrap();
        store.store("AAPL", &first).unwrap();
        store.store("AAPL", &second).unwrap();

        let loaded = store.load("AAPL").unwrap();
        assert_eq!(loaded.index(), &[day(2), day(3), day(4)]);
        assert_eq!(loaded.close().unwrap(), &[Some(1.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn unknown_ticker_is_not_found() {
        assert!(matches!(
            MemoryStore::new().load("NOPE"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
