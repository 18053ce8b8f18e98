//! Store telemetry.
//!
//! Lock-free counters updated by a [`TileStore`](crate::store::TileStore)
//! as it creates tiles and applies fetch results. Take a
//! [`StoreSnapshot`] for display or logging.
//!
//! ```text
//! TileStore ─────► StoreMetrics ─────► StoreSnapshot ─────► logs, overlays
//!                  (atomic counters)   (point-in-time copy)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for one tile store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    tiles_created: AtomicU64,
    fetches_issued: AtomicU64,
    fetches_completed: AtomicU64,
    fetches_failed: AtomicU64,
    stale_results: AtomicU64,
    clears: AtomicU64,
}

impl StoreMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tile_created(&self) {
        self.tiles_created.fetch_add(1, Ordering::Relaxed);
        self.fetches_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_completed(&self) {
        self.fetches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_result(&self) {
        self.stale_results.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cleared(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            tiles_created: self.tiles_created.load(Ordering::Relaxed),
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            fetches_completed: self.fetches_completed.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            stale_results: self.stale_results.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Tiles allocated since the store was created.
    pub tiles_created: u64,
    /// Fetches handed to the data source.
    pub fetches_issued: u64,
    /// Results applied as `Complete`.
    pub fetches_completed: u64,
    /// Results applied as `Error`.
    pub fetches_failed: u64,
    /// Results that arrived after a `clear()`.
    pub stale_results: u64,
    /// Number of `clear()` calls.
    pub clears: u64,
}

impl StoreSnapshot {
    /// Fetches issued but not yet accounted for.
    pub fn in_flight(&self) -> u64 {
        self.fetches_issued
            .saturating_sub(self.fetches_completed + self.fetches_failed + self.stale_results)
    }
}

impl fmt::Display for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tiles: {} created, fetches: {} issued / {} complete / {} failed / {} stale",
            self.tiles_created,
            self.fetches_issued,
            self.fetches_completed,
            self.fetches_failed,
            self.stale_results
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default() {
        let metrics = StoreMetrics::new();
        assert_eq!(metrics.snapshot(), StoreSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = StoreMetrics::new();
        metrics.tile_created();
        metrics.tile_created();
        metrics.tile_created();
        metrics.fetch_completed();
        metrics.fetch_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tiles_created, 3);
        assert_eq!(snapshot.fetches_issued, 3);
        assert_eq!(snapshot.in_flight(), 1);

        metrics.stale_result();
        assert_eq!(metrics.snapshot().in_flight(), 0);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = StoreSnapshot {
            tiles_created: 12,
            fetches_issued: 12,
            fetches_completed: 9,
            fetches_failed: 2,
            stale_results: 1,
            clears: 0,
        };
        let display = snapshot.to_string();
        assert!(display.contains("12 created"));
        assert!(display.contains("9 complete"));
        assert!(display.contains("2 failed"));
    }
}
