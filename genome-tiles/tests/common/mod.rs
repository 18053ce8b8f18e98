//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use genome_tiles::source::SourceError;
use genome_tiles::{Contig, DataSource, FetchError, TileRequest, TileStore};

/// Contig length used throughout.
pub const CONTIG_LENGTH: u64 = 10_000;

/// Payload carrying the tile it was produced for.
pub type Payload = (u32, u64);

/// Data source whose fetches block per level until the test opens the gate.
pub struct GatedSource {
    contig: Contig,
    gates: HashMap<u32, Arc<Semaphore>>,
    missing: HashSet<u32>,
    missing_tiles: HashSet<(u32, u64)>,
    panicking: HashSet<u32>,
    fetches: AtomicU64,
}

impl GatedSource {
    /// Closed gates for every level in `levels`.
    pub fn new(levels: impl IntoIterator<Item = u32>) -> Self {
        Self {
            contig: Contig::new("chr1", CONTIG_LENGTH),
            gates: levels
                .into_iter()
                .map(|level| (level, Arc::new(Semaphore::new(0))))
                .collect(),
            missing: HashSet::new(),
            missing_tiles: HashSet::new(),
            panicking: HashSet::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Report every tile at `level` as not found.
    pub fn with_missing_level(mut self, level: u32) -> Self {
        self.missing.insert(level);
        self
    }

    /// Report the single tile at `(level, index)` as not found.
    pub fn with_missing_tile(mut self, level: u32, index: u64) -> Self {
        self.missing_tiles.insert((level, index));
        self
    }

    /// Panic inside every fetch at `level`.
    pub fn with_panicking_level(mut self, level: u32) -> Self {
        self.panicking.insert(level);
        self
    }

    /// Let every pending and future fetch at `level` through.
    pub fn open(&self, level: u32) {
        if let Some(gate) = self.gates.get(&level) {
            gate.add_permits(1 << 20);
        }
    }

    /// Make every pending and future fetch at `level` fail.
    pub fn break_level(&self, level: u32) {
        if let Some(gate) = self.gates.get(&level) {
            gate.close();
        }
    }

    /// Fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataSource for GatedSource {
    type Payload = Payload;

    fn id(&self) -> &str {
        "gated"
    }

    fn contigs(&self) -> BoxFuture<'_, Result<Vec<Contig>, SourceError>> {
        Box::pin(async move { Ok(vec![self.contig.clone()]) })
    }

    fn fetch<'a>(&'a self, request: &'a TileRequest) -> BoxFuture<'a, Result<Payload, FetchError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.panicking.contains(&request.level()) {
                panic!("gated source cannot serve level {}", request.level());
            }
            if self.missing.contains(&request.level())
                || self.missing_tiles.contains(&(request.level(), request.index()))
            {
                return Err(request.not_found());
            }
            if let Some(gate) = self.gates.get(&request.level()) {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| FetchError::Transient("gate closed".to_string()))?;
            }
            Ok((request.level(), request.index()))
        })
    }
}

/// Apply fetch results until `done` holds, failing after five seconds.
pub async fn wait_until<F>(store: &TileStore<Payload>, mut done: F)
where
    F: FnMut(&TileStore<Payload>) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(store) {
            if !store.wait_for_completion().await {
                break;
            }
        }
    })
    .await
    .expect("store did not reach the expected state");
    assert!(done(store), "no fetch left in flight to reach the expected state");
}

/// Whether every requested tile at `level` has reached a terminal state.
pub fn level_settled(store: &TileStore<Payload>, level: u32) -> bool {
    let Some(ranges) = store.requested_ranges(level) else {
        return true;
    };
    let settled = ranges.iter().all(|(start, end)| {
        (start..end).all(|index| {
            store
                .peek_tile(level, index)
                .map_or(true, |tile| tile.state().is_terminal())
        })
    });
    settled
}
