//! Tile store: all tiles of one data source for one contig.
//!
//! The store maps `(level, index)` to [`Tile`]s, issues exactly one fetch per
//! tile, and remembers which tile indices were requested at each level so
//! the compositor can tell which fallback levels exist.
//!
//! # Threading
//!
//! The store lives on the frame thread. Fetches are spawned onto a Tokio
//! runtime and send their results back over a channel; results are applied
//! only by [`TileStore::pump`] (once per frame) or
//! [`TileStore::wait_for_completion`], so tiles and bookkeeping are never
//! mutated from two places at once.
//!
//! # Example
//!
//! ```ignore
//! let store = TileStore::open(source, "chr1", TileStoreConfig::default(), handle).await?;
//!
//! // once per frame
//! store.pump();
//! store.for_each_tile(x0, x1, density, true, |tile| {
//!     if tile.is_complete() {
//!         draw(tile);
//!     }
//! })?;
//! ```

pub mod error;
pub mod lod;
pub mod ranges;
pub mod registry;

pub use error::StoreError;
pub use lod::LodLadder;
pub use ranges::IndexRanges;
pub use registry::{StoreKey, StoreRegistry};

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::TileStoreConfig;
use crate::contig::Contig;
use crate::source::{DataSource, TileRequest};
use crate::telemetry::StoreMetrics;
use crate::tile::{FetchError, Tile, TileKey};

/// Covering set of tiles for an interval at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// Level chosen for the sampling density.
    pub level: u32,
    /// Tile span at that level.
    pub span: u64,
    /// First tile index.
    pub first: u64,
    /// One past the last tile index.
    pub end: u64,
}

impl ResolvedRange {
    /// Tile indices in ascending genomic order.
    pub fn indices(&self) -> Range<u64> {
        self.first..self.end
    }

    /// Tile keys in ascending genomic order.
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.indices().map(move |index| TileKey::new(self.level, index))
    }

    /// Number of tiles.
    pub fn len(&self) -> u64 {
        self.end - self.first
    }

    /// Returns true if no tile is needed.
    pub fn is_empty(&self) -> bool {
        self.end == self.first
    }
}

/// Result sent back by a spawned fetch.
struct Completion<P> {
    fetch_id: u64,
    result: Result<P, FetchError>,
}

/// Bookkeeping for a fetch that has not reported back.
struct InFlight<P> {
    generation: u64,
    key: TileKey,
    tile: Weak<Tile<P>>,
}

/// Owns every tile of one data source for one contig.
pub struct TileStore<P: Send + Sync + 'static> {
    source: Arc<dyn DataSource<Payload = P>>,
    contig: Contig,
    ladder: LodLadder,
    runtime: Handle,
    tiles: RefCell<HashMap<TileKey, Rc<Tile<P>>>>,
    requested: RefCell<BTreeMap<u32, IndexRanges>>,
    /// Per level, how many requested tiles the source reported as not found.
    not_found: RefCell<BTreeMap<u32, u64>>,
    in_flight: RefCell<HashMap<u64, InFlight<P>>>,
    generation: Cell<u64>,
    next_fetch_id: Cell<u64>,
    completions_tx: mpsc::UnboundedSender<Completion<P>>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<Completion<P>>>,
    metrics: Arc<StoreMetrics>,
}

impl<P: Send + Sync + 'static> TileStore<P> {
    /// Create a store for a known contig.
    ///
    /// # Arguments
    ///
    /// * `source` - Data source that fetches tile payloads
    /// * `contig` - Contig this store covers
    /// * `config` - LOD ladder and related settings
    /// * `runtime` - Runtime that fetches are spawned onto
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidConfig` if the LOD ladder is unusable.
    pub fn new(
        source: Arc<dyn DataSource<Payload = P>>,
        contig: Contig,
        config: TileStoreConfig,
        runtime: Handle,
    ) -> Result<Self, StoreError> {
        config.ladder.validate()?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            source,
            contig,
            ladder: config.ladder,
            runtime,
            tiles: RefCell::new(HashMap::new()),
            requested: RefCell::new(BTreeMap::new()),
            not_found: RefCell::new(BTreeMap::new()),
            in_flight: RefCell::new(HashMap::new()),
            generation: Cell::new(0),
            next_fetch_id: Cell::new(0),
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            metrics: Arc::new(StoreMetrics::new()),
        })
    }

    /// Look up `contig_id` in the source and create a store for it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ContigNotFound` if the source does not carry the
    /// contig, or `StoreError::Source` if the contig list cannot be read.
    pub async fn open(
        source: Arc<dyn DataSource<Payload = P>>,
        contig_id: &str,
        config: TileStoreConfig,
        runtime: Handle,
    ) -> Result<Self, StoreError> {
        let contigs = source.contigs().await?;
        let contig = contigs
            .into_iter()
            .find(|c| c.id() == contig_id)
            .ok_or_else(|| StoreError::ContigNotFound(contig_id.to_string()))?;

        info!(
            source = source.id(),
            contig = contig.id(),
            length = contig.length(),
            "Opened tile store"
        );
        Self::new(source, contig, config, runtime)
    }

    /// Contig covered by this store.
    pub fn contig(&self) -> &Contig {
        &self.contig
    }

    /// LOD ladder used to address tiles.
    pub fn ladder(&self) -> &LodLadder {
        &self.ladder
    }

    /// Shared telemetry counters.
    pub fn metrics(&self) -> Arc<StoreMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Number of tiles currently owned.
    pub fn tile_count(&self) -> usize {
        self.tiles.borrow().len()
    }

    /// Number of fetches that have not reported back.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Requested index ranges at `level`, if any.
    pub fn requested_ranges(&self, level: u32) -> Option<IndexRanges> {
        self.requested.borrow().get(&level).cloned()
    }

    /// Existing tile at `(level, index)`, without creating one.
    pub fn peek_tile(&self, level: u32, index: u64) -> Option<Rc<Tile<P>>> {
        self.tiles.borrow().get(&TileKey::new(level, index)).cloned()
    }

    /// Compute the level and minimal covering tile set for `[x0, x1)`.
    ///
    /// Pure with respect to store state: nothing is created or recorded.
    /// Indices past the end of the contig are left out.
    ///
    /// # Errors
    ///
    /// Rejects non-finite, reversed, or negative ranges and non-positive
    /// densities.
    pub fn resolve_range(
        &self,
        x0: f64,
        x1: f64,
        sampling_density: f64,
    ) -> Result<ResolvedRange, StoreError> {
        validate_density(sampling_density)?;
        validate_range(x0, x1)?;
        if x0 < 0.0 {
            return Err(invalid_range(x0, x1, "range starts before position 0"));
        }

        let level = self.ladder.clamped_level(sampling_density);
        let span = self.span_at(level)?;
        let tile_count = self.contig.tile_count(span);

        let first = ((x0 / span as f64).floor() as u64).min(tile_count);
        let end = if x1 > x0 {
            ((x1 / span as f64).ceil() as u64).min(tile_count)
        } else {
            first
        };

        Ok(ResolvedRange {
            level,
            span,
            first,
            end: end.max(first),
        })
    }

    /// Return the tile at `(level, index)`, creating it and issuing its fetch
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LevelUnavailable` for levels outside the ladder
    /// and `StoreError::IndexOutOfBounds` for indices past the contig end.
    pub fn get_or_create_tile(&self, level: u32, index: u64) -> Result<Rc<Tile<P>>, StoreError> {
        if !self.ladder.contains(level) {
            return Err(StoreError::LevelUnavailable(level));
        }
        let span = self.span_at(level)?;
        let max = self.contig.tile_count(span);
        if index >= max {
            return Err(StoreError::IndexOutOfBounds { level, index, max });
        }

        let key = TileKey::new(level, index);
        if let Some(tile) = self.tiles.borrow().get(&key) {
            return Ok(Rc::clone(tile));
        }

        let tile = Rc::new(Tile::new(self.contig.id(), key, span));
        self.tiles.borrow_mut().insert(key, Rc::clone(&tile));
        self.requested
            .borrow_mut()
            .entry(level)
            .or_default()
            .insert(index);
        self.issue_fetch(&tile);

        Ok(tile)
    }

    /// Visit the covering tiles for `[x0, x1)` in ascending genomic order,
    /// creating them as needed.
    ///
    /// With `clamp_to_data_bounds` the interval is clipped to the contig
    /// first. Without it, ranges that start before 0 or at/after the contig
    /// end are rejected, and tiles past the end are skipped.
    ///
    /// Returns the number of tiles visited.
    pub fn for_each_tile<F>(
        &self,
        x0: f64,
        x1: f64,
        sampling_density: f64,
        clamp_to_data_bounds: bool,
        mut visit: F,
    ) -> Result<usize, StoreError>
    where
        F: FnMut(&Rc<Tile<P>>),
    {
        validate_density(sampling_density)?;
        validate_range(x0, x1)?;

        let length = self.contig.length() as f64;
        let (start, end) = if clamp_to_data_bounds {
            let start = x0.max(0.0);
            let end = x1.min(length);
            if end <= start {
                return Ok(0);
            }
            (start, end)
        } else {
            if x0 < 0.0 {
                return Err(invalid_range(x0, x1, "range starts before position 0"));
            }
            if x0 >= length {
                return Err(invalid_range(x0, x1, "range starts past the contig end"));
            }
            (x0, x1)
        };

        let resolved = self.resolve_range(start, end, sampling_density)?;
        let mut visited = 0;
        for index in resolved.indices() {
            let tile = self.get_or_create_tile(resolved.level, index)?;
            visit(&tile);
            visited += 1;
        }
        Ok(visited)
    }

    /// Return the tile covering position `x` at the level implied by
    /// `sampling_density`, creating it if needed.
    ///
    /// With `exact` the density's ideal level must exist in the ladder.
    /// Without it the level is clamped to the ladder like
    /// [`resolve_range`](Self::resolve_range), so the returned tile may sit
    /// at a coarser level and may still be loading.
    pub fn get_tile(
        &self,
        x: f64,
        sampling_density: f64,
        exact: bool,
    ) -> Result<Rc<Tile<P>>, StoreError> {
        validate_density(sampling_density)?;
        if !x.is_finite() || x < 0.0 {
            return Err(invalid_range(x, x, "position must be finite and non-negative"));
        }

        let level = if exact {
            let ideal = self.ladder.ideal_level(sampling_density);
            if !self.ladder.contains(ideal) {
                return Err(StoreError::LevelUnavailable(ideal));
            }
            ideal
        } else {
            self.ladder.clamped_level(sampling_density)
        };
        let span = self.span_at(level)?;
        let index = (x / span as f64).floor() as u64;

        self.get_or_create_tile(level, index)
    }

    /// Level the ladder maps `sampling_density` to, if it carries one.
    pub fn level_for_density(&self, sampling_density: f64) -> Option<u32> {
        if validate_density(sampling_density).is_err() {
            return None;
        }
        self.ladder.implied_level(sampling_density)
    }

    /// Whether tiles were requested at the level implied by `sampling_density`.
    ///
    /// False for densities coarser than the ladder, for levels never
    /// requested since the last [`clear`](Self::clear), and for levels where
    /// the source reported every requested tile as not found. A single
    /// missing tile does not take its level out of range.
    pub fn is_within_initialized_lod_range(&self, sampling_density: f64) -> bool {
        let Some(level) = self.level_for_density(sampling_density) else {
            return false;
        };
        let requested = self
            .requested
            .borrow()
            .get(&level)
            .map_or(0, IndexRanges::count);
        let missing = self.not_found.borrow().get(&level).copied().unwrap_or(0);
        requested > missing
    }

    /// Drop all tiles and bookkeeping.
    ///
    /// Fetches still in flight are not cancelled. Their results no longer
    /// affect the store, but a tile a caller still holds may still
    /// transition.
    pub fn clear(&self) {
        let dropped = self.tiles.borrow().len();
        self.tiles.borrow_mut().clear();
        self.requested.borrow_mut().clear();
        self.not_found.borrow_mut().clear();
        self.generation.set(self.generation.get() + 1);
        self.metrics.cleared();
        info!(
            contig = self.contig.id(),
            tiles = dropped,
            in_flight = self.in_flight_count(),
            "Cleared tile store"
        );
    }

    /// Apply every fetch result that has arrived. Never blocks.
    ///
    /// Returns the number of results applied.
    pub fn pump(&self) -> usize {
        let ready: Vec<Completion<P>> = match self.completions_rx.try_lock() {
            Ok(mut rx) => std::iter::from_fn(|| rx.try_recv().ok()).collect(),
            Err(_) => return 0,
        };
        let count = ready.len();
        for completion in ready {
            self.apply(completion);
        }
        count
    }

    /// Wait for the next fetch result and apply it.
    ///
    /// Returns false immediately if no fetch is in flight.
    pub async fn wait_for_completion(&self) -> bool {
        if self.in_flight.borrow().is_empty() {
            return false;
        }
        let completion = {
            let mut rx = self.completions_rx.lock().await;
            rx.recv().await
        };
        match completion {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    fn span_at(&self, level: u32) -> Result<u64, StoreError> {
        self.ladder.tile_span(level).ok_or_else(|| {
            StoreError::InvalidConfig(format!("tile span overflows at level {}", level))
        })
    }

    fn issue_fetch(&self, tile: &Rc<Tile<P>>) {
        let fetch_id = self.next_fetch_id.get();
        self.next_fetch_id.set(fetch_id + 1);
        self.in_flight.borrow_mut().insert(
            fetch_id,
            InFlight {
                generation: self.generation.get(),
                key: tile.key(),
                tile: Rc::downgrade(tile),
            },
        );
        self.metrics.tile_created();

        let request = TileRequest {
            contig: self.contig.id().to_string(),
            key: tile.key(),
            x: tile.x(),
            span: tile.span(),
        };
        debug!(
            contig = %request.contig,
            level = request.key.level,
            index = request.key.index,
            "Issuing tile fetch"
        );

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        self.runtime.spawn(async move {
            let result = match AssertUnwindSafe(source.fetch(&request)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        contig = %request.contig,
                        level = request.key.level,
                        index = request.key.index,
                        "Tile fetch panicked"
                    );
                    Err(FetchError::Transient("fetch panicked".to_string()))
                }
            };
            // receiver only goes away with the store
            let _ = tx.send(Completion { fetch_id, result });
        });
    }

    fn apply(&self, completion: Completion<P>) {
        let entry = self.in_flight.borrow_mut().remove(&completion.fetch_id);
        let Some(entry) = entry else {
            return;
        };
        let tile = entry.tile.upgrade();

        if entry.generation != self.generation.get() {
            self.metrics.stale_result();
            debug!(
                level = entry.key.level,
                index = entry.key.index,
                "Discarding fetch result from before clear"
            );
            if let Some(tile) = tile {
                match completion.result {
                    Ok(payload) => tile.complete(Arc::new(payload)),
                    Err(error) => tile.fail(error),
                };
            }
            return;
        }

        let Some(tile) = tile else {
            return;
        };
        match completion.result {
            Ok(payload) => {
                if tile.complete(Arc::new(payload)) {
                    self.metrics.fetch_completed();
                }
            }
            Err(error) => {
                warn!(
                    contig = self.contig.id(),
                    level = entry.key.level,
                    index = entry.key.index,
                    error = %error,
                    "Tile fetch failed"
                );
                if error.is_not_found() {
                    *self.not_found.borrow_mut().entry(entry.key.level).or_insert(0) += 1;
                }
                if tile.fail(error) {
                    self.metrics.fetch_failed();
                }
            }
        }
    }
}

impl<P: Send + Sync + 'static> fmt::Debug for TileStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileStore")
            .field("source", &self.source.id())
            .field("contig", &self.contig)
            .field("tiles", &self.tile_count())
            .field("in_flight", &self.in_flight_count())
            .field("generation", &self.generation.get())
            .finish()
    }
}

fn validate_density(sampling_density: f64) -> Result<(), StoreError> {
    if sampling_density.is_finite() && sampling_density > 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidDensity(sampling_density))
    }
}

fn validate_range(x0: f64, x1: f64) -> Result<(), StoreError> {
    if !x0.is_finite() || !x1.is_finite() {
        return Err(invalid_range(x0, x1, "range bounds must be finite"));
    }
    if x1 < x0 {
        return Err(invalid_range(x0, x1, "range ends before it starts"));
    }
    Ok(())
}

fn invalid_range(x0: f64, x1: f64, reason: &str) -> StoreError {
    StoreError::InvalidRange {
        x0,
        x1,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::tile::TileState;
    use std::time::Duration;

    fn make_source() -> Arc<InMemorySource<Vec<u8>>> {
        let source = InMemorySource::new("mem", vec![Contig::new("chr1", 10_000)]);
        for level in 0..=3u32 {
            let span = 1000u64 << level;
            for index in 0..10_000u64.div_ceil(span) {
                source.insert("chr1", TileKey::new(level, index), vec![level as u8]);
            }
        }
        Arc::new(source)
    }

    fn make_store(source: Arc<InMemorySource<Vec<u8>>>) -> TileStore<Vec<u8>> {
        let config = TileStoreConfig::new(LodLadder::new(1000, 0..=3));
        TileStore::new(
            source,
            Contig::new("chr1", 10_000),
            config,
            Handle::current(),
        )
        .unwrap()
    }

    async fn settle(store: &TileStore<Vec<u8>>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.wait_for_completion().await {}
        })
        .await
        .expect("fetches should settle");
    }

    #[tokio::test]
    async fn test_resolve_range_picks_level_and_indices() {
        let store = make_store(make_source());

        let resolved = store.resolve_range(1500.0, 4500.0, 1.0).unwrap();
        assert_eq!(resolved.level, 0);
        assert_eq!(resolved.span, 1000);
        assert_eq!(resolved.indices(), 1..5);

        let resolved = store.resolve_range(1500.0, 4500.0, 4.5).unwrap();
        assert_eq!(resolved.level, 2);
        assert_eq!(resolved.indices(), 0..2);
        assert_eq!(store.tile_count(), 0, "resolve_range must not create tiles");
    }

    #[tokio::test]
    async fn test_resolve_range_clamps_to_coarsest_level() {
        let store = make_store(make_source());
        let resolved = store.resolve_range(0.0, 10_000.0, 1e6).unwrap();
        assert_eq!(resolved.level, 3);
        assert_eq!(resolved.indices(), 0..2);
    }

    #[tokio::test]
    async fn test_resolve_range_skips_tiles_past_contig_end() {
        let store = make_store(make_source());
        let resolved = store.resolve_range(9500.0, 20_000.0, 1.0).unwrap();
        assert_eq!(resolved.indices(), 9..10);
    }

    #[tokio::test]
    async fn test_resolve_range_empty_interval() {
        let store = make_store(make_source());
        let resolved = store.resolve_range(2000.0, 2000.0, 1.0).unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_range_rejects_invalid_input() {
        let store = make_store(make_source());
        assert!(matches!(
            store.resolve_range(10.0, 5.0, 1.0),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.resolve_range(-10.0, 5.0, 1.0),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.resolve_range(0.0, f64::INFINITY, 1.0),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.resolve_range(0.0, 5.0, 0.0),
            Err(StoreError::InvalidDensity(_))
        ));
    }

    #[tokio::test]
    async fn test_get_or_create_tile_issues_one_fetch() {
        let source = make_source();
        let store = make_store(Arc::clone(&source));

        let a = store.get_or_create_tile(1, 2).unwrap();
        let b = store.get_or_create_tile(1, 2).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.state(), TileState::Loading);
        assert_eq!(store.metrics().snapshot().fetches_issued, 1);

        settle(&store).await;
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(a.state(), TileState::Complete);
        assert_eq!(a.payload().map(|p| p[0]), Some(1));

        let c = store.get_or_create_tile(1, 2).unwrap();
        assert!(Rc::ptr_eq(&a, &c));
        settle(&store).await;
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_tile_rejects_bad_addresses() {
        let store = make_store(make_source());
        assert!(matches!(
            store.get_or_create_tile(7, 0),
            Err(StoreError::LevelUnavailable(7))
        ));
        assert!(matches!(
            store.get_or_create_tile(0, 10),
            Err(StoreError::IndexOutOfBounds { max: 10, .. })
        ));
        assert_eq!(store.tile_count(), 0);
    }

    #[tokio::test]
    async fn test_for_each_tile_visits_in_order() {
        let store = make_store(make_source());
        let mut seen = Vec::new();
        let visited = store
            .for_each_tile(2500.0, 6200.0, 1.0, true, |tile| seen.push(tile.x()))
            .unwrap();
        assert_eq!(visited, 5);
        assert_eq!(seen, vec![2000, 3000, 4000, 5000, 6000]);
    }

    #[tokio::test]
    async fn test_for_each_tile_overlap_does_not_refetch() {
        let source = make_source();
        let store = make_store(Arc::clone(&source));

        store.for_each_tile(0.0, 4000.0, 1.0, true, |_| {}).unwrap();
        store.for_each_tile(2000.0, 6000.0, 1.0, true, |_| {}).unwrap();
        assert_eq!(store.tile_count(), 6);
        assert_eq!(store.metrics().snapshot().fetches_issued, 6);

        settle(&store).await;
        assert_eq!(source.fetch_count(), 6);
        assert_eq!(
            store.requested_ranges(0).unwrap().iter().collect::<Vec<_>>(),
            vec![(0, 6)]
        );
    }

    #[tokio::test]
    async fn test_for_each_tile_clamps_when_asked() {
        let store = make_store(make_source());
        let mut seen = Vec::new();
        store
            .for_each_tile(-5000.0, 1500.0, 1.0, true, |tile| seen.push(tile.index()))
            .unwrap();
        assert_eq!(seen, vec![0, 1]);

        let visited = store
            .for_each_tile(20_000.0, 30_000.0, 1.0, true, |_| {})
            .unwrap();
        assert_eq!(visited, 0);
    }

    #[tokio::test]
    async fn test_for_each_tile_unclamped_rejects_and_skips() {
        let store = make_store(make_source());
        assert!(matches!(
            store.for_each_tile(-1.0, 100.0, 1.0, false, |_| {}),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.for_each_tile(10_000.0, 12_000.0, 1.0, false, |_| {}),
            Err(StoreError::InvalidRange { .. })
        ));

        let mut seen = Vec::new();
        store
            .for_each_tile(8500.0, 15_000.0, 1.0, false, |tile| seen.push(tile.index()))
            .unwrap();
        assert_eq!(seen, vec![8, 9]);
    }

    #[tokio::test]
    async fn test_get_tile_covers_position() {
        let store = make_store(make_source());
        let tile = store.get_tile(5500.0, 4.0, false).unwrap();
        assert_eq!(tile.level(), 2);
        assert_eq!(tile.index(), 1);
        assert!(tile.covers(5500.0));
        assert_eq!(tile.state(), TileState::Loading);
    }

    #[tokio::test]
    async fn test_get_tile_reuses_existing_tile() {
        let store = make_store(make_source());
        let a = store.get_or_create_tile(2, 1).unwrap();
        let b = store.get_tile(4100.0, 4.0, false).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(store.metrics().snapshot().fetches_issued, 1);
    }

    #[tokio::test]
    async fn test_get_tile_exact_requires_ladder_level() {
        let store = make_store(make_source());
        assert!(matches!(
            store.get_tile(100.0, 64.0, true),
            Err(StoreError::LevelUnavailable(6))
        ));
        let tile = store.get_tile(100.0, 64.0, false).unwrap();
        assert_eq!(tile.level(), 3);
    }

    #[tokio::test]
    async fn test_initialized_lod_range_tracks_requests() {
        let store = make_store(make_source());
        assert!(!store.is_within_initialized_lod_range(1.0));
        assert!(!store.is_within_initialized_lod_range(4.0));

        store.get_or_create_tile(2, 0).unwrap();
        assert!(store.is_within_initialized_lod_range(4.0));
        assert!(!store.is_within_initialized_lod_range(1.0));
        // beyond the coarsest level
        assert!(!store.is_within_initialized_lod_range(1e6));
        assert!(!store.is_within_initialized_lod_range(f64::NAN));
    }

    #[tokio::test]
    async fn test_level_absent_when_every_tile_not_found() {
        let source = Arc::new(InMemorySource::new("mem", vec![Contig::new("chr1", 10_000)]));
        let store = make_store(source);

        let first = store.get_or_create_tile(1, 0).unwrap();
        let second = store.get_or_create_tile(1, 1).unwrap();
        assert!(store.is_within_initialized_lod_range(2.0));
        settle(&store).await;

        assert!(first.error().is_some_and(|e| e.is_not_found()));
        assert!(second.error().is_some_and(|e| e.is_not_found()));
        assert!(!store.is_within_initialized_lod_range(2.0));
        assert_eq!(store.metrics().snapshot().fetches_failed, 2);

        // a new request puts the level back in range until it reports
        store.get_or_create_tile(1, 2).unwrap();
        assert!(store.is_within_initialized_lod_range(2.0));
        settle(&store).await;
        assert!(!store.is_within_initialized_lod_range(2.0));

        store.clear();
        store.get_or_create_tile(1, 0).unwrap();
        assert!(store.is_within_initialized_lod_range(2.0));
    }

    #[tokio::test]
    async fn test_sparse_level_stays_initialized() {
        let source = InMemorySource::new("mem", vec![Contig::new("chr1", 10_000)]);
        source.insert("chr1", TileKey::new(2, 0), vec![2]);
        let store = make_store(Arc::new(source));

        let present = store.get_or_create_tile(2, 0).unwrap();
        let missing: Vec<_> = (1..=2)
            .map(|index| store.get_or_create_tile(2, index).unwrap())
            .collect();
        settle(&store).await;

        assert_eq!(present.state(), TileState::Complete);
        assert!(missing
            .iter()
            .all(|tile| tile.error().is_some_and(|e| e.is_not_found())));
        assert!(store.is_within_initialized_lod_range(4.0));
    }

    #[tokio::test]
    async fn test_transient_error_is_terminal_for_tile_only() {
        let source = make_source();
        source.fail_with(
            "chr1",
            TileKey::new(0, 3),
            FetchError::Transient("reset".to_string()),
        );
        let store = make_store(Arc::clone(&source));

        let bad = store.get_or_create_tile(0, 3).unwrap();
        let good = store.get_or_create_tile(0, 4).unwrap();
        settle(&store).await;

        assert_eq!(bad.state(), TileState::Error);
        assert_eq!(good.state(), TileState::Complete);
        assert!(store.is_within_initialized_lod_range(1.0));

        // no automatic retry
        let again = store.get_or_create_tile(0, 3).unwrap();
        assert!(Rc::ptr_eq(&bad, &again));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_resets_to_cold_store() {
        let source = make_source();
        let store = make_store(Arc::clone(&source));

        let old = store.get_or_create_tile(0, 0).unwrap();
        settle(&store).await;
        store.clear();

        assert_eq!(store.tile_count(), 0);
        assert!(!store.is_within_initialized_lod_range(1.0));

        let fresh = store.get_or_create_tile(0, 0).unwrap();
        assert!(!Rc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.state(), TileState::Loading);
        settle(&store).await;
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_late_result_after_clear_is_stale() {
        let store = make_store(make_source());

        let held = store.get_or_create_tile(0, 1).unwrap();
        store.clear();
        settle(&store).await;

        // caller still holds the tile, so it transitions
        assert_eq!(held.state(), TileState::Complete);
        assert!(store.peek_tile(0, 1).is_none());
        assert!(!store.is_within_initialized_lod_range(1.0));

        let snapshot = store.metrics().snapshot();
        assert_eq!(snapshot.stale_results, 1);
        assert_eq!(snapshot.fetches_completed, 0);
    }

    #[tokio::test]
    async fn test_pump_applies_ready_results() {
        let store = make_store(make_source());
        let tile = store.get_or_create_tile(0, 0).unwrap();

        let mut applied = 0;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            applied += store.pump();
            if applied > 0 {
                break;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(tile.state(), TileState::Complete);
        assert_eq!(store.pump(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_completion_without_fetches() {
        let store = make_store(make_source());
        assert!(!store.wait_for_completion().await);
    }

    #[tokio::test]
    async fn test_open_finds_contig() {
        let source: Arc<dyn DataSource<Payload = Vec<u8>>> = make_source();
        let store = TileStore::open(source, "chr1", TileStoreConfig::default(), Handle::current())
            .await
            .unwrap();
        assert_eq!(store.contig().length(), 10_000);
    }

    #[tokio::test]
    async fn test_open_missing_contig() {
        let source: Arc<dyn DataSource<Payload = Vec<u8>>> = make_source();
        let result =
            TileStore::open(source, "chr9", TileStoreConfig::default(), Handle::current()).await;
        assert!(matches!(result, Err(StoreError::ContigNotFound(id)) if id == "chr9"));
    }

    #[tokio::test]
    async fn test_new_rejects_bad_ladder() {
        let config = TileStoreConfig::new(LodLadder::new(0, 0..=3));
        let result = TileStore::new(
            make_source() as Arc<dyn DataSource<Payload = Vec<u8>>>,
            Contig::new("chr1", 10_000),
            config,
            Handle::current(),
        );
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }
}
