//! genome-tiles - LOD tile caching and gap-filling composition for genome tracks
//!
//! This library decides which pieces of genomic data a track shows at a
//! given zoom level, fetches them asynchronously, and fills the holes left
//! by tiles still loading with coarser tiles that are already available.
//!
//! The pieces, bottom up:
//!
//! - [`Tile`]: one genomic interval at one level, `Loading` until its fetch
//!   completes or fails.
//! - [`TileStore`]: every tile of one data source on one contig, with the
//!   bookkeeping needed to know which levels were ever requested.
//! - [`UsageCache`]: mark-and-sweep cache for per-frame display objects.
//! - [`FallbackCompositor`]: per-frame pass that picks ideal and fallback
//!   tiles, with loading and fading budgets.
//!
//! Data comes from a [`DataSource`]; file-format decoding lives there.

pub mod compositor;
pub mod config;
pub mod contig;
pub mod formats;
pub mod logging;
pub mod source;
pub mod store;
pub mod telemetry;
pub mod tile;
pub mod usage_cache;

pub use compositor::{
    DisplayIntent, FallbackCompositor, Frame, FrameStats, IntentRole, TileNode, ViewWindow,
};
pub use config::{CompositorConfig, FallbackStrategy, TileStoreConfig, TrackConfig};
pub use contig::Contig;
pub use formats::GenomicFileFormat;
pub use source::{DataSource, InMemorySource, TileRequest};
pub use store::{LodLadder, StoreError, StoreKey, StoreRegistry, TileStore};
pub use telemetry::{StoreMetrics, StoreSnapshot};
pub use tile::{FetchError, Tile, TileKey, TileState};
pub use usage_cache::UsageCache;
