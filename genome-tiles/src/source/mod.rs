//! Data source capability consumed by tile stores.
//!
//! A data source enumerates the contigs it knows about and fetches the
//! parsed payload for one tile. File-format decoding (BigWig, BigBed, GFF3,
//! custom binary layouts) lives behind this trait; the tile store only sees
//! payloads or [`FetchError`]s.
//!
//! # Dyn Compatibility
//!
//! Async methods return boxed futures so that stores can hold an
//! `Arc<dyn DataSource<Payload = P>>` and spawn fetches onto a runtime.

pub mod memory;

pub use memory::InMemorySource;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::contig::Contig;
use crate::tile::{FetchError, TileKey};

/// Errors raised while enumerating a source's contigs.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached or is not ready.
    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    /// I/O error while reading source metadata.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a source needs to produce one tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRequest {
    /// Contig identifier.
    pub contig: String,
    /// Level and index of the tile.
    pub key: TileKey,
    /// First base pair of the tile.
    pub x: u64,
    /// Base pairs covered by the tile.
    pub span: u64,
}

impl TileRequest {
    /// LOD level requested.
    pub fn level(&self) -> u32 {
        self.key.level
    }

    /// Tile index requested.
    pub fn index(&self) -> u64 {
        self.key.index
    }

    /// Build the not-found error for this request.
    pub fn not_found(&self) -> FetchError {
        FetchError::NotFound {
            contig: self.contig.clone(),
            level: self.key.level,
            index: self.key.index,
        }
    }
}

/// A source of tile payloads.
///
/// Implementations must be `Send + Sync`; fetches run on runtime worker
/// threads while the store that issued them stays on the frame thread.
pub trait DataSource: Send + Sync {
    /// Parsed payload type delivered for each tile.
    type Payload: Send + Sync + 'static;

    /// Stable identifier, used to key stores in a registry.
    fn id(&self) -> &str;

    /// List the contigs this source carries data for.
    fn contigs(&self) -> BoxFuture<'_, Result<Vec<Contig>, SourceError>>;

    /// Fetch and parse the payload for one tile.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] when the source has no data for the
    /// contig or level, and a transient or parse error otherwise.
    fn fetch<'a>(
        &'a self,
        request: &'a TileRequest,
    ) -> BoxFuture<'a, Result<Self::Payload, FetchError>>;
}
