//! In-memory data source.
//!
//! Serves payloads inserted ahead of time. Any tile without an entry is
//! reported as [`FetchError::NotFound`]; errors can also be injected per
//! tile. Useful for embedding precomputed summaries and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::contig::Contig;
use crate::source::{DataSource, SourceError, TileRequest};
use crate::tile::{FetchError, TileKey};

type EntryKey = (String, TileKey);

/// Data source backed by a map of prepared payloads.
pub struct InMemorySource<P> {
    id: String,
    contigs: Vec<Contig>,
    entries: RwLock<HashMap<EntryKey, Result<P, FetchError>>>,
    fetches: AtomicU64,
}

impl<P> InMemorySource<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Create an empty source carrying the given contigs.
    pub fn new(id: impl Into<String>, contigs: Vec<Contig>) -> Self {
        Self {
            id: id.into(),
            contigs,
            entries: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Store the payload for one tile.
    pub fn insert(&self, contig: &str, key: TileKey, payload: P) {
        self.entries
            .write()
            .insert((contig.to_string(), key), Ok(payload));
    }

    /// Make fetches for one tile fail with `error`.
    pub fn fail_with(&self, contig: &str, key: TileKey, error: FetchError) {
        self.entries
            .write()
            .insert((contig.to_string(), key), Err(error));
    }

    /// Number of fetches served so far, including failed ones.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl<P> DataSource for InMemorySource<P>
where
    P: Clone + Send + Sync + 'static,
{
    type Payload = P;

    fn id(&self) -> &str {
        &self.id
    }

    fn contigs(&self) -> BoxFuture<'_, Result<Vec<Contig>, SourceError>> {
        Box::pin(async move { Ok(self.contigs.clone()) })
    }

    fn fetch<'a>(&'a self, request: &'a TileRequest) -> BoxFuture<'a, Result<P, FetchError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            let entries = self.entries.read();
            match entries.get(&(request.contig.clone(), request.key)) {
                Some(entry) => entry.clone(),
                None => Err(request.not_found()),
            }
        })
    }
}
