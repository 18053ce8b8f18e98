//! Contig identity and extent.

use serde::{Deserialize, Serialize};

/// A named sequence (chromosome, scaffold, ...) with a known length.
///
/// Immutable once known; a [`TileStore`](crate::store::TileStore) is bound to
/// exactly one contig for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contig {
    id: String,
    length: u64,
}

impl Contig {
    /// Create a contig.
    ///
    /// # Arguments
    ///
    /// * `id` - Contig identifier, e.g. `"chr1"`
    /// * `length` - Length in base pairs
    pub fn new(id: impl Into<String>, length: u64) -> Self {
        Self {
            id: id.into(),
            length,
        }
    }

    /// Get the contig identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the contig length in base pairs.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of tiles of the given span needed to cover the contig.
    pub fn tile_count(&self, span: u64) -> u64 {
        if span == 0 {
            return 0;
        }
        self.length.div_ceil(span)
    }
}
