//! Error types for tile fetches.

use thiserror::Error;

/// Errors a data source can report for a single tile fetch.
///
/// A fetch error is terminal for the tile it belongs to. It does not affect
/// sibling tiles or the owning store, and it is never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source holds no data for this contig/level/index.
    #[error("No data for {contig} at level {level}, index {index}")]
    NotFound {
        contig: String,
        level: u32,
        index: u64,
    },

    /// Network or I/O failure that might succeed on a later attempt.
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// The payload arrived but could not be decoded.
    #[error("Failed to parse tile payload: {0}")]
    Parse(String),
}

impl FetchError {
    /// Returns true if the source reported that no data exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
