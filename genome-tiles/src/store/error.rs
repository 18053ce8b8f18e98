//! Store-level error types.

use thiserror::Error;

use crate::source::SourceError;

/// Errors reported synchronously at the tile store boundary.
///
/// Tile fetch failures are not store errors; they are recorded on the tile
/// itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data source does not carry the requested contig.
    #[error("Contig not found: {0}")]
    ContigNotFound(String),

    /// The requested genomic interval cannot be resolved.
    #[error("Invalid range [{x0}, {x1}): {reason}")]
    InvalidRange { x0: f64, x1: f64, reason: String },

    /// Sampling density is not a positive finite number.
    #[error("Invalid sampling density: {0}")]
    InvalidDensity(f64),

    /// The ladder carries no data at this level.
    #[error("LOD level {0} is not available")]
    LevelUnavailable(u32),

    /// Tile index lies past the end of the contig.
    #[error("Tile index {index} out of bounds at level {level} (max {max})")]
    IndexOutOfBounds { level: u32, index: u64, max: u64 },

    /// Store configuration cannot be used.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Enumerating contigs failed.
    #[error("Data source error: {0}")]
    Source(#[from] SourceError),
}
