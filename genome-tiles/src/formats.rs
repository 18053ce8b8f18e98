//! Genomic file format detection.
//!
//! Decoding is left to the data source; this only recognises which decoder
//! a path needs.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File formats a data source can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenomicFileFormat {
    /// BigWig signal file.
    BigWig,
    /// BigBed interval file.
    BigBed,
    /// BigBed holding ENCODE narrowPeak records.
    BigBedNarrowPeak,
    /// BigBed holding ENCODE broadPeak records.
    BigBedBroadPeak,
    /// Directory of pre-tiled gene annotations.
    ValisGenes,
    /// Directory of pre-tiled sequence.
    ValisDna,
    /// Directory of pre-tiled variants.
    ValisVariants,
}

impl GenomicFileFormat {
    /// Detect the format of `path` from its extension.
    ///
    /// `variant` refines a BigBed file: `"narrowPeak"` and `"broadPeak"`
    /// select the peak formats. Matching is case-insensitive on the
    /// extension only.
    ///
    /// Returns `None` for unknown extensions.
    pub fn detect(path: impl AsRef<Path>, variant: Option<&str>) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        let format = match extension.as_str() {
            "bigwig" | "bwig" | "bw" => Self::BigWig,
            "bigbed" | "bbed" | "bb" => Self::BigBed,
            "vgenes-dir" => Self::ValisGenes,
            "vdna-dir" => Self::ValisDna,
            "vvariants-dir" => Self::ValisVariants,
            _ => return None,
        };

        Some(match (format, variant) {
            (Self::BigBed, Some("narrowPeak")) => Self::BigBedNarrowPeak,
            (Self::BigBed, Some("broadPeak")) => Self::BigBedBroadPeak,
            _ => format,
        })
    }

    /// Whether the format stores one directory of pre-tiled files.
    pub fn is_directory(self) -> bool {
        matches!(self, Self::ValisGenes | Self::ValisDna | Self::ValisVariants)
    }
}

impl fmt::Display for GenomicFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenomicFileFormat::BigWig => write!(f, "bigwig"),
            GenomicFileFormat::BigBed => write!(f, "bigbed"),
            GenomicFileFormat::BigBedNarrowPeak => write!(f, "bigbed-narrow-peak"),
            GenomicFileFormat::BigBedBroadPeak => write!(f, "bigbed-broad-peak"),
            GenomicFileFormat::ValisGenes => write!(f, "valis-genes"),
            GenomicFileFormat::ValisDna => write!(f, "valis-dna"),
            GenomicFileFormat::ValisVariants => write!(f, "valis-variants"),
        }
    }
}
