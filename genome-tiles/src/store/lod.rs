//! Level-of-detail ladder.
//!
//! Level 0 is the finest level; the tile span at level `L` is
//! `base_tile_span * 2^L`. A dataset may only carry a subset of levels, for
//! example a fine "micro" set and a coarse "macro" set with a gap between
//! them. Densities that imply a missing level resolve to the next coarser
//! level that exists.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Default span of a level-0 tile in base pairs.
pub const DEFAULT_BASE_TILE_SPAN: u64 = 1024;

/// Default sampling density (base pairs per display unit) served by level 0.
pub const DEFAULT_REFERENCE_DENSITY: f64 = 1.0;

/// Default coarsest level of the ladder.
pub const DEFAULT_MAX_LEVEL: u32 = 15;

/// The set of LOD levels available for a dataset and their tile spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodLadder {
    /// Span of a level-0 tile in base pairs.
    pub base_tile_span: u64,

    /// Density at which level 0 is the ideal level.
    pub reference_density: f64,

    /// Levels that carry data.
    pub levels: BTreeSet<u32>,
}

impl Default for LodLadder {
    fn default() -> Self {
        Self {
            base_tile_span: DEFAULT_BASE_TILE_SPAN,
            reference_density: DEFAULT_REFERENCE_DENSITY,
            levels: (0..=DEFAULT_MAX_LEVEL).collect(),
        }
    }
}

impl LodLadder {
    /// Create a ladder with a contiguous run of levels.
    pub fn new(base_tile_span: u64, levels: RangeInclusive<u32>) -> Self {
        Self {
            base_tile_span,
            levels: levels.collect(),
            ..Self::default()
        }
    }

    /// Create a ladder with a fine "micro" set and a coarse "macro" set.
    ///
    /// Levels between the two sets carry no data.
    pub fn micro_macro(
        base_tile_span: u64,
        micro: RangeInclusive<u32>,
        macro_levels: RangeInclusive<u32>,
    ) -> Self {
        Self {
            base_tile_span,
            levels: micro.chain(macro_levels).collect(),
            ..Self::default()
        }
    }

    /// Set the reference density.
    pub fn with_reference_density(mut self, density: f64) -> Self {
        self.reference_density = density;
        self
    }

    /// Check that the ladder can be used to address tiles.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.levels.is_empty() {
            return Err(StoreError::InvalidConfig("LOD ladder has no levels".into()));
        }
        if self.base_tile_span == 0 {
            return Err(StoreError::InvalidConfig(
                "base tile span must be positive".into(),
            ));
        }
        if !(self.reference_density.is_finite() && self.reference_density > 0.0) {
            return Err(StoreError::InvalidConfig(format!(
                "reference density must be positive, got {}",
                self.reference_density
            )));
        }
        let coarsest = self.coarsest();
        if self.tile_span(coarsest).is_none() {
            return Err(StoreError::InvalidConfig(format!(
                "tile span overflows at level {}",
                coarsest
            )));
        }
        Ok(())
    }

    /// Whether the ladder carries data at `level`.
    pub fn contains(&self, level: u32) -> bool {
        self.levels.contains(&level)
    }

    /// Finest available level.
    pub fn finest(&self) -> u32 {
        self.levels.first().copied().unwrap_or(0)
    }

    /// Coarsest available level.
    pub fn coarsest(&self) -> u32 {
        self.levels.last().copied().unwrap_or(0)
    }

    /// Tile span at `level`, or `None` if it overflows.
    pub fn tile_span(&self, level: u32) -> Option<u64> {
        if level >= u64::BITS {
            return None;
        }
        self.base_tile_span.checked_mul(1u64 << level)
    }

    /// Unclamped ideal level for a sampling density.
    ///
    /// `floor(log2(max(density / reference_density, 1)))`
    pub fn ideal_level(&self, density: f64) -> u32 {
        let ratio = (density / self.reference_density).max(1.0);
        ratio.log2().floor() as u32
    }

    /// Finest available level at or above the ideal level for `density`.
    ///
    /// Returns `None` when the density is coarser than anything the ladder
    /// carries.
    pub fn implied_level(&self, density: f64) -> Option<u32> {
        let ideal = self.ideal_level(density);
        self.levels.range(ideal..).next().copied()
    }

    /// Level used to cover a view at `density`, clamped to the ladder.
    pub fn clamped_level(&self, density: f64) -> u32 {
        self.implied_level(density)
            .unwrap_or_else(|| self.coarsest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let ladder = LodLadder::default();
        assert_eq!(ladder.finest(), 0);
        assert_eq!(ladder.coarsest(), DEFAULT_MAX_LEVEL);
        assert!(ladder.validate().is_ok());
    }

    #[test]
    fn test_tile_span_doubles_per_level() {
        let ladder = LodLadder::new(1000, 0..=4);
        assert_eq!(ladder.tile_span(0), Some(1000));
        assert_eq!(ladder.tile_span(1), Some(2000));
        assert_eq!(ladder.tile_span(2), Some(4000));
        assert_eq!(ladder.tile_span(4), Some(16000));
    }

    #[test]
    fn test_tile_span_overflow() {
        let ladder = LodLadder::new(1024, 0..=4);
        assert_eq!(ladder.tile_span(64), None);
        assert_eq!(ladder.tile_span(60), None);
    }

    #[test]
    fn test_ideal_level() {
        let ladder = LodLadder::new(1000, 0..=10);
        assert_eq!(ladder.ideal_level(0.25), 0);
        assert_eq!(ladder.ideal_level(1.0), 0);
        assert_eq!(ladder.ideal_level(1.99), 0);
        assert_eq!(ladder.ideal_level(2.0), 1);
        assert_eq!(ladder.ideal_level(7.9), 2);
        assert_eq!(ladder.ideal_level(8.0), 3);
    }

    #[test]
    fn test_ideal_level_respects_reference_density() {
        let ladder = LodLadder::new(1000, 0..=10).with_reference_density(4.0);
        assert_eq!(ladder.ideal_level(4.0), 0);
        assert_eq!(ladder.ideal_level(8.0), 1);
        assert_eq!(ladder.ideal_level(2.0), 0);
    }

    #[test]
    fn test_implied_level_skips_gap() {
        let ladder = LodLadder::micro_macro(1000, 0..=2, 6..=8);
        assert_eq!(ladder.implied_level(1.0), Some(0));
        assert_eq!(ladder.implied_level(4.0), Some(2));
        // ideal level 3 sits in the gap
        assert_eq!(ladder.implied_level(8.0), Some(6));
        assert_eq!(ladder.implied_level(256.0), Some(8));
        assert_eq!(ladder.implied_level(512.0), None);
    }

    #[test]
    fn test_clamped_level_caps_at_coarsest() {
        let ladder = LodLadder::new(1000, 0..=3);
        assert_eq!(ladder.clamped_level(1e9), 3);
        assert_eq!(ladder.clamped_level(2.0), 1);
    }

    #[test]
    fn test_validate_rejects_empty_ladder() {
        let ladder = LodLadder {
            levels: BTreeSet::new(),
            ..LodLadder::default()
        };
        assert!(matches!(ladder.validate(), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_span() {
        let ladder = LodLadder::new(0, 0..=3);
        assert!(ladder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_reference_density() {
        let ladder = LodLadder::default().with_reference_density(0.0);
        assert!(ladder.validate().is_err());
        let ladder = LodLadder::default().with_reference_density(f64::NAN);
        assert!(ladder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_level() {
        let ladder = LodLadder::new(1024, 0..=60);
        assert!(ladder.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let ladder: LodLadder = serde_json::from_str(r#"{"base_tile_span": 512}"#).unwrap();
        assert_eq!(ladder.base_tile_span, 512);
        assert_eq!(ladder.reference_density, DEFAULT_REFERENCE_DENSITY);
        assert_eq!(ladder.coarsest(), DEFAULT_MAX_LEVEL);
    }
}
