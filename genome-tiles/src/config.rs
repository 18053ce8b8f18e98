//! Configuration for tile stores and the fallback compositor.
//!
//! Every setting has a `DEFAULT_*` constant and a `Default` impl. A track
//! configuration can be loaded from JSON, in which case any field that is
//! left out keeps its default.
//!
//! # Example
//!
//! ```
//! use genome_tiles::config::TrackConfig;
//!
//! let config = TrackConfig::from_json_str(
//!     r#"{ "compositor": { "fading_fallback_budget": 2 } }"#,
//! ).unwrap();
//! assert_eq!(config.compositor.fading_fallback_budget, 2);
//! assert_eq!(config.compositor.loading_fallback_budget, 1);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::store::lod::LodLadder;

// ==================== Compositor Defaults ====================

/// Default number of `Loading` fallback tiles accepted per compositor pass.
///
/// An incomplete coarse tile still risks a later pop-in, so these are kept
/// scarce.
pub const DEFAULT_LOADING_FALLBACK_BUDGET: usize = 1;

/// Default number of fading fallback tiles shown per compositor pass.
pub const DEFAULT_FADING_FALLBACK_BUDGET: usize = 1;

/// Default number of coarser levels tried when filling a gap.
///
/// Density multipliers are `2^p`, so this also keeps `p` well inside `u32`.
pub const DEFAULT_MAX_FALLBACK_CLIMB: u32 = 30;

/// Default precedence (z) of ideal tiles. Larger draws in front.
pub const DEFAULT_IDEAL_PRECEDENCE: f64 = 1.0;

/// Default precedence gap between ideal tiles and the finest fallback.
pub const DEFAULT_FALLBACK_PRECEDENCE_OFFSET: f64 = 0.1;

/// Default divisor applied to the LOD level when ranking fallbacks.
pub const DEFAULT_PRECEDENCE_LEVEL_SCALE: f64 = 50.0;

// ==================== Fade Defaults ====================

/// Default angular frequency of the fade-in spring in rad/s.
///
/// The spring is critically damped; at 12 rad/s a fade settles in roughly
/// half a second.
pub const DEFAULT_FADE_ANGULAR_FREQUENCY: f64 = 12.0;

/// Default distance from full opacity at which a fade snaps to 1.
pub const DEFAULT_FADE_SETTLE_EPSILON: f64 = 1e-3;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for a [`TileStore`](crate::store::TileStore).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileStoreConfig {
    /// Levels carried by the dataset and their spans.
    pub ladder: LodLadder,
}

impl TileStoreConfig {
    /// Create a store configuration around a ladder.
    pub fn new(ladder: LodLadder) -> Self {
        Self { ladder }
    }
}

/// Fade-in animation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    /// Angular frequency of the critically damped spring, in rad/s.
    pub angular_frequency: f64,

    /// Distance from the target at which the fade snaps to it.
    pub settle_epsilon: f64,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            angular_frequency: DEFAULT_FADE_ANGULAR_FREQUENCY,
            settle_epsilon: DEFAULT_FADE_SETTLE_EPSILON,
        }
    }
}

/// How gaps left by incomplete ideal tiles are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Climb coarser levels until an opaque tile is found.
    #[default]
    Ladder,

    /// Use only a complete tile from one fixed (macro) level.
    FixedLevel(u32),
}

/// Settings for the [`FallbackCompositor`](crate::compositor::FallbackCompositor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// `Loading` fallbacks accepted per pass.
    pub loading_fallback_budget: usize,

    /// Fading fallbacks shown per pass; further ones are suppressed.
    pub fading_fallback_budget: usize,

    /// Coarser levels tried per gap.
    pub max_fallback_climb: u32,

    /// Precedence of ideal tiles.
    pub ideal_precedence: f64,

    /// Gap between ideal precedence and fallback precedence.
    pub fallback_precedence_offset: f64,

    /// Divisor applied to the level when ranking fallbacks.
    pub precedence_level_scale: f64,

    /// Gap-filling strategy.
    pub strategy: FallbackStrategy,

    /// Fade-in animation.
    pub fade: FadeConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            loading_fallback_budget: DEFAULT_LOADING_FALLBACK_BUDGET,
            fading_fallback_budget: DEFAULT_FADING_FALLBACK_BUDGET,
            max_fallback_climb: DEFAULT_MAX_FALLBACK_CLIMB,
            ideal_precedence: DEFAULT_IDEAL_PRECEDENCE,
            fallback_precedence_offset: DEFAULT_FALLBACK_PRECEDENCE_OFFSET,
            precedence_level_scale: DEFAULT_PRECEDENCE_LEVEL_SCALE,
            strategy: FallbackStrategy::default(),
            fade: FadeConfig::default(),
        }
    }
}

impl CompositorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loading fallback budget.
    pub fn with_loading_budget(mut self, budget: usize) -> Self {
        self.loading_fallback_budget = budget;
        self
    }

    /// Set the fading fallback budget.
    pub fn with_fading_budget(mut self, budget: usize) -> Self {
        self.fading_fallback_budget = budget;
        self
    }

    /// Set the gap-filling strategy.
    pub fn with_strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the fade-in animation.
    pub fn with_fade(mut self, fade: FadeConfig) -> Self {
        self.fade = fade;
        self
    }

    /// Precedence of a fallback tile at `level`.
    ///
    /// Strictly decreasing in `level`, and always below the ideal precedence.
    pub fn fallback_precedence(&self, level: u32) -> f64 {
        self.ideal_precedence
            - level as f64 / self.precedence_level_scale
            - self.fallback_precedence_offset
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fallback_climb >= u32::BITS {
            return Err(ConfigError::Invalid(format!(
                "max_fallback_climb must be below {}, got {}",
                u32::BITS,
                self.max_fallback_climb
            )));
        }
        if !(self.precedence_level_scale.is_finite() && self.precedence_level_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "precedence_level_scale must be positive".into(),
            ));
        }
        if self.fallback_precedence_offset <= 0.0 {
            return Err(ConfigError::Invalid(
                "fallback_precedence_offset must be positive".into(),
            ));
        }
        if !(self.fade.angular_frequency.is_finite() && self.fade.angular_frequency > 0.0) {
            return Err(ConfigError::Invalid(
                "fade angular_frequency must be positive".into(),
            ));
        }
        if !(self.fade.settle_epsilon > 0.0 && self.fade.settle_epsilon < 1.0) {
            return Err(ConfigError::Invalid(
                "fade settle_epsilon must be in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Combined configuration for one track: its store and its compositor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Tile store settings.
    pub store: TileStoreConfig,

    /// Compositor settings.
    pub compositor: CompositorConfig,
}

impl TrackConfig {
    /// Parse a JSON configuration and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check value ranges of both parts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store
            .ladder
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.compositor.validate()
    }
}
