//! Gap-filling fallback compositor.
//!
//! Once per frame the compositor walks the ideal tiles for the view. Any
//! ideal tile that is not yet opaque leaves a gap, which is filled with the
//! best coarser tile available so the view never goes blank while precise
//! data loads.
//!
//! # Algorithm
//!
//! For each ideal tile that is not opaque, look at its centre and climb the
//! ladder with density multipliers `2^p`, `p = 1, 2, ...`:
//!
//! 1. Stop as soon as the implied level has never been requested.
//! 2. Skip levels already shown for this gap.
//! 3. Accept `Complete` tiles, and `Loading` tiles while the per-pass
//!    loading budget lasts.
//! 4. A complete tile that is still fading in uses the per-pass fading
//!    budget; once that is spent such tiles are suppressed.
//! 5. Stop once an accepted fallback is opaque.
//!
//! Precedence falls strictly with level, so finer fallbacks draw over
//! coarser ones and ideal tiles draw over everything.
//!
//! # Frame loop
//!
//! ```ignore
//! store.pump();
//! compositor.advance(dt);
//! let frame = compositor.compose(&store, &view)?;
//! for intent in frame.intents() {
//!     draw(intent);
//! }
//! ```

pub mod fade;
pub mod node;

pub use fade::FadeIn;
pub use node::TileNode;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::config::{CompositorConfig, ConfigError, FallbackStrategy};
use crate::store::{StoreError, TileStore};
use crate::tile::{Tile, TileState};
use crate::usage_cache::UsageCache;

/// Visible genomic window and its display geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    /// First visible base pair.
    pub x0: f64,
    /// One past the last visible base pair.
    pub x1: f64,
    /// Width of the track in display pixels.
    pub width_px: f64,
    /// Device pixels per display pixel.
    pub pixel_ratio: f64,
    /// Extra factor applied to the density, for tracks that can use coarser data.
    pub density_multiplier: f64,
}

impl ViewWindow {
    /// Create a window with unit pixel ratio and density multiplier.
    pub fn new(x0: f64, x1: f64, width_px: f64) -> Self {
        Self {
            x0,
            x1,
            width_px,
            pixel_ratio: 1.0,
            density_multiplier: 1.0,
        }
    }

    /// Set the device pixel ratio.
    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    /// Set the density multiplier.
    pub fn with_density_multiplier(mut self, multiplier: f64) -> Self {
        self.density_multiplier = multiplier;
        self
    }

    /// Number of base pairs in view.
    pub fn span(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Base pairs per device pixel, or `None` if nothing is visible.
    pub fn sampling_density(&self) -> Option<f64> {
        let span = self.span();
        if !(self.width_px > 0.0 && span > 0.0 && self.pixel_ratio > 0.0) {
            return None;
        }
        let density = self.density_multiplier * (span / self.width_px) / self.pixel_ratio;
        (density.is_finite() && density > 0.0).then_some(density)
    }

    /// Continuous LOD level, `log2(max(density, 1))`.
    pub fn display_lod_level(&self) -> f64 {
        self.sampling_density()
            .map(|density| density.max(1.0).log2())
            .unwrap_or(0.0)
    }
}

/// Why a tile appears in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentRole {
    /// Tile at the ideal level for the view.
    Ideal,
    /// Coarser tile filling a gap.
    Fallback,
}

/// One tile to draw this frame.
#[derive(Debug)]
pub struct DisplayIntent<P> {
    /// Usage-cache key, `"{contig}:{tile cache key}"`.
    pub key: String,
    /// Tile to draw.
    pub tile: Rc<Tile<P>>,
    /// Ideal or fallback.
    pub role: IntentRole,
    /// Draw order; larger is in front.
    pub precedence: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Whether there is content to draw (complete and rendering).
    pub drawable: bool,
    /// Tile start relative to the view, in view widths.
    pub relative_x: f64,
    /// Tile width relative to the view, in view widths.
    pub relative_width: f64,
}

impl<P> DisplayIntent<P> {
    /// LOD level of the tile.
    pub fn level(&self) -> u32 {
        self.tile.level()
    }

    /// Whether the tile covers `position`.
    pub fn covers(&self, position: f64) -> bool {
        self.tile.covers(position)
    }
}

/// Counters for one compositor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Ideal tiles placed.
    pub ideal_tiles: usize,
    /// Ideal tiles that were not opaque.
    pub gaps: usize,
    /// Fallback tiles placed.
    pub fallback_tiles: usize,
    /// Fallbacks accepted while still loading.
    pub loading_fallbacks: usize,
    /// Fallbacks accepted while fading in.
    pub fading_fallbacks: usize,
    /// Fading fallbacks dropped for lack of budget.
    pub suppressed_fading: usize,
    /// Gaps left without an opaque fallback.
    pub unfilled_gaps: usize,
    /// Nodes disposed at the end of the pass.
    pub disposed: usize,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ideal ({} gaps), {} fallback ({} loading, {} fading, {} suppressed), {} unfilled, {} disposed",
            self.ideal_tiles,
            self.gaps,
            self.fallback_tiles,
            self.loading_fallbacks,
            self.fading_fallbacks,
            self.suppressed_fading,
            self.unfilled_gaps,
            self.disposed
        )
    }
}

/// Result of one compositor pass.
#[derive(Debug)]
pub struct Frame<P> {
    /// Tiles to draw, back to front.
    pub intents: Vec<DisplayIntent<P>>,
    /// Sampling density used, if anything was visible.
    pub sampling_density: Option<f64>,
    /// Continuous LOD level for shaders.
    pub display_lod_level: f64,
    /// Keys of nodes disposed in this pass.
    pub disposed: Vec<String>,
    /// Pass counters.
    pub stats: FrameStats,
}

impl<P> Frame<P> {
    /// Tiles to draw, back to front.
    pub fn intents(&self) -> &[DisplayIntent<P>] {
        &self.intents
    }

    /// Returns true if nothing is to be drawn.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Intents with drawable content covering `position`, back to front.
    pub fn covering(&self, position: f64) -> impl Iterator<Item = &DisplayIntent<P>> + '_ {
        self.intents
            .iter()
            .filter(move |intent| intent.drawable && intent.covers(position))
    }

    /// Whether some drawable intent covers `position`.
    pub fn is_covered(&self, position: f64) -> bool {
        self.covering(position).next().is_some()
    }

    /// Front-most drawable intent covering `position`.
    pub fn front_at(&self, position: f64) -> Option<&DisplayIntent<P>> {
        self.covering(position).last()
    }
}

/// Mutable state of one pass.
struct Pass<P> {
    x0: f64,
    span: f64,
    loading_left: usize,
    fading_left: usize,
    emitted: HashSet<String>,
    replaced: Vec<String>,
    intents: Vec<DisplayIntent<P>>,
    stats: FrameStats,
}

impl<P: 'static> Pass<P> {
    fn place(&mut self, node: &TileNode<P>, role: IntentRole, precedence: f64) {
        let tile = node.tile();
        self.emitted.insert(node.key().to_string());
        self.intents.push(DisplayIntent {
            key: node.key().to_string(),
            tile: Rc::clone(tile),
            role,
            precedence,
            opacity: node.opacity(),
            drawable: node.is_rendering() && tile.is_complete(),
            relative_x: (tile.x() as f64 - self.x0) / self.span,
            relative_width: tile.span() as f64 / self.span,
        });
    }
}

/// Chooses the tiles to show for a view and keeps their display state.
///
/// One compositor belongs to one track; its nodes are never shared.
pub struct FallbackCompositor<P> {
    config: CompositorConfig,
    nodes: UsageCache<TileNode<P>>,
}

impl<P: Send + Sync + 'static> FallbackCompositor<P> {
    /// Create a compositor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration is out of range.
    pub fn new(config: CompositorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: UsageCache::new(),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Number of display nodes kept alive.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Display node for `key`, if one is alive.
    pub fn node(&self, key: &str) -> Option<&TileNode<P>> {
        self.nodes.peek(key)
    }

    /// Step fade animations by `dt`. Returns true while any node is animating.
    pub fn advance(&mut self, dt: Duration) -> bool {
        let mut animating = false;
        for (_, node) in self.nodes.iter_mut() {
            animating |= node.advance(dt);
        }
        animating
    }

    /// Dispose every display node.
    pub fn clear(&mut self) -> usize {
        self.nodes.clear(drop)
    }

    /// Build the frame for `view`.
    ///
    /// Ideal tiles are created in `store` as needed. Nodes not used by this
    /// frame are disposed, as are nodes replaced because the store was
    /// cleared under them. A view with zero width or zero span yields an
    /// empty frame.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRange` for non-finite or reversed view
    /// bounds, leaving every display node in place.
    pub fn compose(
        &mut self,
        store: &TileStore<P>,
        view: &ViewWindow,
    ) -> Result<Frame<P>, StoreError> {
        if !view.x0.is_finite() || !view.x1.is_finite() || view.x1 < view.x0 {
            return Err(StoreError::InvalidRange {
                x0: view.x0,
                x1: view.x1,
                reason: "view bounds must be finite and ordered".to_string(),
            });
        }
        self.nodes.mark_all_unused();

        let mut pass = Pass {
            x0: view.x0,
            span: view.span(),
            loading_left: self.config.loading_fallback_budget,
            fading_left: self.config.fading_fallback_budget,
            emitted: HashSet::new(),
            replaced: Vec::new(),
            intents: Vec::new(),
            stats: FrameStats::default(),
        };

        let density = view.sampling_density();
        if let Some(density) = density {
            let mut failure = None;
            store.for_each_tile(view.x0, view.x1, density, true, |tile| {
                if failure.is_some() {
                    return;
                }
                if let Err(e) = self.place_ideal(store, tile, density, &mut pass) {
                    failure = Some(e);
                }
            })?;
            if let Some(e) = failure {
                return Err(e);
            }
        }

        let mut disposed = std::mem::take(&mut pass.replaced);
        self.nodes
            .remove_unused(|node| disposed.push(node.key().to_string()));
        disposed.sort();
        disposed.dedup();
        pass.stats.disposed = disposed.len();

        let mut intents = pass.intents;
        intents.sort_by(|a, b| a.precedence.total_cmp(&b.precedence));

        trace!(contig = store.contig().id(), stats = %pass.stats, "Composed frame");

        Ok(Frame {
            intents,
            sampling_density: density,
            display_lod_level: view.display_lod_level(),
            disposed,
            stats: pass.stats,
        })
    }

    fn node_key(store: &TileStore<P>, tile: &Tile<P>) -> String {
        format!("{}:{}", store.contig().id(), tile.cache_key())
    }

    fn acquire(
        &mut self,
        key: &str,
        tile: &Rc<Tile<P>>,
        replaced: &mut Vec<String>,
    ) -> &mut TileNode<P> {
        let fade = self.config.fade;
        // a store clear leaves nodes holding detached tiles under the same key
        let detached = self
            .nodes
            .peek(key)
            .is_some_and(|node| !Rc::ptr_eq(node.tile(), tile));
        if detached {
            let stale = self
                .nodes
                .replace(key, TileNode::new(key, Rc::clone(tile), &fade));
            if stale.is_some() {
                replaced.push(key.to_string());
            }
        }
        self.nodes
            .get(key, || TileNode::new(key, Rc::clone(tile), &fade))
    }

    fn place_ideal(
        &mut self,
        store: &TileStore<P>,
        tile: &Rc<Tile<P>>,
        density: f64,
        pass: &mut Pass<P>,
    ) -> Result<(), StoreError> {
        let key = Self::node_key(store, tile);
        let precedence = self.config.ideal_precedence;
        let node = self.acquire(&key, tile, &mut pass.replaced);
        let opaque = node.is_opaque();
        pass.place(node, IntentRole::Ideal, precedence);
        pass.stats.ideal_tiles += 1;

        if opaque {
            return Ok(());
        }
        pass.stats.gaps += 1;

        let filled = match self.config.strategy {
            FallbackStrategy::Ladder => self.climb(store, tile, density, pass)?,
            FallbackStrategy::FixedLevel(level) => self.fixed_level(store, tile, level, pass)?,
        };
        if !filled {
            pass.stats.unfilled_gaps += 1;
        }
        Ok(())
    }

    /// Fill the gap left by `tile` from progressively coarser levels.
    ///
    /// Returns true once an opaque fallback covers the gap.
    fn climb(
        &mut self,
        store: &TileStore<P>,
        tile: &Rc<Tile<P>>,
        density: f64,
        pass: &mut Pass<P>,
    ) -> Result<bool, StoreError> {
        let center = tile.center();
        let mut levels_tried = vec![tile.level()];

        for p in 1..=self.config.max_fallback_climb {
            let fallback_density = density * 2f64.powi(p as i32);
            if !store.is_within_initialized_lod_range(fallback_density) {
                break;
            }

            let fallback = store.get_tile(center, fallback_density, false)?;
            let level = fallback.level();
            if levels_tried.contains(&level) {
                continue;
            }
            levels_tried.push(level);

            let key = Self::node_key(store, &fallback);
            if pass.emitted.contains(&key) {
                // already placed for a neighbouring gap this pass
                if self.nodes.peek(&key).is_some_and(|node| node.is_opaque()) {
                    return Ok(true);
                }
                continue;
            }

            let loading = match fallback.state() {
                TileState::Complete => false,
                TileState::Loading if pass.loading_left > 0 => true,
                TileState::Loading | TileState::Error => continue,
            };
            if loading {
                pass.loading_left -= 1;
                pass.stats.loading_fallbacks += 1;
            }

            let precedence = self.config.fallback_precedence(level);
            let node = self.acquire(&key, &fallback, &mut pass.replaced);

            if fallback.is_complete() && node.opacity() < 1.0 {
                if pass.fading_left == 0 {
                    self.nodes.mark_unused(&key);
                    pass.stats.suppressed_fading += 1;
                    continue;
                }
                pass.fading_left -= 1;
                pass.stats.fading_fallbacks += 1;
            }

            let opaque = node.is_opaque();
            pass.place(node, IntentRole::Fallback, precedence);
            pass.stats.fallback_tiles += 1;

            if opaque {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fill the gap left by `tile` from one macro level, if that tile is complete.
    fn fixed_level(
        &mut self,
        store: &TileStore<P>,
        tile: &Rc<Tile<P>>,
        level: u32,
        pass: &mut Pass<P>,
    ) -> Result<bool, StoreError> {
        if level == tile.level() || !store.ladder().contains(level) {
            return Ok(false);
        }
        let Some(span) = store.ladder().tile_span(level) else {
            return Ok(false);
        };
        let index = (tile.center() / span as f64).floor() as u64;
        let fallback = match store.get_or_create_tile(level, index) {
            Ok(fallback) => fallback,
            Err(StoreError::IndexOutOfBounds { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !fallback.is_complete() {
            return Ok(false);
        }

        let key = Self::node_key(store, &fallback);
        let precedence = self.config.fallback_precedence(level);
        let already_placed = pass.emitted.contains(&key);
        let node = self.acquire(&key, &fallback, &mut pass.replaced);
        let opaque = node.is_opaque();
        if !already_placed {
            pass.place(node, IntentRole::Fallback, precedence);
            pass.stats.fallback_tiles += 1;
        }
        Ok(opaque)
    }
}

impl<P> fmt::Debug for FallbackCompositor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCompositor")
            .field("config", &self.config)
            .field("nodes", &self.nodes)
            .finish()
    }
}
