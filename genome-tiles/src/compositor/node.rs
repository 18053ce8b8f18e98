//! Per-tile display state kept across frames.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::compositor::fade::FadeIn;
use crate::config::FadeConfig;
use crate::tile::{ListenerId, Tile, TileState};

struct NodeState {
    render: Cell<bool>,
    fade: RefCell<FadeIn>,
}

/// Display state for one tile: whether it renders and how opaque it is.
///
/// A node made for a tile that is already complete starts fully opaque. A
/// node made while the tile is loading starts invisible and fades in once
/// the tile completes.
pub struct TileNode<P> {
    key: String,
    tile: Rc<Tile<P>>,
    state: Rc<NodeState>,
    listener: Option<ListenerId>,
}

impl<P: 'static> TileNode<P> {
    /// Create display state for `tile`.
    pub fn new(key: impl Into<String>, tile: Rc<Tile<P>>, fade: &FadeConfig) -> Self {
        let complete = tile.is_complete();
        let state = Rc::new(NodeState {
            render: Cell::new(complete),
            fade: RefCell::new(FadeIn::at(if complete { 1.0 } else { 0.0 }, fade)),
        });

        let listener = match tile.state() {
            TileState::Loading => {
                let weak: Weak<NodeState> = Rc::downgrade(&state);
                tile.on_complete(move |_| {
                    if let Some(state) = weak.upgrade() {
                        state.render.set(true);
                        state.fade.borrow_mut().retarget(1.0);
                    }
                })
            }
            TileState::Complete | TileState::Error => None,
        };

        Self {
            key: key.into(),
            tile,
            state,
            listener,
        }
    }
}

impl<P> TileNode<P> {
    /// Usage-cache key of this node.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tile displayed by this node.
    pub fn tile(&self) -> &Rc<Tile<P>> {
        &self.tile
    }

    /// Whether the node has content to draw.
    pub fn is_rendering(&self) -> bool {
        self.state.render.get()
    }

    /// Current opacity in `[0, 1]`.
    pub fn opacity(&self) -> f64 {
        self.state.fade.borrow().value()
    }

    /// Whether the node is still fading in.
    pub fn is_fading(&self) -> bool {
        self.is_rendering() && self.opacity() < 1.0
    }

    /// Complete, rendering, and fully faded in.
    pub fn is_opaque(&self) -> bool {
        self.is_rendering() && self.opacity() >= 1.0 && self.tile.is_complete()
    }

    /// Step the fade animation. Returns true while still animating.
    pub fn advance(&self, dt: Duration) -> bool {
        let mut fade = self.state.fade.borrow_mut();
        fade.advance(dt);
        !fade.is_settled()
    }
}

impl<P> Drop for TileNode<P> {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.tile.remove_listener(id);
        }
    }
}
