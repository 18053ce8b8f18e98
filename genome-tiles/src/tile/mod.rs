//! Tiles: independently fetchable units of cached data.
//!
//! A [`Tile`] covers the half-open interval `[x, x + span)` of one contig at
//! one LOD level. It is created in [`TileState::Loading`] with its fetch
//! already in flight and moves exactly once to [`TileState::Complete`] or
//! [`TileState::Error`]; terminal states never revert.
//!
//! # Completion listeners
//!
//! Display code subscribes with [`Tile::on_complete`]. A listener registered
//! on a tile that is already complete runs immediately, in the caller's
//! context. Otherwise it runs once, on the transition to `Complete`, and is
//! then dropped. Listeners on a tile that fails are discarded without being
//! called.

pub mod error;

pub use error::FetchError;

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::sync::Arc;

/// Address of a tile within one store: LOD level plus tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// LOD level (0 is finest).
    pub level: u32,
    /// Tile index at that level; the tile starts at `index * span`.
    pub index: u64,
}

impl TileKey {
    /// Create a tile key.
    pub fn new(level: u32, index: u64) -> Self {
        Self { level, index }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}:{}", self.level, self.index)
    }
}

/// Loading state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Fetch in flight.
    Loading,
    /// Payload available.
    Complete,
    /// Fetch failed; the tile will never complete.
    Error,
}

impl TileState {
    /// Returns true for `Complete` and `Error`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Handle for detaching a completion listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type CompleteListener<P> = Box<dyn FnOnce(&Tile<P>)>;

/// A single tile of payload data.
pub struct Tile<P> {
    contig: String,
    key: TileKey,
    x: u64,
    span: u64,
    cache_key: String,
    state: Cell<TileState>,
    payload: OnceCell<Arc<P>>,
    error: OnceCell<FetchError>,
    listeners: RefCell<Vec<(ListenerId, CompleteListener<P>)>>,
    next_listener: Cell<u64>,
}

impl<P> Tile<P> {
    /// Create a tile in the `Loading` state.
    ///
    /// Only the owning store creates tiles, together with their fetch.
    pub(crate) fn new(contig: impl Into<String>, key: TileKey, span: u64) -> Self {
        let x = key.index.saturating_mul(span);
        Self {
            contig: contig.into(),
            key,
            x,
            span,
            cache_key: format!("{}:{}", x, span),
            state: Cell::new(TileState::Loading),
            payload: OnceCell::new(),
            error: OnceCell::new(),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    /// Contig this tile belongs to.
    pub fn contig(&self) -> &str {
        &self.contig
    }

    /// Level and index of this tile.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// LOD level.
    pub fn level(&self) -> u32 {
        self.key.level
    }

    /// Tile index at its level.
    pub fn index(&self) -> u64 {
        self.key.index
    }

    /// First base pair covered.
    pub fn x(&self) -> u64 {
        self.x
    }

    /// Number of base pairs covered.
    pub fn span(&self) -> u64 {
        self.span
    }

    /// One past the last base pair covered.
    pub fn end(&self) -> u64 {
        self.x.saturating_add(self.span)
    }

    /// Midpoint of the tile, used to look up fallbacks for a gap.
    pub fn center(&self) -> f64 {
        self.x as f64 + self.span as f64 * 0.5
    }

    /// Whether `position` falls inside `[x, x + span)`.
    pub fn covers(&self, position: f64) -> bool {
        position >= self.x as f64 && position < self.end() as f64
    }

    /// Key derived from `(x, span)`, unique within a contig.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Current state.
    pub fn state(&self) -> TileState {
        self.state.get()
    }

    /// Returns true once the payload is available.
    pub fn is_complete(&self) -> bool {
        self.state.get() == TileState::Complete
    }

    /// Payload, present only when `Complete`.
    pub fn payload(&self) -> Option<&Arc<P>> {
        self.payload.get()
    }

    /// Fetch error, present only when `Error`.
    pub fn error(&self) -> Option<&FetchError> {
        self.error.get()
    }

    /// Number of listeners still waiting for completion.
    pub fn pending_listeners(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Subscribe to completion.
    ///
    /// Runs `listener` immediately if the tile is already complete and
    /// returns `None`. Otherwise the listener is queued and a handle is
    /// returned for [`Tile::remove_listener`].
    pub fn on_complete<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: FnOnce(&Tile<P>) + 'static,
    {
        match self.state.get() {
            TileState::Complete => {
                listener(self);
                None
            }
            TileState::Error => None,
            TileState::Loading => {
                let id = ListenerId(self.next_listener.get());
                self.next_listener.set(id.0 + 1);
                self.listeners.borrow_mut().push((id, Box::new(listener)));
                Some(id)
            }
        }
    }

    /// Detach a queued listener. Returns false if it already ran or was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Transition `Loading -> Complete` and notify listeners.
    ///
    /// Returns false, leaving the tile untouched, if it is already terminal.
    pub(crate) fn complete(&self, payload: Arc<P>) -> bool {
        if self.state.get().is_terminal() {
            return false;
        }
        if self.payload.set(payload).is_err() {
            return false;
        }
        self.state.set(TileState::Complete);

        // Listeners may subscribe again or touch the tile; release the borrow first.
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for (_, listener) in listeners {
            listener(self);
        }
        true
    }

    /// Transition `Loading -> Error`, dropping pending listeners.
    ///
    /// Returns false, leaving the tile untouched, if it is already terminal.
    pub(crate) fn fail(&self, error: FetchError) -> bool {
        if self.state.get().is_terminal() {
            return false;
        }
        if self.error.set(error).is_err() {
            return false;
        }
        self.state.set(TileState::Error);
        self.listeners.borrow_mut().clear();
        true
    }
}

impl<P> fmt::Debug for Tile<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("contig", &self.contig)
            .field("key", &self.key)
            .field("x", &self.x)
            .field("span", &self.span)
            .field("state", &self.state.get())
            .field("pending_listeners", &self.pending_listeners())
            .finish()
    }
}
