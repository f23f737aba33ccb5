//! Execution contexts
//!
//! A [`RingContext`] owns one interpreter instance plus the caches used
//! when code is submitted to it. It is either open or closed; once closed
//! every operation except `close` and `describe` fails with
//! [`RingsError::Closed`].

use crate::chunk_cache::ChunkCache;
use crate::engine::Engine;
use crate::error::RingsError;
use crate::lifecycle::RingsInner;
use rings_engine::{State, Value};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Unique identifier for a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingId(u64);

impl RingId {
    /// Create a new unique ring ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RingId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring#{}", self.0)
    }
}

/// Open or closed; the interpreter only exists while open.
pub(crate) enum ContextState {
    Open(Rc<State>),
    Closed,
}

/// One isolated interpreter instance and its caches.
pub struct RingContext {
    id: RingId,
    engine: Rc<dyn Engine>,
    state: RefCell<ContextState>,

    /// Chunks submitted by whoever calls into this context
    pub(crate) chunks: RefCell<ChunkCache>,

    /// Chunks each child submitted back through `remotedostring`
    pub(crate) submitted: RefCell<FxHashMap<RingId, ChunkCache>>,

    /// Calls into this context currently on the stack
    active_calls: Cell<usize>,

    creator: Option<Weak<RingContext>>,
    pub(crate) rings: Weak<RingsInner>,
}

impl RingContext {
    pub(crate) fn new(
        state: Rc<State>,
        engine: Rc<dyn Engine>,
        creator: Option<Weak<RingContext>>,
        rings: Weak<RingsInner>,
    ) -> Self {
        Self {
            id: RingId::new(),
            engine,
            state: RefCell::new(ContextState::Open(state)),
            chunks: RefCell::new(ChunkCache::new()),
            submitted: RefCell::new(FxHashMap::default()),
            active_calls: Cell::new(0),
            creator,
            rings,
        }
    }

    pub fn id(&self) -> RingId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), ContextState::Closed)
    }

    /// The interpreter, or `Closed` after close.
    pub fn open_state(&self) -> Result<Rc<State>, RingsError> {
        match &*self.state.borrow() {
            ContextState::Open(state) => Ok(state.clone()),
            ContextState::Closed => Err(RingsError::Closed(self.id)),
        }
    }

    pub(crate) fn creator(&self) -> Option<Rc<RingContext>> {
        self.creator.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn is_created_by(&self, context: &RingContext) -> bool {
        self.creator
            .as_ref()
            .map_or(false, |creator| std::ptr::eq(creator.as_ptr(), context))
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.get()
    }

    pub(crate) fn enter(&self) {
        self.active_calls.set(self.active_calls.get() + 1);
    }

    pub(crate) fn leave(&self) {
        self.active_calls.set(self.active_calls.get().saturating_sub(1));
    }

    /// Identity string; works on closed contexts too.
    pub fn describe(&self) -> String {
        let address = self as *const RingContext as usize;
        if self.is_closed() {
            format!("{} ({:#x}, closed)", self.id, address)
        } else {
            format!("{} ({:#x})", self.id, address)
        }
    }

    /// Sweep every chunk cache of this context; returns evicted chunks.
    pub(crate) fn sweep_caches(&self) -> Vec<Value> {
        let mut evicted = self.chunks.borrow_mut().sweep();
        for cache in self.submitted.borrow_mut().values_mut() {
            evicted.extend(cache.sweep());
        }
        evicted
    }

    /// Close the context.
    ///
    /// # Returns
    /// * `Ok(true)` - The context was open and is now closed
    /// * `Ok(false)` - It was already closed
    /// * `Err(RingsError::Busy)` - A call into it is still running
    pub fn close(&self) -> Result<bool, RingsError> {
        if self.is_closed() {
            return Ok(false);
        }
        if self.active_calls.get() > 0 {
            warn!(ring = %self.id, calls = self.active_calls.get(), "refusing to close a busy ring");
            return Err(RingsError::Busy(self.id));
        }
        Ok(self.release())
    }

    /// Tear down without the busy check.
    fn release(&self) -> bool {
        let state = match self.state.replace(ContextState::Closed) {
            ContextState::Open(state) => state,
            ContextState::Closed => return false,
        };

        if let Some(rings) = self.rings.upgrade() {
            let removed = rings.registry.borrow_mut().remove(self.id);
            drop(removed);
        }
        if let Some(creator) = self.creator() {
            let cache = creator.submitted.borrow_mut().remove(&self.id);
            drop(cache);
        }
        let chunks = self.chunks.take();
        drop(chunks);
        let submitted = self.submitted.take();
        drop(submitted);

        // Handles owned by this state close their rings from here
        self.engine.close(&state);
        drop(state);

        debug!(ring = %self.id, "ring closed");
        true
    }
}

impl Drop for RingContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingContext")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("active_calls", &self.active_calls.get())
            .finish()
    }
}
