//! Ring manager
//!
//! [`Rings`] owns the host (master) context, the context registry and the
//! engine. [`Ring`] is a handle to one created context; the context lives as
//! long as some handle to it does.

use crate::context::{RingContext, RingId};
use crate::engine::{Engine, StdEngine};
use crate::error::{RemoteError, RingsError};
use crate::library;
use crate::options::RingsOptions;
use crate::registry::Registry;
use crate::remote::{self, CallOutcome};
use rings_engine::{State, TableRef, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Shared state of a manager; contexts reach it through a weak reference.
pub(crate) struct RingsInner {
    engine: Rc<dyn Engine>,
    options: RingsOptions,
    pub(crate) registry: RefCell<Registry>,
    master: Rc<RingContext>,
    host: Rc<State>,
    /// Chunk cache insertions since the last sweep
    inserts: Cell<usize>,
}

impl RingsInner {
    pub(crate) fn engine(&self) -> &dyn Engine {
        &*self.engine
    }

    pub(crate) fn options(&self) -> &RingsOptions {
        &self.options
    }

    /// Count a chunk cache insertion; sweeps once enough have piled up.
    pub(crate) fn note_insert(&self) {
        let inserts = self.inserts.get() + 1;
        if inserts >= self.options.cache_sweep_threshold {
            self.inserts.set(0);
            let evicted = self.sweep_caches();
            debug!(evicted, "chunk caches swept");
        } else {
            self.inserts.set(inserts);
        }
    }

    /// Sweep the chunk caches of every open context.
    pub(crate) fn sweep_caches(&self) -> usize {
        let mut contexts = self.registry.borrow().open_contexts();
        contexts.push(self.master.clone());

        let mut evicted = 0;
        for context in &contexts {
            let chunks = context.sweep_caches();
            evicted += chunks.len();
            drop(chunks);
        }
        evicted
    }

    /// Create a context on behalf of `creator`.
    ///
    /// Without `environment`, the creator's `_M` table is recorded if there
    /// is one, else its `_G`, else a fresh empty table.
    pub(crate) fn create(
        self: &Rc<Self>,
        creator: &Rc<RingContext>,
        environment: Option<TableRef>,
    ) -> Result<Ring, RingsError> {
        let creator_state = creator.open_state()?;
        let environment = match environment {
            Some(environment) => environment,
            None => default_environment(&creator_state),
        };

        let state = self.engine.open(&self.options.state_options())?;
        let context = Rc::new(RingContext::new(
            Rc::new(state),
            self.engine.clone(),
            Some(Rc::downgrade(creator)),
            Rc::downgrade(self),
        ));
        self.registry
            .borrow_mut()
            .insert(&context, Some(environment));

        library::install_remote(&context)?;
        if self.options.open_rings_in_children {
            library::open(&context)?;
        }

        debug!(ring = %context.id(), creator = %creator.id(), "ring created");
        Ok(Ring { context })
    }
}

fn default_environment(state: &State) -> TableRef {
    let globals = state.globals();
    for name in ["_M", "_G"] {
        if let Value::Table(table) = globals.get_str(name) {
            return table;
        }
    }
    state.new_table()
}

// ============================================================================
// Rings
// ============================================================================

/// Report of [`Rings::collect_garbage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Cached chunks evicted
    pub evicted_chunks: usize,
    /// Dead heap entries pruned across all open contexts
    pub pruned_objects: usize,
}

/// Manager of a host context and the rings created from it.
///
/// # Example
///
/// ```rust,ignore
/// use rings_core::Rings;
///
/// let rings = Rings::new()?;
/// let ring = rings.create(None)?;
/// let outcome = ring.dostring("return 1 + 1", Vec::new())?;
/// assert!(outcome.is_success());
/// ```
pub struct Rings {
    inner: Rc<RingsInner>,
}

impl Rings {
    /// Manager with default options and the standard engine.
    pub fn new() -> Result<Self, RingsError> {
        Self::with_options(RingsOptions::default())
    }

    pub fn with_options(options: RingsOptions) -> Result<Self, RingsError> {
        Self::with_engine(options, Rc::new(StdEngine))
    }

    /// Manager driving a custom engine.
    pub fn with_engine(options: RingsOptions, engine: Rc<dyn Engine>) -> Result<Self, RingsError> {
        options.validate()?;
        let host = Rc::new(engine.open(&options.state_options())?);

        let inner = Rc::new_cyclic(|weak: &Weak<RingsInner>| {
            let master = Rc::new(RingContext::new(
                host.clone(),
                engine.clone(),
                None,
                weak.clone(),
            ));
            RingsInner {
                engine,
                options,
                registry: RefCell::new(Registry::new()),
                master,
                host,
                inserts: Cell::new(0),
            }
        });

        library::open(&inner.master)?;
        debug!(ring = %inner.master.id(), "rings manager created");
        Ok(Self { inner })
    }

    pub fn options(&self) -> &RingsOptions {
        &self.inner.options
    }

    /// The host context's interpreter.
    pub fn host(&self) -> Rc<State> {
        self.inner.host.clone()
    }

    pub fn host_id(&self) -> RingId {
        self.inner.master.id()
    }

    /// Create a ring whose reverse calls run in the host context.
    ///
    /// `environment` must be a table of the host state; it scopes the code
    /// the ring sends back with `remotedostring`.
    pub fn create(&self, environment: Option<TableRef>) -> Result<Ring, RingsError> {
        self.inner.create(&self.inner.master, environment)
    }

    /// Run `source` in the host context under the traceback handler.
    pub fn run(&self, source: &str, chunk_name: &str, args: Vec<Value>) -> CallOutcome {
        let state = &self.inner.host;
        let chunk = match state.load(source, chunk_name) {
            Ok(chunk) => chunk,
            Err(err) => return CallOutcome::Failure(RemoteError::Compile(err.to_string())),
        };
        let handler = self.inner.engine.traceback_handler(state);
        match state.pcall(&chunk, args, handler) {
            Ok(values) => CallOutcome::Success(values),
            Err(err) => CallOutcome::Failure(RemoteError::Runtime(err.message())),
        }
    }

    /// [`run`](Self::run) with the source as its own chunk name.
    pub fn eval(&self, source: &str) -> CallOutcome {
        self.run(source, source, Vec::new())
    }

    /// Sweep chunk caches and prune heap tracking in every open context.
    pub fn collect_garbage(&self) -> GcReport {
        let evicted_chunks = self.inner.sweep_caches();
        self.inner.inserts.set(0);

        let mut contexts = self.inner.registry.borrow().open_contexts();
        contexts.push(self.inner.master.clone());
        let pruned_objects = contexts
            .iter()
            .filter_map(|context| context.open_state().ok())
            .map(|state| state.collect_garbage())
            .sum();

        debug!(evicted_chunks, pruned_objects, "rings garbage collected");
        GcReport {
            evicted_chunks,
            pruned_objects,
        }
    }

    /// Number of created rings that are still open.
    pub fn open_rings(&self) -> usize {
        self.inner.registry.borrow().len()
    }
}

impl fmt::Debug for Rings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rings")
            .field("host", &self.inner.master.id())
            .field("open_rings", &self.open_rings())
            .finish()
    }
}

// ============================================================================
// Ring
// ============================================================================

/// Handle to a created context.
///
/// Clones share the context. It is closed by [`Ring::close`] or once the
/// last handle (Rust or script) is dropped.
#[derive(Clone)]
pub struct Ring {
    pub(crate) context: Rc<RingContext>,
}

impl Ring {
    pub fn id(&self) -> RingId {
        self.context.id()
    }

    /// Run `source` in this ring with the host context as caller.
    ///
    /// `args` must be values of the host state; the results are host values.
    pub fn dostring(&self, source: &str, args: Vec<Value>) -> Result<CallOutcome, RingsError> {
        let rings = self.context.rings.upgrade().ok_or(RingsError::ManagerDropped)?;
        let master = rings.master.clone();
        remote::forward(&rings, &master, &self.context, source, args)
    }

    /// Run `source` in this ring on behalf of the context `caller`.
    pub(crate) fn dostring_from(
        &self,
        caller: &Rc<RingContext>,
        source: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome, RingsError> {
        let rings = self.context.rings.upgrade().ok_or(RingsError::ManagerDropped)?;
        remote::forward(&rings, caller, &self.context, source, args)
    }

    /// `true` on the first close, `false` afterwards.
    pub fn close(&self) -> Result<bool, RingsError> {
        self.context.close()
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// The ring's own interpreter.
    pub fn state(&self) -> Result<Rc<State>, RingsError> {
        self.context.open_state()
    }

    pub fn describe(&self) -> String {
        self.context.describe()
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.context.describe())
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ring").field(&self.context).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_call() {
        let rings = Rings::new().unwrap();
        let ring = rings.create(None).unwrap();
        let outcome = ring.dostring("return 1 + 1", Vec::new()).unwrap();
        assert_eq!(outcome.values(), &[Value::Number(2.0)]);
        assert_eq!(rings.open_rings(), 1);
    }

    #[test]
    fn test_default_environment_prefers_module_table() {
        let rings = Rings::new().unwrap();
        let host = rings.host();
        let module = host.new_table();
        module.set_str("answer", Value::Number(42.0));
        host.globals().set_str("_M", Value::Table(module));

        let ring = rings.create(None).unwrap();
        let outcome = ring
            .dostring("return remotedostring('return answer, print')", Vec::new())
            .unwrap();
        assert_eq!(
            outcome.values(),
            &[Value::Boolean(true), Value::Number(42.0), Value::Nil]
        );
    }

    #[test]
    fn test_drop_closes_ring() {
        let rings = Rings::new().unwrap();
        let ring = rings.create(None).unwrap();
        let state = ring.state().unwrap();
        drop(ring);
        assert!(state.is_closed());
        assert_eq!(rings.open_rings(), 0);
    }

    #[test]
    fn test_manager_dropped() {
        let rings = Rings::new().unwrap();
        let ring = rings.create(None).unwrap();
        drop(rings);
        let err = ring.dostring("return 1", Vec::new()).unwrap_err();
        assert!(matches!(err, RingsError::ManagerDropped));
        assert!(!ring.is_closed());
        assert!(ring.close().unwrap());
    }

    #[test]
    fn test_run_reports_compile_and_runtime_errors() {
        let rings = Rings::new().unwrap();
        assert!(matches!(
            rings.eval("return +").error(),
            Some(RemoteError::Compile(_))
        ));
        let outcome = rings.run("error('bad')", "=script", Vec::new());
        let message = outcome.error().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.starts_with("script:1: bad"), "{}", message);
    }
}
