//! Interpreter state
//!
//! A [`State`] is one isolated interpreter instance: its own globals,
//! registry, evaluation stack, heap registry and call frames. Nothing in a
//! state refers to another state, so two states only ever exchange values
//! through a host that copies them.
//!
//! All methods take `&self`. Interior mutability is scoped so that no
//! borrow is held while script code or a native function runs, which lets
//! natives call back into the same state (and into other states that call
//! back into this one) freely.

mod call;
mod eval;
mod exec;
mod meta;
pub mod scope;

use crate::parser::{chunk_id, parse, ParseError};
use crate::vm::error::ScriptError;
use crate::vm::gc::{Heap, HeapStats};
use crate::vm::object::{Closure, Function, NativeFunction, Userdata};
use crate::vm::stack::{Stack, StackError, DEFAULT_MAX_STACK_SIZE};
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use scope::Scope;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Default maximum nesting of function calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Calls a message handler may make beyond `max_call_depth`
const HANDLER_EXTRA_CALLS: usize = 10;

/// Unique identifier for a State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    /// Create a new unique state ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        StateId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

/// Limits for a State
#[derive(Debug, Clone)]
pub struct StateOptions {
    /// Maximum nesting of function calls before "stack overflow"
    pub max_call_depth: usize,

    /// Maximum number of values on the evaluation stack
    pub max_stack_slots: usize,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_slots: DEFAULT_MAX_STACK_SIZE,
        }
    }
}

/// Activation record used for error positions and tracebacks.
pub(crate) struct CallInfo {
    function: Rc<Function>,
    line: Cell<u32>,
}

impl CallInfo {
    fn describe(&self) -> String {
        match &*self.function {
            Function::Native(native) => format!("[C]: in function '{}'", native.name),
            Function::Script(closure) => {
                let line = self.line.get();
                match (&closure.body.name, closure.body.line) {
                    (_, 0) => format!("{}:{}: in main chunk", closure.chunk, line),
                    (Some(name), _) => {
                        format!("{}:{}: in function '{}'", closure.chunk, line, name)
                    }
                    (None, defined) => format!(
                        "{}:{}: in function <{}:{}>",
                        closure.chunk, line, closure.chunk, defined
                    ),
                }
            }
        }
    }
}

/// One interpreter instance.
pub struct State {
    id: StateId,
    options: StateOptions,
    globals: TableRef,
    registry: TableRef,
    string_metatable: RefCell<Option<TableRef>>,
    stack: RefCell<Stack>,
    heap: RefCell<Heap>,
    frames: RefCell<Vec<CallInfo>>,
    /// Message handlers of the active protected calls (innermost last)
    handlers: RefCell<Vec<Option<Value>>>,
    /// Message handlers currently running
    handling: Cell<usize>,
    closed: Cell<bool>,
}

impl State {
    /// Create a bare state with no libraries loaded.
    pub fn new(options: StateOptions) -> Self {
        let mut heap = Heap::new();
        let globals = TableRef::new();
        heap.track_table(&globals);
        let registry = TableRef::new();
        heap.track_table(&registry);

        let id = StateId::new();
        trace!(state = id.as_u64(), "state created");

        Self {
            id,
            stack: RefCell::new(Stack::with_capacity(options.max_stack_slots)),
            options,
            globals,
            registry,
            string_metatable: RefCell::new(None),
            heap: RefCell::new(heap),
            frames: RefCell::new(Vec::new()),
            handlers: RefCell::new(Vec::new()),
            handling: Cell::new(0),
            closed: Cell::new(false),
        }
    }

    /// Load the baseline standard library.
    pub fn open_libs(&self) {
        crate::vm::stdlib::open_all(self);
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn options(&self) -> &StateOptions {
        &self.options
    }

    /// The global table
    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    /// Host-private table, never reachable from scripts.
    pub fn registry(&self) -> TableRef {
        self.registry.clone()
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate a table owned by this state.
    pub fn new_table(&self) -> TableRef {
        let table = TableRef::new();
        self.heap.borrow_mut().track_table(&table);
        table
    }

    pub(crate) fn new_scope(&self, parent: Option<Rc<Scope>>) -> Rc<Scope> {
        let scope = Rc::new(Scope::new(parent));
        self.heap.borrow_mut().track_scope(&scope);
        scope
    }

    /// Wrap a host function as a script value.
    pub fn create_function(
        &self,
        name: &'static str,
        func: impl Fn(&State, Vec<Value>) -> Result<Vec<Value>, ScriptError> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Function::Native(NativeFunction {
            name,
            func: Box::new(func),
        })))
    }

    /// Wrap a host resource as a script value.
    pub fn create_userdata<T: Any>(&self, payload: T, metatable: Option<TableRef>) -> Value {
        Value::Userdata(Rc::new(Userdata::new(payload, metatable)))
    }

    pub(crate) fn string_metatable(&self) -> Option<TableRef> {
        self.string_metatable.borrow().clone()
    }

    pub(crate) fn set_string_metatable(&self, metatable: TableRef) {
        let previous = self.string_metatable.replace(Some(metatable));
        drop(previous);
    }

    // ========================================================================
    // Compilation and environments
    // ========================================================================

    /// Compile `source` into a function whose free names resolve in the
    /// global table. `name` follows the chunk naming rules of [`chunk_id`].
    pub fn load(&self, source: &str, name: &str) -> Result<Value, ParseError> {
        let chunk = parse(source, Rc::from(chunk_id(name)))?;
        let closure = Closure {
            body: chunk.body,
            chunk: chunk.name,
            scope: self.new_scope(None),
            env: RefCell::new(self.globals.clone()),
        };
        Ok(Value::Function(Rc::new(Function::Script(closure))))
    }

    /// Replace the environment of a script function; false for natives.
    pub fn set_environment(&self, function: &Value, env: TableRef) -> bool {
        match function {
            Value::Function(f) => match &**f {
                Function::Script(closure) => {
                    closure.set_env(env);
                    true
                }
                Function::Native(_) => false,
            },
            _ => false,
        }
    }

    pub fn environment(&self, function: &Value) -> Option<TableRef> {
        match function {
            Value::Function(f) => match &**f {
                Function::Script(closure) => Some(closure.env()),
                Function::Native(_) => Some(self.globals()),
            },
            _ => None,
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call without a protected boundary; errors propagate to the caller.
    pub fn call(&self, function: &Value, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
        self.call_value(function, args)
    }

    /// Protected call. When it fails, `handler` (if any) is called with the
    /// error value while the failing frames are still active, and its
    /// result becomes the error value.
    pub fn pcall(
        &self,
        function: &Value,
        args: Vec<Value>,
        handler: Option<Value>,
    ) -> Result<Vec<Value>, ScriptError> {
        let depth = self.frames.borrow().len();
        self.handlers.borrow_mut().push(handler);

        let result = match self.call_value(function, args) {
            Err(error) if !error.is_handled() => Err(self.handle_error(error)),
            other => other,
        };

        self.handlers.borrow_mut().pop();
        let leftover = self.frames.borrow_mut().split_off(depth);
        drop(leftover);
        result
    }

    /// Protected call on the evaluation stack.
    ///
    /// The function sits at `base` with its arguments above it. On success
    /// they are replaced by the results and the result count is returned;
    /// on failure the stack is left at `base`.
    pub fn pcall_stack(&self, base: usize, handler: Option<Value>) -> Result<usize, ScriptError> {
        let mut values = self.drain_stack(base).into_iter();
        let function = values.next().unwrap_or_default();
        let args: Vec<Value> = values.collect();

        let results = self.pcall(&function, args, handler)?;
        let count = results.len();
        let mut stack = self.stack.borrow_mut();
        if stack.ensure(count).is_err() {
            drop(stack);
            return Err(ScriptError::handled(Value::from("stack overflow")));
        }
        for value in results {
            // capacity checked above
            let _ = stack.push(value);
        }
        Ok(count)
    }

    /// Load and run `source` in protected mode, returning its results.
    pub fn exec(&self, source: &str) -> Result<Vec<Value>, ScriptError> {
        let function = self
            .load(source, source)
            .map_err(|err| ScriptError::handled(Value::string(err.to_string())))?;
        self.pcall(&function, Vec::new(), None)
    }

    // ========================================================================
    // Errors and tracebacks
    // ========================================================================

    /// Runtime error with the position of the innermost script frame.
    pub fn error(&self, message: impl AsRef<str>) -> ScriptError {
        self.error_at_level(message, 1)
    }

    /// Runtime error positioned at the `level`-th script frame (0 = none).
    pub fn error_at_level(&self, message: impl AsRef<str>, level: usize) -> ScriptError {
        let text = format!("{}{}", self.where_(level), message.as_ref());
        ScriptError::new(Value::String(Rc::from(text)))
    }

    /// `chunk:line: ` of the `level`-th script frame from the top.
    pub fn where_(&self, level: usize) -> String {
        if level == 0 {
            return String::new();
        }
        let frames = self.frames.borrow();
        frames
            .iter()
            .rev()
            .filter_map(|info| match &*info.function {
                Function::Script(closure) => Some((closure.chunk.clone(), info.line.get())),
                Function::Native(_) => None,
            })
            .nth(level - 1)
            .map(|(chunk, line)| format!("{}:{}: ", chunk, line))
            .unwrap_or_default()
    }

    /// Describe the active frames, skipping the innermost `level`.
    pub fn traceback(&self, message: Option<&str>, level: usize) -> String {
        let mut out = String::new();
        if let Some(message) = message {
            out.push_str(message);
            out.push('\n');
        }
        out.push_str("stack traceback:");
        for info in self.frames.borrow().iter().rev().skip(level) {
            out.push_str("\n\t");
            out.push_str(&info.describe());
        }
        out
    }

    /// Deepest call nesting allowed right now. A running message handler
    /// gets a few extra calls so a "stack overflow" can still be reported.
    pub(crate) fn call_limit(&self) -> usize {
        if self.handling.get() > 0 {
            self.options.max_call_depth + HANDLER_EXTRA_CALLS
        } else {
            self.options.max_call_depth
        }
    }

    /// Run the active message handler on a fresh error.
    pub(crate) fn handle_error(&self, error: ScriptError) -> ScriptError {
        let handler = self.handlers.borrow().last().cloned().flatten();
        let Some(handler) = handler else {
            return ScriptError::handled(error.into_value());
        };

        self.handlers.borrow_mut().push(None);
        self.handling.set(self.handling.get() + 1);
        let result = self.call_value(&handler, vec![error.into_value()]);
        self.handling.set(self.handling.get() - 1);
        self.handlers.borrow_mut().pop();

        match result {
            Ok(values) => ScriptError::handled(values.into_iter().next().unwrap_or_default()),
            Err(_) => ScriptError::handled(Value::from("error in error handling")),
        }
    }

    /// Function running `level` frames below the innermost one.
    pub(crate) fn function_at_level(&self, level: usize) -> Option<Rc<Function>> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .nth(level)
            .map(|info| info.function.clone())
    }

    pub(crate) fn set_line(&self, line: u32) {
        if let Some(info) = self.frames.borrow().last() {
            info.line.set(line);
        }
    }

    // ========================================================================
    // Evaluation stack
    // ========================================================================

    pub fn push(&self, value: Value) -> Result<(), StackError> {
        self.stack.borrow_mut().push(value)
    }

    pub fn pop(&self) -> Result<Value, StackError> {
        self.stack.borrow_mut().pop()
    }

    /// Check that `extra` more values fit on the stack.
    pub fn ensure_stack(&self, extra: usize) -> Result<(), StackError> {
        self.stack.borrow().ensure(extra)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.borrow().depth()
    }

    pub fn stack_slice(&self, range: Range<usize>) -> Result<Vec<Value>, StackError> {
        self.stack.borrow().slice(range)
    }

    /// Remove and return everything from `base` up.
    pub fn drain_stack(&self, base: usize) -> Vec<Value> {
        self.stack.borrow_mut().drain_from(base)
    }

    /// Drop everything above `depth`.
    pub fn truncate_stack(&self, depth: usize) {
        let removed = self.stack.borrow_mut().truncate(depth);
        drop(removed);
    }

    // ========================================================================
    // Memory
    // ========================================================================

    /// Prune the heap registry; returns the number of entries removed.
    pub fn collect_garbage(&self) -> usize {
        self.heap.borrow_mut().prune()
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.borrow().stats()
    }

    pub fn live_tables(&self) -> usize {
        self.heap.borrow().live_tables()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Release every object this state still owns.
    ///
    /// Idempotent. The state must not be used for evaluation afterwards.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        trace!(state = self.id.as_u64(), "state closed");

        let stack = self.drain_stack(0);
        drop(stack);
        let handlers = std::mem::take(&mut *self.handlers.borrow_mut());
        drop(handlers);
        let string_metatable = self.string_metatable.take();
        drop(string_metatable);

        let live = self.heap.borrow_mut().drain();
        live.release();
    }
}

impl Drop for State {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("closed", &self.closed.get())
            .finish()
    }
}
