//! Remote execution protocol
//!
//! One remote call runs source text in a destination context on behalf of
//! a source context:
//! 1. compile the text in the destination, or reuse the cached chunk
//! 2. copy the arguments from the source stack to the destination stack
//! 3. call the chunk in protected mode with the traceback handler
//! 4. copy the results back
//!
//! Any failure along the way becomes a [`CallOutcome::Failure`] carrying a
//! single message, and both stacks are back at their starting depth
//! afterwards.
//!
//! Forward calls go from a context into one it created. Reverse calls go
//! from a child back to whichever context most recently called into it.

use crate::chunk_cache::ChunkCache;
use crate::context::RingContext;
use crate::engine::Engine;
use crate::error::{RemoteError, RingsError};
use crate::lifecycle::RingsInner;
use crate::marshal::{copy_values, Direction, MarshalError};
use rings_engine::{State, TableRef, Value};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Result of a remote call as the caller sees it.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// The chunk ran; its results, copied into the caller
    Success(Vec<Value>),
    /// Compilation, marshalling or execution failed
    Failure(RemoteError),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Results of a successful call (empty on failure)
    pub fn values(&self) -> &[Value] {
        match self {
            CallOutcome::Success(values) => values,
            CallOutcome::Failure(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            CallOutcome::Success(_) => None,
            CallOutcome::Failure(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<Vec<Value>, RemoteError> {
        self.into()
    }

    /// `true, ...results` or `false, message`, as `dostring` returns them.
    pub fn into_script_values(self) -> Vec<Value> {
        match self {
            CallOutcome::Success(values) => {
                let mut out = Vec::with_capacity(values.len() + 1);
                out.push(Value::Boolean(true));
                out.extend(values);
                out
            }
            CallOutcome::Failure(err) => vec![Value::Boolean(false), Value::string(err.to_string())],
        }
    }
}

impl From<Result<Vec<Value>, RemoteError>> for CallOutcome {
    fn from(result: Result<Vec<Value>, RemoteError>) -> Self {
        match result {
            Ok(values) => CallOutcome::Success(values),
            Err(err) => CallOutcome::Failure(err),
        }
    }
}

impl From<CallOutcome> for Result<Vec<Value>, RemoteError> {
    fn from(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Success(values) => Ok(values),
            CallOutcome::Failure(err) => Err(err),
        }
    }
}

// ============================================================================
// Protocol steps
// ============================================================================

/// Fetch the chunk for `source` from `cache`, compiling it on a miss.
///
/// Returns the chunk and whether it was newly inserted.
pub(crate) fn fetch_chunk(
    engine: &dyn Engine,
    state: &State,
    cache: &mut ChunkCache,
    source: &str,
    environment: Option<TableRef>,
) -> Result<(Value, bool), RemoteError> {
    if let Some(chunk) = cache.get(source) {
        return Ok((chunk, false));
    }

    let chunk = engine.compile(state, source).map_err(RemoteError::Compile)?;
    if let Some(environment) = environment {
        engine.set_environment(state, &chunk, environment);
    }
    cache.insert(source, chunk.clone());
    Ok((chunk, true))
}

/// Run `chunk` in `dst` with `args` taken from `src`.
///
/// `args` belong to `src`; the results returned belong to `src` as well.
pub(crate) fn execute(
    engine: &dyn Engine,
    dst: &State,
    src: &State,
    chunk: Value,
    args: Vec<Value>,
    function: &'static str,
    max_depth: usize,
) -> Result<Vec<Value>, RemoteError> {
    let src_base = src.stack_depth();
    let dst_base = dst.stack_depth();

    let count = args.len();
    src.ensure_stack(count)
        .map_err(|_| MarshalError::StackOverflow(count))?;
    for arg in args {
        if src.push(arg).is_err() {
            src.truncate_stack(src_base);
            return Err(MarshalError::StackOverflow(count).into());
        }
    }

    let handler = engine.traceback_handler(dst);

    if dst.push(chunk).is_err() {
        src.truncate_stack(src_base);
        return Err(MarshalError::StackOverflow(count + 1).into());
    }
    let copied = copy_values(
        dst,
        src,
        src_base..src_base + count,
        Direction::Arguments { function },
        max_depth,
    );
    src.truncate_stack(src_base);
    if let Err(err) = copied {
        dst.truncate_stack(dst_base);
        return Err(err.into());
    }

    let results = match engine.pcall(dst, dst_base, handler) {
        Ok(results) => results,
        Err(err) => {
            dst.truncate_stack(dst_base);
            return Err(RemoteError::Runtime(err.message()));
        }
    };

    let copied = copy_values(
        src,
        dst,
        dst_base..dst_base + results,
        Direction::Results,
        max_depth,
    );
    dst.truncate_stack(dst_base);
    copied?;
    Ok(src.drain_stack(src_base))
}

// ============================================================================
// Forward and reverse calls
// ============================================================================

/// Bookkeeping for one call in flight: marks the contexts busy and puts the
/// callee's caller registration back when the call ends.
struct CallGuard<'a> {
    rings: &'a RingsInner,
    contexts: Vec<&'a RingContext>,
    restore: Option<(&'a RingContext, Option<Weak<RingContext>>)>,
}

impl<'a> CallGuard<'a> {
    fn new(rings: &'a RingsInner) -> Self {
        Self {
            rings,
            contexts: Vec::new(),
            restore: None,
        }
    }

    fn enter(&mut self, context: &'a RingContext) {
        context.enter();
        self.contexts.push(context);
    }

    fn register_caller(&mut self, callee: &'a RingContext, caller: &Rc<RingContext>) {
        let previous = self
            .rings
            .registry
            .borrow_mut()
            .set_caller(callee.id(), Rc::downgrade(caller));
        self.restore = Some((callee, previous));
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some((callee, previous)) = self.restore.take() {
            // Only restore if the callee is still registered
            let mut registry = self.rings.registry.borrow_mut();
            if registry.contains(callee.id()) {
                registry.restore_caller(callee.id(), previous);
            }
        }
        for context in self.contexts.drain(..) {
            context.leave();
        }
    }
}

/// Run `source` in `callee` on behalf of `caller`.
pub(crate) fn forward(
    rings: &RingsInner,
    caller: &Rc<RingContext>,
    callee: &Rc<RingContext>,
    source: &str,
    args: Vec<Value>,
) -> Result<CallOutcome, RingsError> {
    let caller_state = caller.open_state()?;
    let callee_state = callee.open_state()?;

    let fetched = {
        let mut cache = callee.chunks.borrow_mut();
        fetch_chunk(rings.engine(), &callee_state, &mut cache, source, None)
    };
    let chunk = match fetched {
        Ok((chunk, inserted)) => {
            if inserted {
                rings.note_insert();
            }
            chunk
        }
        Err(err) => return Ok(failed(callee, "dostring", err)),
    };

    let mut guard = CallGuard::new(rings);
    guard.register_caller(callee, caller);
    guard.enter(callee);

    let result = execute(
        rings.engine(),
        &callee_state,
        &caller_state,
        chunk,
        args,
        "dostring",
        rings.options().max_copy_depth,
    );
    drop(guard);

    Ok(finish(callee, "dostring", result))
}

/// Run `source` in the nearest active caller of `child`.
///
/// Code sent to the creator is compiled against the environment the child
/// was created under, using a cache kept for that child. Any other caller
/// runs it against its own globals.
pub(crate) fn reverse(
    rings: &RingsInner,
    child: &Rc<RingContext>,
    source: &str,
    args: Vec<Value>,
) -> Result<CallOutcome, RingsError> {
    let child_state = child.open_state()?;
    let caller = rings
        .registry
        .borrow()
        .caller(child.id())
        .ok_or(RingsError::NoCaller(child.id()))?;
    let caller_state = caller.open_state()?;

    let fetched = if child.is_created_by(&caller) {
        let environment = rings.registry.borrow().environment(child.id());
        let mut submitted = caller.submitted.borrow_mut();
        let cache = submitted.entry(child.id()).or_default();
        fetch_chunk(rings.engine(), &caller_state, cache, source, environment)
    } else {
        let mut cache = caller.chunks.borrow_mut();
        fetch_chunk(rings.engine(), &caller_state, &mut cache, source, None)
    };
    let chunk = match fetched {
        Ok((chunk, inserted)) => {
            if inserted {
                rings.note_insert();
            }
            chunk
        }
        Err(err) => return Ok(failed(&caller, "remotedostring", err)),
    };

    let mut guard = CallGuard::new(rings);
    guard.enter(&caller);

    let result = execute(
        rings.engine(),
        &caller_state,
        &child_state,
        chunk,
        args,
        "remotedostring",
        rings.options().max_copy_depth,
    );
    drop(guard);

    Ok(finish(&caller, "remotedostring", result))
}

fn failed(target: &RingContext, function: &'static str, err: RemoteError) -> CallOutcome {
    finish(target, function, Err(err))
}

fn finish(
    target: &RingContext,
    function: &'static str,
    result: Result<Vec<Value>, RemoteError>,
) -> CallOutcome {
    match &result {
        Ok(values) => debug!(ring = %target.id(), function, results = values.len(), "remote call succeeded"),
        Err(err) => debug!(ring = %target.id(), function, error = %err, "remote call failed"),
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StdEngine;
    use rings_engine::StateOptions;

    fn open() -> State {
        StdEngine.open(&StateOptions::default()).unwrap()
    }

    fn run(dst: &State, src: &State, source: &str, args: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
        let mut cache = ChunkCache::new();
        let (chunk, _) = fetch_chunk(&StdEngine, dst, &mut cache, source, None)?;
        execute(&StdEngine, dst, src, chunk, args, "dostring", 30)
    }

    #[test]
    fn test_execute_returns_results() {
        let (dst, src) = (open(), open());
        let values = run(&dst, &src, "return 1 + 1, ...", vec![Value::from("x")]).unwrap();
        assert_eq!(values, vec![Value::Number(2.0), Value::from("x")]);
        assert_eq!(dst.stack_depth(), 0);
        assert_eq!(src.stack_depth(), 0);
    }

    #[test]
    fn test_compile_failure() {
        let (dst, src) = (open(), open());
        let err = run(&dst, &src, "return = 1", Vec::new()).unwrap_err();
        assert!(matches!(err, RemoteError::Compile(_)));
    }

    #[test]
    fn test_runtime_failure_cleans_stacks() {
        let (dst, src) = (open(), open());
        let err = run(&dst, &src, "local a = ...; error('boom: ' .. a)", vec![Value::from("x")])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("boom: x"), "{}", message);
        assert!(message.contains("stack traceback:"), "{}", message);
        assert_eq!(dst.stack_depth(), 0);
        assert_eq!(src.stack_depth(), 0);
    }

    #[test]
    fn test_bad_argument_never_runs_chunk() {
        let (dst, src) = (open(), open());
        let print = src.globals().get_str("print");
        let err = run(&dst, &src, "ran = true", vec![Value::Nil, print]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad argument #2 to 'dostring' (function/userdata/thread types unsupported)"
        );
        assert_eq!(dst.globals().get_str("ran"), Value::Nil);
        assert_eq!((dst.stack_depth(), src.stack_depth()), (0, 0));
    }

    #[test]
    fn test_environment_bound_on_compile() {
        let state = open();
        let env = state.new_table();
        env.set_str("x", Value::Number(7.0));
        let mut cache = ChunkCache::new();
        let (chunk, inserted) =
            fetch_chunk(&StdEngine, &state, &mut cache, "return x, print", Some(env)).unwrap();
        assert!(inserted);
        let values = state.pcall(&chunk, Vec::new(), None).unwrap();
        assert_eq!(values, vec![Value::Number(7.0), Value::Nil]);

        let (_, inserted) = fetch_chunk(&StdEngine, &state, &mut cache, "return x, print", None).unwrap();
        assert!(!inserted);
    }

    #[test]
    fn test_outcome_script_values() {
        let ok = CallOutcome::Success(vec![Value::Number(1.0)]);
        assert!(ok.is_success());
        assert_eq!(ok.into_script_values(), vec![Value::Boolean(true), Value::Number(1.0)]);

        let failed = CallOutcome::Failure(RemoteError::Runtime("boom".into()));
        assert_eq!(failed.error().map(|e| e.to_string()), Some("boom".to_string()));
        assert_eq!(
            failed.into_script_values(),
            vec![Value::Boolean(false), Value::from("boom")]
        );
    }
}
