//! Interpreter engine seam
//!
//! Everything the ring machinery needs from an interpreter goes through the
//! [`Engine`] trait, so tests can wrap the standard engine (to count
//! compilations, for instance) without touching the protocol code.

use rings_engine::{EngineError, ScriptError, State, StateOptions, TableRef, Value};
use tracing::trace;

/// Registry key of the message handler used for remote calls
pub const TRACEBACK_KEY: &str = "rings_traceback";

/// Interpreter operations used by rings.
pub trait Engine {
    /// Create an instance with the baseline libraries loaded.
    fn open(&self, options: &StateOptions) -> Result<State, EngineError>;

    /// Compile `source`; the error is the engine's diagnostic text.
    fn compile(&self, state: &State, source: &str) -> Result<Value, String>;

    /// Make `chunk` resolve free names in `env`.
    fn set_environment(&self, state: &State, chunk: &Value, env: TableRef) -> bool;

    /// Message handler that adds a traceback to runtime errors.
    fn traceback_handler(&self, state: &State) -> Option<Value>;

    /// Protected call of the function at `base` with the arguments above
    /// it; returns the number of results left on the stack from `base`.
    fn pcall(&self, state: &State, base: usize, handler: Option<Value>)
        -> Result<usize, ScriptError>;

    /// Release the instance.
    fn close(&self, state: &State);
}

/// The `rings-engine` interpreter.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdEngine;

impl Engine for StdEngine {
    fn open(&self, options: &StateOptions) -> Result<State, EngineError> {
        let state = State::new(options.clone());
        state.open_libs();

        let traceback = state
            .globals()
            .get_str("debug")
            .as_table()
            .map(|debug| debug.get_str("traceback"))
            .unwrap_or_default();
        if traceback.is_nil() {
            return Err(EngineError::Library {
                name: "debug",
                reason: "traceback is missing".to_string(),
            });
        }
        state.registry().set_str(TRACEBACK_KEY, traceback);

        trace!(state = state.id().as_u64(), "engine instance opened");
        Ok(state)
    }

    fn compile(&self, state: &State, source: &str) -> Result<Value, String> {
        // The source text doubles as the chunk name
        state.load(source, source).map_err(|err| err.to_string())
    }

    fn set_environment(&self, state: &State, chunk: &Value, env: TableRef) -> bool {
        state.set_environment(chunk, env)
    }

    fn traceback_handler(&self, state: &State) -> Option<Value> {
        let handler = state.registry().get_str(TRACEBACK_KEY);
        (!handler.is_nil()).then_some(handler)
    }

    fn pcall(
        &self,
        state: &State,
        base: usize,
        handler: Option<Value>,
    ) -> Result<usize, ScriptError> {
        state.pcall_stack(base, handler)
    }

    fn close(&self, state: &State) {
        state.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_registers_traceback() {
        let engine = StdEngine;
        let state = engine.open(&StateOptions::default()).unwrap();
        assert!(engine.traceback_handler(&state).is_some());
        // Not visible to scripts
        assert_eq!(state.exec("return rings_traceback").unwrap(), vec![Value::Nil]);
    }

    #[test]
    fn test_compile_names_chunk_after_source() {
        let engine = StdEngine;
        let state = engine.open(&StateOptions::default()).unwrap();
        let err = engine.compile(&state, "return +").unwrap_err();
        assert!(err.starts_with("[string \"return +\"]:1:"), "{}", err);
    }

    #[test]
    fn test_pcall_with_traceback() {
        let engine = StdEngine;
        let state = engine.open(&StateOptions::default()).unwrap();
        let chunk = engine.compile(&state, "error('boom')").unwrap();
        let base = state.stack_depth();
        state.push(chunk).unwrap();

        let handler = engine.traceback_handler(&state);
        let err = engine.pcall(&state, base, handler).unwrap_err();
        let message = err.message();
        assert!(message.contains("boom"), "{}", message);
        assert!(message.contains("stack traceback:"), "{}", message);
        assert_eq!(state.stack_depth(), base);
    }
}
