//! Rings scripting engine
//!
//! A small Lua 5.1 flavoured interpreter used as the execution engine for
//! isolated rings:
//! - **Parser**: logos-based lexer and recursive-descent parser (`parser` module)
//! - **VM**: tree-walking interpreter, tables with metatables, per-state heap
//!   tracking and the baseline standard library (`vm` module)
//!
//! Every [`State`] is fully independent. Values never move between states
//! by reference; hosts copy them (see the `rings-core` crate).
//!
//! # Example
//!
//! ```rust,ignore
//! use rings_engine::{State, StateOptions, Value};
//!
//! let state = State::new(StateOptions::default());
//! state.open_libs();
//! let results = state.exec("return 1 + 1").unwrap();
//! assert_eq!(results, vec![Value::Number(2.0)]);
//! ```

#![warn(rust_2018_idioms)]

pub mod parser;
pub mod vm;

pub use parser::{ast::Chunk, chunk_id, parse, LexError, ParseError};
pub use vm::{
    EngineError, Function, HeapStats, OpaqueRef, ScriptError, StackError, State, StateId,
    StateOptions, Table, TableError, TableRef, Userdata, Value, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_MAX_STACK_SIZE,
};
