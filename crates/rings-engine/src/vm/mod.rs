//! Interpreter runtime: values, tables, heap tracking and execution

pub mod error;
pub mod gc;
pub mod interpreter;
pub mod object;
pub mod opaque;
pub mod stack;
pub mod stdlib;
pub mod table;
pub mod value;

pub use error::{EngineError, ScriptError};
pub use gc::HeapStats;
pub use interpreter::{State, StateId, StateOptions, DEFAULT_MAX_CALL_DEPTH};
pub use object::{Function, NativeFn, Userdata};
pub use opaque::OpaqueRef;
pub use stack::{StackError, DEFAULT_MAX_STACK_SIZE};
pub use table::{Table, TableError, TableRef};
pub use value::Value;
