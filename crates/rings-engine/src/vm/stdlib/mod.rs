//! Baseline standard library
//!
//! Every library is a set of native functions registered into a table (or
//! directly into the globals for the base library). Argument checking goes
//! through the helpers below so error messages read the same everywhere:
//! `bad argument #1 to 'floor' (number expected, got nil)`.

mod base;
mod debug;
mod math;
mod string;
mod table;

use crate::vm::error::ScriptError;
use crate::vm::interpreter::State;
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use std::rc::Rc;

/// Open every baseline library into `state`.
pub fn open_all(state: &State) {
    let globals = state.globals();
    globals.set_str("_G", Value::Table(globals.clone()));
    globals.set_str("_VERSION", Value::from("Lua 5.1"));

    base::open(state);
    string::open(state);
    table::open(state);
    math::open(state);
    debug::open(state);
}

/// Register `func` as `table[name]`.
pub(crate) fn register(
    state: &State,
    table: &TableRef,
    name: &'static str,
    func: impl Fn(&State, Vec<Value>) -> Result<Vec<Value>, ScriptError> + 'static,
) {
    table.set_str(name, state.create_function(name, func));
}

/// Create a library table and publish it as a global.
pub(crate) fn new_library(state: &State, name: &str) -> TableRef {
    let library = state.new_table();
    state.globals().set_str(name, Value::Table(library.clone()));
    library
}

// ============================================================================
// Argument checking
// ============================================================================

/// 1-based argument access; missing arguments read as nil.
pub(crate) fn arg(args: &[Value], position: usize) -> Value {
    args.get(position - 1).cloned().unwrap_or_default()
}

pub(crate) fn arg_error(
    state: &State,
    position: usize,
    function: &str,
    message: impl AsRef<str>,
) -> ScriptError {
    state.error(format!(
        "bad argument #{} to '{}' ({})",
        position,
        function,
        message.as_ref()
    ))
}

fn type_error(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
    expected: &str,
) -> ScriptError {
    let got = if position > args.len() {
        "no value"
    } else {
        arg(args, position).type_name()
    };
    arg_error(
        state,
        position,
        function,
        format!("{} expected, got {}", expected, got),
    )
}

pub(crate) fn check_any(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<Value, ScriptError> {
    if position > args.len() {
        return Err(arg_error(state, position, function, "value expected"));
    }
    Ok(arg(args, position))
}

pub(crate) fn check_number(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<f64, ScriptError> {
    arg(args, position)
        .to_number()
        .ok_or_else(|| type_error(state, args, position, function, "number"))
}

pub(crate) fn check_integer(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<i64, ScriptError> {
    check_number(state, args, position, function).map(|n| n as i64)
}

pub(crate) fn opt_integer(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
    default: i64,
) -> Result<i64, ScriptError> {
    if arg(args, position).is_nil() {
        Ok(default)
    } else {
        check_integer(state, args, position, function)
    }
}

pub(crate) fn check_string(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<Rc<str>, ScriptError> {
    arg(args, position)
        .to_text()
        .ok_or_else(|| type_error(state, args, position, function, "string"))
}

pub(crate) fn opt_string(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<Option<Rc<str>>, ScriptError> {
    if arg(args, position).is_nil() {
        Ok(None)
    } else {
        check_string(state, args, position, function).map(Some)
    }
}

pub(crate) fn check_table(
    state: &State,
    args: &[Value],
    position: usize,
    function: &str,
) -> Result<TableRef, ScriptError> {
    match arg(args, position) {
        Value::Table(t) => Ok(t),
        _ => Err(type_error(state, args, position, function, "table")),
    }
}
