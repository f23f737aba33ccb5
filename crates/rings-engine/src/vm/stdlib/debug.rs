//! Debug library (tracebacks only)

use super::{arg, new_library, opt_integer, register};
use crate::vm::interpreter::State;
use crate::vm::value::{format_number, Value};
use std::rc::Rc;

pub(super) fn open(state: &State) {
    let debug = new_library(state, "debug");

    // Also used as the message handler of remote calls
    register(state, &debug, "traceback", |state, args| {
        let message = match arg(&args, 1) {
            Value::Nil => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(Rc::from(format_number(n))),
            other => return Ok(vec![other]),
        };
        let level = opt_integer(state, &args, 2, "traceback", 1)?.max(0) as usize;
        Ok(vec![Value::string(
            state.traceback(message.as_deref(), level),
        )])
    });
}
