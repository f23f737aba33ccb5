//! Engine error types

use crate::vm::value::Value;
use std::fmt;
use thiserror::Error;

/// An error raised by a script (or by a native on its behalf).
///
/// The payload is an arbitrary value. Once the active message handler has
/// seen the error it is marked as handled so outer frames pass it through
/// unchanged.
#[derive(Clone)]
pub struct ScriptError {
    value: Value,
    handled: bool,
}

impl ScriptError {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            handled: false,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Message text, as a protected call reports it.
    pub fn message(&self) -> String {
        match &self.value {
            Value::String(_) | Value::Number(_) => self.value.to_string(),
            Value::Nil => "nil".to_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        }
    }

    pub(crate) fn is_handled(&self) -> bool {
        self.handled
    }

    pub(crate) fn handled(value: Value) -> Self {
        Self {
            value,
            handled: true,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl fmt::Debug for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptError")
            .field("value", &self.value)
            .field("handled", &self.handled)
            .finish()
    }
}

impl std::error::Error for ScriptError {}

/// Failure to create or configure an interpreter state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot allocate interpreter state: {0}")]
    Allocation(String),

    #[error("cannot open library '{name}': {reason}")]
    Library { name: &'static str, reason: String },
}
