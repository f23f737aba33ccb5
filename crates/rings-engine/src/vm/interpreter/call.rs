//! Function calls

use super::exec::Flow;
use super::{CallInfo, State};
use crate::vm::error::ScriptError;
use crate::vm::object::{Closure, Function};
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use std::cell::Cell;
use std::rc::Rc;

/// Per-call evaluation context of a script function.
pub(crate) struct Activation {
    /// Table that free names resolve against
    pub env: TableRef,
    /// Extra arguments of a vararg function
    pub varargs: Vec<Value>,
    /// Chunk name for closures created by this call
    pub chunk: Rc<str>,
}

impl State {
    /// Call any value, honouring `__call`.
    pub(crate) fn call_value(
        &self,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, ScriptError> {
        self.call_described(function, args, None)
    }

    /// Call with a description of the callee for error messages
    /// (`global 'f'`, `method 'm'`, ...).
    pub(crate) fn call_described(
        &self,
        function: &Value,
        args: Vec<Value>,
        description: Option<String>,
    ) -> Result<Vec<Value>, ScriptError> {
        match function {
            Value::Function(f) => self.call_function(f, args),
            other => match self.metamethod(other, "__call") {
                Some(handler) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(other.clone());
                    full.extend(args);
                    self.call_value(&handler, full)
                }
                None => Err(self.type_error("call", other, description)),
            },
        }
    }

    fn call_function(
        &self,
        function: &Rc<Function>,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, ScriptError> {
        if self.frames.borrow().len() >= self.call_limit() {
            return Err(self.error("stack overflow"));
        }
        self.frames.borrow_mut().push(CallInfo {
            function: function.clone(),
            line: Cell::new(0),
        });

        let result = match &**function {
            Function::Script(closure) => self.call_closure(closure, args),
            Function::Native(native) => (native.func)(self, args),
        };
        // The handler must see the frames of the failing call
        let result = match result {
            Err(error) if !error.is_handled() => Err(self.handle_error(error)),
            other => other,
        };

        let frame = self.frames.borrow_mut().pop();
        drop(frame);
        result
    }

    fn call_closure(&self, closure: &Closure, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
        let scope = self.new_scope(Some(closure.scope.clone()));
        let mut args = args.into_iter();
        for param in &closure.body.params {
            scope.declare(param.clone(), args.next().unwrap_or_default());
        }

        let activation = Activation {
            env: closure.env(),
            varargs: if closure.body.is_vararg {
                args.collect()
            } else {
                Vec::new()
            },
            chunk: closure.chunk.clone(),
        };

        match self.exec_block(&closure.body.block, &scope, &activation)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }
}
