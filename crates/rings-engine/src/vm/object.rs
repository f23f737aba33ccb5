//! Functions and userdata

use crate::parser::ast::FunctionBody;
use crate::vm::error::ScriptError;
use crate::vm::interpreter::scope::Scope;
use crate::vm::interpreter::State;
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Signature of host functions callable from scripts.
pub type NativeFn = dyn Fn(&State, Vec<Value>) -> Result<Vec<Value>, ScriptError>;

/// A callable value.
pub enum Function {
    Script(Closure),
    Native(NativeFunction),
}

impl Function {
    /// Name used in tracebacks and argument errors.
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Script(closure) => closure.body.name.as_deref(),
            Function::Native(native) => Some(native.name),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Script(closure) => write!(
                f,
                "function <{}:{}>",
                closure.chunk,
                closure.body.line
            ),
            Function::Native(native) => write!(f, "function '{}'", native.name),
        }
    }
}

/// A script function together with its captured scope and environment.
pub struct Closure {
    pub body: Rc<FunctionBody>,
    /// Diagnostic chunk name of the defining chunk
    pub chunk: Rc<str>,
    pub(crate) scope: Rc<Scope>,
    /// Global table used for free names (replaceable with `setfenv`)
    pub(crate) env: RefCell<TableRef>,
}

impl Closure {
    pub fn env(&self) -> TableRef {
        self.env.borrow().clone()
    }

    pub fn set_env(&self, env: TableRef) {
        *self.env.borrow_mut() = env;
    }
}

/// A host function.
pub struct NativeFunction {
    pub name: &'static str,
    pub(crate) func: Box<NativeFn>,
}

/// A host resource exposed to scripts.
///
/// The payload is owned by the userdata and dropped with it, which is how
/// resources get released when the last script reference disappears.
pub struct Userdata {
    payload: Box<dyn Any>,
    metatable: RefCell<Option<TableRef>>,
}

impl Userdata {
    pub fn new<T: Any>(payload: T, metatable: Option<TableRef>) -> Self {
        Self {
            payload: Box::new(payload),
            metatable: RefCell::new(metatable),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.borrow().clone()
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        let previous = self.metatable.replace(metatable);
        drop(previous);
    }
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata: {:p}", self)
    }
}
