//! Lexical scopes
//!
//! Every block execution gets a scope. Locals live in shared cells so a
//! closure created inside the block keeps seeing (and updating) the same
//! variable after the block has finished.

use crate::vm::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A local variable cell
pub type Cell = Rc<RefCell<Value>>;

pub struct Scope {
    variables: RefCell<Vec<(Rc<str>, Cell)>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub(crate) fn new(parent: Option<Rc<Scope>>) -> Self {
        Self {
            variables: RefCell::new(Vec::new()),
            parent,
        }
    }

    /// Declare a local, shadowing any earlier one with the same name.
    pub fn declare(&self, name: Rc<str>, value: Value) -> Cell {
        let cell = Rc::new(RefCell::new(value));
        self.variables.borrow_mut().push((name, cell.clone()));
        cell
    }

    /// Find the innermost visible local named `name`.
    pub fn lookup(&self, name: &str) -> Option<Cell> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            let found = current
                .variables
                .borrow()
                .iter()
                .rev()
                .find(|(n, _)| &**n == name)
                .map(|(_, cell)| cell.clone());
            if found.is_some() {
                return found;
            }
            scope = current.parent.as_deref();
        }
        None
    }

    pub(crate) fn take_variables(&self) -> Vec<(Rc<str>, Cell)> {
        std::mem::take(&mut *self.variables.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents_and_shadows() {
        let outer = Rc::new(Scope::new(None));
        outer.declare(Rc::from("x"), Value::Number(1.0));
        let inner = Scope::new(Some(outer.clone()));
        assert_eq!(*inner.lookup("x").unwrap().borrow(), Value::Number(1.0));

        inner.declare(Rc::from("x"), Value::Number(2.0));
        assert_eq!(*inner.lookup("x").unwrap().borrow(), Value::Number(2.0));
        assert_eq!(*outer.lookup("x").unwrap().borrow(), Value::Number(1.0));
        assert!(inner.lookup("y").is_none());
    }
}
