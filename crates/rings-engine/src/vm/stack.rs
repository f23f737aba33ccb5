//! Evaluation stack
//!
//! The stack is the transfer area between a state and its host: callers
//! push a function and its arguments, a protected call replaces them with
//! the results, and cross-state copies read ranges from one state's stack
//! and append to another's.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ result₁ / arg₁                      │  ← top
//! │ result₀ / arg₀                      │
//! │ function                            │  ← base of a call
//! ├─────────────────────────────────────┤
//! │ values owned by outer host calls    │
//! └─────────────────────────────────────┘
//! ```

use crate::vm::value::Value;
use std::ops::Range;
use thiserror::Error;

/// Default maximum stack size (in slots)
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack overflow ({0} slots)")]
    Overflow(usize),

    #[error("stack underflow")]
    Underflow,

    #[error("stack range {start}..{end} out of bounds (depth {depth})")]
    OutOfBounds {
        start: usize,
        end: usize,
        depth: usize,
    },
}

/// Bounded value stack.
pub struct Stack {
    slots: Vec<Value>,
    max_size: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// Create a new stack with default size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STACK_SIZE)
    }

    /// Create a stack holding at most `max_size` values
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(64.min(max_size)),
            max_size,
        }
    }

    /// Push a value onto the stack
    ///
    /// # Errors
    ///
    /// Returns `StackError::Overflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, value: Value) -> Result<(), StackError> {
        if self.slots.len() >= self.max_size {
            return Err(StackError::Overflow(self.max_size));
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    ///
    /// # Errors
    ///
    /// Returns `StackError::Underflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> Result<Value, StackError> {
        self.slots.pop().ok_or(StackError::Underflow)
    }

    /// Check that `extra` more values fit.
    pub fn ensure(&self, extra: usize) -> Result<(), StackError> {
        if self.slots.len().saturating_add(extra) > self.max_size {
            return Err(StackError::Overflow(self.max_size));
        }
        Ok(())
    }

    /// Value at an absolute position
    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.slots.get(pos)
    }

    /// Clone a range of values
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<Value>, StackError> {
        self.slots
            .get(range.clone())
            .map(|values| values.to_vec())
            .ok_or(StackError::OutOfBounds {
                start: range.start,
                end: range.end,
                depth: self.slots.len(),
            })
    }

    /// Remove and return everything from `base` up.
    pub fn drain_from(&mut self, base: usize) -> Vec<Value> {
        let base = base.min(self.slots.len());
        self.slots.split_off(base)
    }

    /// Drop everything above `depth`.
    ///
    /// The removed values are handed back so the caller can drop them
    /// outside of any borrow of the stack.
    pub fn truncate(&mut self, depth: usize) -> Vec<Value> {
        self.drain_from(depth)
    }

    /// Get current stack depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get maximum stack size
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
