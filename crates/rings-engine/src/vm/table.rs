//! Associative tables
//!
//! A table is an insertion-ordered hash map from any non-nil value to any
//! value, plus an optional metatable. Assigning `nil` leaves a tombstone so
//! that `next` keeps working while a traversal clears fields; tombstones are
//! compacted away when a new key is inserted.

use crate::vm::value::Value;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table index is nil")]
    NilKey,

    #[error("table index is NaN")]
    NanKey,

    #[error("invalid key to 'next'")]
    InvalidNextKey,
}

/// Hashable wrapper for a non-nil, non-NaN key.
#[derive(Clone)]
pub struct TableKey(Value);

impl TableKey {
    pub fn new(value: Value) -> Result<Self, TableError> {
        match value {
            Value::Nil => Err(TableError::NilKey),
            Value::Number(n) if n.is_nan() => Err(TableError::NanKey),
            // -0 and 0 are the same key
            Value::Number(n) if n == 0.0 => Ok(TableKey(Value::Number(0.0))),
            other => Ok(TableKey(other)),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equal(&other.0)
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Nil => {}
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Opaque(o) => o.hash(state),
            other => other.address().hash(state),
        }
    }
}

/// Table contents.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value, FxBuildHasher>,
    tombstones: usize,
    metatable: Option<TableRef>,
}

impl Table {
    /// Lookup without metamethods.
    pub fn get(&self, key: &Value) -> Value {
        match TableKey::new(key.clone()) {
            Ok(key) => self.entries.get(&key).cloned().unwrap_or_default(),
            Err(_) => Value::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::string(key))
    }

    /// Store without metamethods.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), TableError> {
        let key = TableKey::new(key)?;
        match self.entries.get_mut(&key) {
            Some(slot) => {
                if slot.is_nil() && !value.is_nil() {
                    self.tombstones -= 1;
                } else if !slot.is_nil() && value.is_nil() {
                    self.tombstones += 1;
                }
                *slot = value;
            }
            None if value.is_nil() => {}
            None => {
                if self.tombstones > 0 && self.tombstones * 2 > self.entries.len() {
                    self.compact();
                }
                self.entries.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        // String keys are always valid
        let _ = self.set(Value::string(key), value);
    }

    fn compact(&mut self) {
        self.entries.retain(|_, v| !v.is_nil());
        self.tombstones = 0;
    }

    /// A border: `t[n] ~= nil and t[n + 1] == nil` (0 if `t[1]` is nil).
    pub fn border(&self) -> usize {
        let present = |i: usize| !self.get(&Value::Number(i as f64)).is_nil();
        if !present(1) {
            return 0;
        }

        // Unbounded search: double until a hole, then bisect
        let mut low = 1usize;
        let mut high = 2usize;
        while present(high) {
            low = high;
            match high.checked_mul(2) {
                Some(next) if next <= (1 << 52) => high = next,
                _ => {
                    // Pathological table, fall back to a linear scan
                    let mut n = 1;
                    while present(n + 1) {
                        n += 1;
                    }
                    return n;
                }
            }
        }
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if present(mid) {
                low = mid;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Entry after `key` in traversal order (`nil` starts the traversal).
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, TableError> {
        let start = if key.is_nil() {
            0
        } else {
            let key = TableKey::new(key.clone()).map_err(|_| TableError::InvalidNextKey)?;
            self.entries
                .get_index_of(&key)
                .ok_or(TableError::InvalidNextKey)?
                + 1
        };

        Ok(self
            .entries
            .iter()
            .skip(start)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.value().clone(), v.clone())))
    }

    /// Snapshot of all live entries in traversal order.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.value().clone(), v.clone()))
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len() - self.tombstones
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    /// Insert at a 1-based array position, shifting later elements up.
    pub fn insert_at(&mut self, position: usize, value: Value) {
        let end = self.border();
        let mut i = end;
        while i >= position {
            let moved = self.get(&Value::Number(i as f64));
            let _ = self.set(Value::Number((i + 1) as f64), moved);
            i -= 1;
        }
        let _ = self.set(Value::Number(position as f64), value);
    }

    /// Remove a 1-based array position, shifting later elements down.
    pub fn remove_at(&mut self, position: usize) -> Value {
        let end = self.border();
        let removed = self.get(&Value::Number(position as f64));
        for i in position..end {
            let moved = self.get(&Value::Number((i + 1) as f64));
            let _ = self.set(Value::Number(i as f64), moved);
        }
        if position <= end {
            let _ = self.set(Value::Number(end as f64), Value::Nil);
        }
        removed
    }

    /// Take all entries and the metatable, leaving the table empty.
    pub(crate) fn take_contents(&mut self) -> (Vec<(Value, Value)>, Option<TableRef>) {
        let entries = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(k, v)| (k.0, v))
            .collect();
        self.tombstones = 0;
        (entries, self.metatable.take())
    }
}

/// Shared handle to a table; equality is identity.
#[derive(Clone)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    pub(crate) fn new() -> Self {
        TableRef(Rc::new(RefCell::new(Table::default())))
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Raw lookup, see [`Table::get`]
    pub fn get(&self, key: &Value) -> Value {
        self.0.borrow().get(key)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.0.borrow().get_str(key)
    }

    /// Raw store, see [`Table::set`]
    pub fn set(&self, key: Value, value: Value) -> Result<(), TableError> {
        self.0.borrow_mut().set(key, value)
    }

    pub fn set_str(&self, key: &str, value: Value) {
        self.0.borrow_mut().set_str(key, value)
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.borrow().metatable()
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<RefCell<Table>> {
        Rc::downgrade(&self.0)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#010x}", self.address())
    }
}
