//! Heap tracking
//!
//! Values are reference counted, so acyclic garbage is freed as soon as its
//! last reference is dropped. What reference counting cannot free are
//! cycles (a table that contains itself, a closure stored in a variable it
//! captures). The heap therefore keeps a weak registry of every table and
//! scope a state allocates; when the state is closed the registry is used to
//! empty every object that is still alive, which breaks all cycles at once.
//!
//! Cyclic garbage created while a state is open lives until the state is
//! closed.

use crate::vm::interpreter::scope::Scope;
use crate::vm::table::{Table, TableRef};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Prune dead registry entries after this many allocations
const PRUNE_INTERVAL: usize = 4096;

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total tables allocated
    pub tables_allocated: usize,

    /// Total scopes allocated
    pub scopes_allocated: usize,

    /// Number of prune passes
    pub collections: usize,

    /// Registry entries removed by pruning
    pub entries_pruned: usize,
}

/// Weak registry of objects owned by one state.
#[derive(Default)]
pub struct Heap {
    tables: Vec<Weak<RefCell<Table>>>,
    scopes: Vec<Weak<Scope>>,
    since_prune: usize,
    stats: HeapStats,
}

/// Everything still alive when a heap is released.
pub(crate) struct LiveObjects {
    pub tables: Vec<Weak<RefCell<Table>>>,
    pub scopes: Vec<Weak<Scope>>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_table(&mut self, table: &TableRef) {
        self.tables.push(table.downgrade());
        self.stats.tables_allocated += 1;
        self.tick();
    }

    pub(crate) fn track_scope(&mut self, scope: &Rc<Scope>) {
        self.scopes.push(Rc::downgrade(scope));
        self.stats.scopes_allocated += 1;
        self.tick();
    }

    fn tick(&mut self) {
        self.since_prune += 1;
        if self.since_prune >= PRUNE_INTERVAL {
            self.prune();
        }
    }

    /// Drop registry entries whose objects are gone; returns how many.
    pub fn prune(&mut self) -> usize {
        let before = self.tables.len() + self.scopes.len();
        self.tables.retain(|weak| weak.strong_count() > 0);
        self.scopes.retain(|weak| weak.strong_count() > 0);
        let removed = before - (self.tables.len() + self.scopes.len());

        self.since_prune = 0;
        self.stats.collections += 1;
        self.stats.entries_pruned += removed;
        removed
    }

    /// Number of tables still alive
    pub fn live_tables(&self) -> usize {
        self.tables
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Hand over the registry so the owner can empty the live objects
    /// without keeping the heap borrowed.
    pub(crate) fn drain(&mut self) -> LiveObjects {
        LiveObjects {
            tables: std::mem::take(&mut self.tables),
            scopes: std::mem::take(&mut self.scopes),
        }
    }
}

impl LiveObjects {
    /// Empty every live object. Values are dropped one object at a time,
    /// never while another object is borrowed.
    pub(crate) fn release(self) {
        for weak in self.tables {
            if let Some(table) = weak.upgrade() {
                let contents = table.borrow_mut().take_contents();
                drop(contents);
            }
        }
        for weak in self.scopes {
            if let Some(scope) = weak.upgrade() {
                let variables = scope.take_variables();
                drop(variables);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::Value;

    #[test]
    fn test_prune_removes_dead_tables() {
        let mut heap = Heap::new();
        let kept = TableRef::new();
        heap.track_table(&kept);
        {
            let dropped = TableRef::new();
            heap.track_table(&dropped);
        }
        assert_eq!(heap.live_tables(), 1);
        assert_eq!(heap.prune(), 1);
        assert_eq!(heap.stats().tables_allocated, 2);
        assert_eq!(heap.stats().entries_pruned, 1);
    }

    #[test]
    fn test_release_breaks_cycles() {
        let mut heap = Heap::new();
        let table = TableRef::new();
        heap.track_table(&table);
        table.set_str("self", Value::Table(table.clone()));
        let weak = table.downgrade();
        drop(table);

        // The self reference keeps it alive until released
        assert!(weak.upgrade().is_some());
        heap.drain().release();
        assert!(weak.upgrade().is_none());
    }
}
