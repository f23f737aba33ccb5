//! Context registry
//!
//! Bookkeeping shared by every context of one [`Rings`](crate::Rings)
//! manager, keyed by [`RingId`]:
//! - the live contexts (weakly held; handles own them)
//! - the enclosing environment each child was created under
//! - the context that most recently called into each context

use crate::context::{RingContext, RingId};
use rings_engine::TableRef;
use rustc_hash::FxHashMap;
use std::rc::{Rc, Weak};

/// Environment and caller registration of a context leaving the registry
pub(crate) type Removed = (Option<TableRef>, Option<Weak<RingContext>>);

#[derive(Default)]
pub(crate) struct Registry {
    contexts: FxHashMap<RingId, Weak<RingContext>>,
    environments: FxHashMap<RingId, TableRef>,
    callers: FxHashMap<RingId, Weak<RingContext>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new context and the environment it was created under.
    pub fn insert(&mut self, context: &Rc<RingContext>, environment: Option<TableRef>) {
        let id = context.id();
        self.contexts.insert(id, Rc::downgrade(context));
        if let Some(environment) = environment {
            self.environments.insert(id, environment);
        }
    }

    /// Point `id`'s caller registration at `caller`, returning the old one.
    pub fn set_caller(
        &mut self,
        id: RingId,
        caller: Weak<RingContext>,
    ) -> Option<Weak<RingContext>> {
        self.callers.insert(id, caller)
    }

    /// Put back a registration saved by [`set_caller`](Self::set_caller).
    pub fn restore_caller(&mut self, id: RingId, previous: Option<Weak<RingContext>>) {
        match previous {
            Some(caller) => {
                self.callers.insert(id, caller);
            }
            None => {
                self.callers.remove(&id);
            }
        }
    }

    /// The nearest active caller of `id`, if it is still alive.
    pub fn caller(&self, id: RingId) -> Option<Rc<RingContext>> {
        self.callers.get(&id).and_then(Weak::upgrade)
    }

    pub fn environment(&self, id: RingId) -> Option<TableRef> {
        self.environments.get(&id).cloned()
    }

    pub fn contains(&self, id: RingId) -> bool {
        self.contexts.contains_key(&id)
    }

    pub fn remove(&mut self, id: RingId) -> Removed {
        self.contexts.remove(&id);
        (self.environments.remove(&id), self.callers.remove(&id))
    }

    /// Every registered context that is still alive.
    pub fn open_contexts(&self) -> Vec<Rc<RingContext>> {
        self.contexts.values().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }
}
