//! Compiled chunk cache
//!
//! Maps exact source text to the function it compiled to, per destination
//! context. Entries hold a strong reference; [`ChunkCache::sweep`] drops the
//! ones nothing else refers to any more, which stands in for the weak-valued
//! table a collector would give us.

use rings_engine::Value;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::trace;

/// Source text -> compiled chunk.
#[derive(Default)]
pub struct ChunkCache {
    entries: FxHashMap<Rc<str>, Value>,
    hits: u64,
    misses: u64,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached chunk for `source`, if any. Counts a hit or a miss.
    pub fn get(&mut self, source: &str) -> Option<Value> {
        match self.entries.get(source) {
            Some(chunk) => {
                self.hits += 1;
                trace!(len = source.len(), "chunk cache hit");
                Some(chunk.clone())
            }
            None => {
                self.misses += 1;
                trace!(len = source.len(), "chunk cache miss");
                None
            }
        }
    }

    pub fn insert(&mut self, source: &str, chunk: Value) {
        self.entries.insert(Rc::from(source), chunk);
    }

    /// Remove entries whose chunk is referenced only by this cache.
    ///
    /// The evicted chunks are returned so the caller can drop them once it
    /// no longer holds a borrow of the cache.
    pub fn sweep(&mut self) -> Vec<Value> {
        let dead: Vec<Rc<str>> = self
            .entries
            .iter()
            .filter(|(_, chunk)| !is_shared(chunk))
            .map(|(source, _)| source.clone())
            .collect();

        dead.iter()
            .filter_map(|source| self.entries.remove(source))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

/// True when something besides the cache owns the function.
fn is_shared(chunk: &Value) -> bool {
    match chunk {
        Value::Function(function) => Rc::strong_count(function) > 1,
        _ => false,
    }
}
