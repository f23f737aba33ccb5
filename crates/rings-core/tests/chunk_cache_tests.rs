//! Chunk Cache Integration Tests
//!
//! Uses an engine wrapper that counts compilations to check that:
//! - identical source text is compiled once per destination
//! - different rings and different submitters keep separate caches
//! - sweeping evicts chunks nothing else holds
//!
//! # Running Tests
//! ```bash
//! cargo test -p rings-core --test chunk_cache_tests
//! ```

use rings_core::{Engine, Rings, RingsOptions, StdEngine};
use rings_engine::{EngineError, ScriptError, State, StateOptions, TableRef, Value};
use std::cell::Cell;
use std::rc::Rc;

/// Standard engine that counts `compile` calls.
#[derive(Default)]
struct CountingEngine {
    inner: StdEngine,
    compiles: Cell<usize>,
}

impl Engine for CountingEngine {
    fn open(&self, options: &StateOptions) -> Result<State, EngineError> {
        self.inner.open(options)
    }

    fn compile(&self, state: &State, source: &str) -> Result<Value, String> {
        self.compiles.set(self.compiles.get() + 1);
        self.inner.compile(state, source)
    }

    fn set_environment(&self, state: &State, chunk: &Value, env: TableRef) -> bool {
        self.inner.set_environment(state, chunk, env)
    }

    fn traceback_handler(&self, state: &State) -> Option<Value> {
        self.inner.traceback_handler(state)
    }

    fn pcall(
        &self,
        state: &State,
        base: usize,
        handler: Option<Value>,
    ) -> Result<usize, ScriptError> {
        self.inner.pcall(state, base, handler)
    }

    fn close(&self, state: &State) {
        self.inner.close(state)
    }
}

fn counting_rings(options: RingsOptions) -> (Rings, Rc<CountingEngine>) {
    let engine = Rc::new(CountingEngine::default());
    let rings = Rings::with_engine(options, engine.clone()).unwrap();
    (rings, engine)
}

#[test]
fn test_identical_source_compiles_once() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let ring = rings.create(None).unwrap();

    for _ in 0..3 {
        let outcome = ring.dostring("return 1 + 1", Vec::new()).unwrap();
        assert_eq!(outcome.values(), &[Value::Number(2.0)]);
    }
    assert_eq!(engine.compiles.get(), 1);

    ring.dostring("return 1 + 2", Vec::new()).unwrap();
    assert_eq!(engine.compiles.get(), 2);
}

#[test]
fn test_each_ring_has_its_own_cache() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let first = rings.create(None).unwrap();
    let second = rings.create(None).unwrap();

    first.dostring("return 'same'", Vec::new()).unwrap();
    second.dostring("return 'same'", Vec::new()).unwrap();
    assert_eq!(engine.compiles.get(), 2);
}

#[test]
fn test_failed_compiles_are_not_cached() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let ring = rings.create(None).unwrap();

    assert!(!ring.dostring("return +", Vec::new()).unwrap().is_success());
    assert!(!ring.dostring("return +", Vec::new()).unwrap().is_success());
    assert_eq!(engine.compiles.get(), 2);
}

#[test]
fn test_reverse_calls_are_cached_per_child() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let host = rings.host();
    let env = host.new_table();
    env.set_str("who", Value::from("restricted"));

    let open = rings.create(None).unwrap();
    let restricted = rings.create(Some(env)).unwrap();
    host.globals().set_str("who", Value::from("host"));

    let code = "return remotedostring('return who')";
    let from_open = open.dostring(code, Vec::new()).unwrap();
    let from_restricted = restricted.dostring(code, Vec::new()).unwrap();
    assert_eq!(from_open.values()[1], Value::from("host"));
    assert_eq!(from_restricted.values()[1], Value::from("restricted"));

    // One compile of `code` per ring, one of the inner text per child
    assert_eq!(engine.compiles.get(), 4);
    open.dostring(code, Vec::new()).unwrap();
    restricted.dostring(code, Vec::new()).unwrap();
    assert_eq!(engine.compiles.get(), 4);
}

#[test]
fn test_collect_garbage_evicts_idle_chunks() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let ring = rings.create(None).unwrap();

    ring.dostring("return 'a'", Vec::new()).unwrap();
    ring.dostring("return 'b'", Vec::new()).unwrap();
    let report = rings.collect_garbage();
    assert_eq!(report.evicted_chunks, 2);

    ring.dostring("return 'a'", Vec::new()).unwrap();
    assert_eq!(engine.compiles.get(), 3);
}

#[test]
fn test_chunks_in_use_survive_sweeps() {
    let (rings, _engine) = counting_rings(RingsOptions::default());
    let ring = rings.create(None).unwrap();

    // The running chunk is owned by its call, so the sweep inside it keeps it
    let outcome = ring
        .dostring("collectgarbage(); return 'still here'", Vec::new())
        .unwrap();
    assert_eq!(outcome.values(), &[Value::from("still here")]);
}

#[test]
fn test_automatic_sweep_threshold() {
    let options = RingsOptions {
        cache_sweep_threshold: 3,
        ..Default::default()
    };
    let (rings, engine) = counting_rings(options);
    let ring = rings.create(None).unwrap();

    for i in 0..3 {
        ring.dostring(&format!("return {}", i), Vec::new()).unwrap();
    }
    // The third insertion triggered a sweep of the first two idle chunks
    ring.dostring("return 0", Vec::new()).unwrap();
    assert_eq!(engine.compiles.get(), 4);
}

#[test]
fn test_script_collectgarbage_sweeps() {
    let (rings, engine) = counting_rings(RingsOptions::default());
    let outcome = rings.eval(
        "local r = rings.new()
         r:dostring('return 1')
         collectgarbage()
         r:dostring('return 1')
         collectgarbage('count')
         r:dostring('return 1')",
    );
    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(engine.compiles.get(), 2);
}
