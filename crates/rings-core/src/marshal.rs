//! Value marshalling between rings
//!
//! Values cross a ring boundary by copy. A transfer takes a range of the
//! source state's evaluation stack and appends copies to the destination
//! state's stack:
//! - numbers, booleans and nil are copied as-is
//! - strings are copied by content
//! - opaque references keep their raw identity
//! - tables are copied key by key (metatables are not carried over)
//!
//! A per-transfer cache keyed by source table identity makes sure a table
//! reachable along several paths (or from itself) is copied exactly once,
//! so sharing and cycles come out with the same shape. Tables are walked
//! with an explicit worklist, and nesting is bounded by `max_depth`.
//!
//! Functions and userdata cannot cross. As arguments they fail the whole
//! transfer; as results they are replaced by a descriptive string.

use rings_engine::{State, StackError, TableRef, Value};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::rc::Rc;
use thiserror::Error;
use tracing::trace;

/// Errors that can occur during marshalling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// An argument (or something inside it) cannot cross a ring boundary
    #[error("bad argument #{position} to '{function}' (function/userdata/thread types unsupported)")]
    ArgumentType {
        /// 1-based position among the transferred values
        position: usize,
        function: &'static str,
        type_name: &'static str,
    },

    /// Tables nested deeper than the configured bound
    #[error("Hit maximum copy depth ({depth} > {max}).")]
    DepthExceeded { depth: usize, max: usize },

    /// The destination stack cannot take the values
    #[error("stack overflow: cannot copy {0} values")]
    StackOverflow(usize),
}

/// Which way a transfer goes; decides how unsupported values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Call arguments going into the callee (named for error messages)
    Arguments { function: &'static str },
    /// Results (or error values) coming back to the caller
    Results,
}

/// Copy `src` stack slots in `range` onto the top of `dst`'s stack.
///
/// # Arguments
/// * `dst` - State receiving the copies
/// * `src` - State owning the values
/// * `range` - Absolute slots of `src` to copy
/// * `direction` - Arguments or results
/// * `max_depth` - Deepest nesting allowed (top-level values are depth 1)
///
/// # Returns
/// * `Ok(())` - `range.len()` values were pushed on `dst`
/// * `Err(MarshalError)` - nothing was pushed; `dst` keeps its depth
pub fn copy_values(
    dst: &State,
    src: &State,
    range: Range<usize>,
    direction: Direction,
    max_depth: usize,
) -> Result<(), MarshalError> {
    let count = range.len();
    let values = src
        .stack_slice(range)
        .map_err(|_| MarshalError::StackOverflow(count))?;
    dst.ensure_stack(count)
        .map_err(|_| MarshalError::StackOverflow(count))?;

    let base = dst.stack_depth();
    let mut copier = Copier::new(dst, direction, max_depth);
    for (i, value) in values.iter().enumerate() {
        let pushed = copier
            .copy(value, i + 1)
            .and_then(|copy| dst.push(copy).map_err(|err| overflow(err, count)));
        if let Err(err) = pushed {
            dst.truncate_stack(base);
            return Err(err);
        }
    }

    trace!(
        count,
        tables = copier.cache.len(),
        ?direction,
        "values marshalled"
    );
    Ok(())
}

fn overflow(_: StackError, count: usize) -> MarshalError {
    MarshalError::StackOverflow(count)
}

/// A table whose entries still have to be copied.
struct Pending {
    source: TableRef,
    copy: TableRef,
    depth: usize,
}

/// State of one transfer.
struct Copier<'a> {
    dst: &'a State,
    direction: Direction,
    max_depth: usize,
    /// Source table address -> its copy
    cache: FxHashMap<usize, TableRef>,
    pending: Vec<Pending>,
}

impl<'a> Copier<'a> {
    fn new(dst: &'a State, direction: Direction, max_depth: usize) -> Self {
        Self {
            dst,
            direction,
            max_depth,
            cache: FxHashMap::default(),
            pending: Vec::new(),
        }
    }

    /// Copy one top-level value together with everything it reaches.
    fn copy(&mut self, value: &Value, position: usize) -> Result<Value, MarshalError> {
        let root = self.copy_one(value, 1, position)?;

        while let Some(Pending {
            source,
            copy,
            depth,
        }) = self.pending.pop()
        {
            let entries = source.borrow().pairs();
            for (key, value) in entries {
                let key = self.copy_one(&key, depth + 1, position)?;
                let value = self.copy_one(&value, depth + 1, position)?;
                // Source keys are never nil or NaN, and neither are their copies
                let _ = copy.set(key, value);
            }
        }

        Ok(root)
    }

    /// Copy a value without walking into tables; new tables are queued.
    fn copy_one(
        &mut self,
        value: &Value,
        depth: usize,
        position: usize,
    ) -> Result<Value, MarshalError> {
        if depth > self.max_depth {
            return Err(MarshalError::DepthExceeded {
                depth,
                max: self.max_depth,
            });
        }

        match value {
            Value::Nil => Ok(Value::Nil),
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => Ok(Value::String(Rc::from(&**s))),
            Value::Opaque(reference) => Ok(Value::Opaque(*reference)),
            Value::Table(source) => {
                if let Some(copy) = self.cache.get(&source.address()) {
                    return Ok(Value::Table(copy.clone()));
                }
                // Registered before its entries are copied, so cycles find it
                let copy = self.dst.new_table();
                self.cache.insert(source.address(), copy.clone());
                self.pending.push(Pending {
                    source: source.clone(),
                    copy: copy.clone(),
                    depth,
                });
                Ok(Value::Table(copy))
            }
            Value::Function(_) | Value::Userdata(_) => match self.direction {
                Direction::Arguments { function } => Err(MarshalError::ArgumentType {
                    position,
                    function,
                    type_name: value.type_name(),
                }),
                Direction::Results => Ok(Value::string(format!(
                    "Unsupported value: {}: {:#x}",
                    value.type_name(),
                    value.address().unwrap_or(0)
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rings_engine::{OpaqueRef, StateOptions};

    fn states() -> (State, State) {
        let src = State::new(StateOptions::default());
        src.open_libs();
        let dst = State::new(StateOptions::default());
        dst.open_libs();
        (src, dst)
    }

    /// Evaluate `source` in `src`, push its results and copy them to `dst`.
    fn transfer(
        src: &State,
        dst: &State,
        source: &str,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Vec<Value>, MarshalError> {
        let values = src.exec(source).unwrap();
        let base = src.stack_depth();
        for value in values {
            src.push(value).unwrap();
        }
        let top = src.stack_depth();

        let dst_base = dst.stack_depth();
        let result = copy_values(dst, src, base..top, direction, max_depth);
        src.truncate_stack(base);
        result.map(|()| dst.drain_stack(dst_base))
    }

    const ARGS: Direction = Direction::Arguments {
        function: "dostring",
    };

    #[test]
    fn test_primitives_round_trip() {
        let (src, dst) = states();
        let values = transfer(&src, &dst, "return 1.5, true, nil, 'text'", ARGS, 30).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Number(1.5),
                Value::Boolean(true),
                Value::Nil,
                Value::from("text")
            ]
        );
    }

    #[test]
    fn test_strings_are_copied_by_content() {
        let (src, dst) = states();
        let original = Value::from("shared");
        src.push(original.clone()).unwrap();
        copy_values(&dst, &src, 0..1, ARGS, 30).unwrap();
        let copy = dst.pop().unwrap();
        match (&original, &copy) {
            (Value::String(a), Value::String(b)) => {
                assert_eq!(a, b);
                assert!(!Rc::ptr_eq(a, b));
            }
            _ => panic!("expected strings"),
        }
    }

    #[test]
    fn test_cycles_keep_their_shape() {
        let (src, dst) = states();
        let values = transfer(&src, &dst, "local t = {name = 'loop'}; t.self = t; return t", ARGS, 30)
            .unwrap();
        let copy = values[0].as_table().cloned().unwrap();
        let inner = copy.get_str("self");
        assert!(inner.as_table().unwrap().ptr_eq(&copy));
        assert_eq!(copy.get_str("name"), Value::from("loop"));
    }

    #[test]
    fn test_indirect_cycles_keep_their_shape() {
        let (src, dst) = states();
        for direction in [ARGS, Direction::Results] {
            let values = transfer(
                &src,
                &dst,
                "local a, b = {name = 'a'}, {name = 'b'}
                 a.next = b; b.next = a
                 local x, y, z = {name = 'x'}, {name = 'y'}, {name = 'z'}
                 x.next = y; y.next = z; z.next = x
                 return a, x",
                direction,
                30,
            )
            .unwrap();

            let a = values[0].as_table().cloned().unwrap();
            let b = a.get_str("next").as_table().cloned().unwrap();
            assert!(!a.ptr_eq(&b));
            assert_eq!(b.get_str("name"), Value::from("b"));
            assert!(b.get_str("next").as_table().unwrap().ptr_eq(&a));

            let x = values[1].as_table().cloned().unwrap();
            let y = x.get_str("next").as_table().cloned().unwrap();
            let z = y.get_str("next").as_table().cloned().unwrap();
            assert!(!x.ptr_eq(&y) && !y.ptr_eq(&z) && !z.ptr_eq(&x));
            assert_eq!(z.get_str("name"), Value::from("z"));
            assert!(z.get_str("next").as_table().unwrap().ptr_eq(&x));
        }
    }

    #[test]
    fn test_shared_references_copied_once() {
        let (src, dst) = states();
        let values = transfer(
            &src,
            &dst,
            "local shared = {1, 2}; return {a = shared, b = shared}, shared",
            ARGS,
            30,
        )
        .unwrap();
        let outer = values[0].as_table().cloned().unwrap();
        let a = outer.get_str("a");
        let b = outer.get_str("b");
        assert!(a.as_table().unwrap().ptr_eq(b.as_table().unwrap()));
        // The cache spans every value of one transfer
        assert!(values[1].as_table().unwrap().ptr_eq(a.as_table().unwrap()));
    }

    #[test]
    fn test_copies_live_in_destination_heap() {
        let (src, dst) = states();
        let before = dst.live_tables();
        let values = transfer(&src, &dst, "return {{}, {}}", ARGS, 30).unwrap();
        assert_eq!(dst.live_tables(), before + 3);
        drop(values);
    }

    #[test]
    fn test_table_keys_are_copied() {
        let (src, dst) = states();
        let values = transfer(&src, &dst, "local k = {}; return {[k] = k}", ARGS, 30).unwrap();
        let outer = values[0].as_table().cloned().unwrap();
        let (key, value) = outer.borrow().pairs().remove(0);
        assert!(key.as_table().unwrap().ptr_eq(value.as_table().unwrap()));
    }

    #[test]
    fn test_depth_limit() {
        let (src, dst) = states();
        // Depth 3 table holding a value at depth 4
        let err = transfer(&src, &dst, "return {{{1}}}", ARGS, 3).unwrap_err();
        assert_eq!(err, MarshalError::DepthExceeded { depth: 4, max: 3 });
        assert_eq!(err.to_string(), "Hit maximum copy depth (4 > 3).");

        // An empty table at the limit is fine
        assert!(transfer(&src, &dst, "return {{{}}}", ARGS, 3).is_ok());
    }

    #[test]
    fn test_unsupported_argument_rejected() {
        let (src, dst) = states();
        let depth = dst.stack_depth();
        let err = transfer(&src, &dst, "return 1, {f = print}", ARGS, 30).unwrap_err();
        assert_eq!(
            err,
            MarshalError::ArgumentType {
                position: 2,
                function: "dostring",
                type_name: "function",
            }
        );
        assert_eq!(
            err.to_string(),
            "bad argument #2 to 'dostring' (function/userdata/thread types unsupported)"
        );
        assert_eq!(dst.stack_depth(), depth);
    }

    #[test]
    fn test_unsupported_result_becomes_placeholder() {
        let (src, dst) = states();
        let values = transfer(&src, &dst, "return print, newproxy()", Direction::Results, 30).unwrap();
        let text = values[0].as_str().unwrap();
        assert!(text.starts_with("Unsupported value: function: 0x"), "{}", text);
        let text = values[1].as_str().unwrap();
        assert!(text.starts_with("Unsupported value: userdata: 0x"), "{}", text);
    }

    #[test]
    fn test_opaque_references_pass_through() {
        let (src, dst) = states();
        let marker = 0xfeed_usize;
        src.push(Value::Opaque(OpaqueRef::new(marker))).unwrap();
        copy_values(&dst, &src, 0..1, ARGS, 30).unwrap();
        match dst.pop().unwrap() {
            Value::Opaque(reference) => assert_eq!(reference.address(), marker),
            other => panic!("expected opaque reference, got {:?}", other),
        }
    }

    #[test]
    fn test_metatables_are_not_copied() {
        let (src, dst) = states();
        let values = transfer(
            &src,
            &dst,
            "return setmetatable({x = 1}, {__index = function() return 0 end})",
            ARGS,
            30,
        )
        .unwrap();
        let copy = values[0].as_table().cloned().unwrap();
        assert!(copy.metatable().is_none());
        assert_eq!(copy.get_str("x"), Value::Number(1.0));
    }
}
