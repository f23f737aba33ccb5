//! Table library

use super::{arg, check_any, check_integer, check_table, new_library, opt_integer, opt_string, register};
use crate::vm::error::ScriptError;
use crate::vm::interpreter::State;
use crate::vm::value::Value;

pub(super) fn open(state: &State) {
    let table = new_library(state, "table");

    register(state, &table, "insert", |state, args| {
        let target = check_table(state, &args, 1, "insert")?;
        let end = target.borrow().border();
        match args.len() {
            2 => state.raw_set(&target, Value::Number((end + 1) as f64), arg(&args, 2))?,
            3 => {
                let position = check_integer(state, &args, 2, "insert")?;
                if position < 1 {
                    return Err(state.error("bad argument #2 to 'insert' (position out of bounds)"));
                }
                target.borrow_mut().insert_at(position as usize, arg(&args, 3));
            }
            _ => return Err(state.error("wrong number of arguments to 'insert'")),
        }
        Ok(Vec::new())
    });

    register(state, &table, "remove", |state, args| {
        let target = check_table(state, &args, 1, "remove")?;
        let end = target.borrow().border() as i64;
        if end == 0 {
            return Ok(Vec::new());
        }
        let position = opt_integer(state, &args, 2, "remove", end)?;
        if position < 1 || position > end {
            return Ok(vec![Value::Nil]);
        }
        let removed = target.borrow_mut().remove_at(position as usize);
        Ok(vec![removed])
    });

    register(state, &table, "concat", |state, args| {
        let target = check_table(state, &args, 1, "concat")?;
        let separator = opt_string(state, &args, 2, "concat")?;
        let first = opt_integer(state, &args, 3, "concat", 1)?;
        let last = match arg(&args, 4) {
            Value::Nil => target.borrow().border() as i64,
            _ => check_integer(state, &args, 4, "concat")?,
        };

        let mut out = String::new();
        for i in first..=last {
            let text = target.get(&Value::Number(i as f64)).to_text().ok_or_else(|| {
                state.error(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    i
                ))
            })?;
            out.push_str(&text);
            if i < last {
                out.push_str(separator.as_deref().unwrap_or(""));
            }
        }
        Ok(vec![Value::string(out)])
    });

    register(state, &table, "sort", |state, args| {
        let target = check_table(state, &args, 1, "sort")?;
        let comparator = match arg(&args, 2) {
            Value::Nil => None,
            _ => Some(check_any(state, &args, 2, "sort")?),
        };

        let end = target.borrow().border();
        let values: Vec<Value> = (1..=end)
            .map(|i| target.get(&Value::Number(i as f64)))
            .collect();

        let mut less = |a: &Value, b: &Value| -> Result<bool, ScriptError> {
            match &comparator {
                Some(function) => {
                    let result = state.call(function, vec![a.clone(), b.clone()])?;
                    Ok(result.first().is_some_and(Value::is_truthy))
                }
                None => state.less_than(a, b),
            }
        };
        let sorted = merge_sort(values, &mut less)?;

        for (i, value) in sorted.into_iter().enumerate() {
            state.raw_set(&target, Value::Number((i + 1) as f64), value)?;
        }
        Ok(Vec::new())
    });
}

/// Stable sort with a comparison that may fail.
fn merge_sort<F>(mut values: Vec<Value>, less: &mut F) -> Result<Vec<Value>, ScriptError>
where
    F: FnMut(&Value, &Value) -> Result<bool, ScriptError>,
{
    if values.len() <= 1 {
        return Ok(values);
    }
    let right = values.split_off(values.len() / 2);
    let left = merge_sort(values, less)?;
    let right = merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if less(b, a)? {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
