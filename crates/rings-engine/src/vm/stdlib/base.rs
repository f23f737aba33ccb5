//! Base library (global functions)

use super::{
    arg, arg_error, check_any, check_integer, check_string, check_table, opt_integer, opt_string,
    register,
};
use crate::vm::error::ScriptError;
use crate::vm::interpreter::State;
use crate::vm::table::Table;
use crate::vm::value::{str_to_number, Value};
use std::io::Write;

pub(super) fn open(state: &State) {
    let globals = state.globals();

    register(state, &globals, "assert", |state, args| {
        if arg(&args, 1).is_truthy() {
            return Ok(args);
        }
        let message = opt_string(state, &args, 2, "assert")?;
        Err(state.error(message.as_deref().unwrap_or("assertion failed!")))
    });

    register(state, &globals, "error", |state, args| {
        let value = arg(&args, 1);
        let level = opt_integer(state, &args, 2, "error", 1)?;
        match value {
            Value::String(message) if level > 0 => {
                Err(state.error_at_level(&*message, level as usize))
            }
            other => Err(ScriptError::new(other)),
        }
    });

    register(state, &globals, "pcall", |state, args| {
        let function = check_any(state, &args, 1, "pcall")?;
        let rest = args.into_iter().skip(1).collect();
        Ok(protected(state.pcall(&function, rest, None)))
    });

    register(state, &globals, "xpcall", |state, args| {
        let function = arg(&args, 1);
        let handler = arg(&args, 2);
        Ok(protected(state.pcall(&function, Vec::new(), Some(handler))))
    });

    register(state, &globals, "print", |state, args| {
        let mut line = String::new();
        for (i, value) in args.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&state.tostring(value)?);
        }
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        Ok(Vec::new())
    });

    register(state, &globals, "type", |state, args| {
        let value = check_any(state, &args, 1, "type")?;
        Ok(vec![Value::from(value.type_name())])
    });

    register(state, &globals, "tostring", |state, args| {
        let value = check_any(state, &args, 1, "tostring")?;
        Ok(vec![Value::String(state.tostring(&value)?)])
    });

    register(state, &globals, "tonumber", |state, args| {
        let value = check_any(state, &args, 1, "tonumber")?;
        let base = opt_integer(state, &args, 2, "tonumber", 10)?;
        if base == 10 {
            return Ok(vec![match &value {
                Value::Number(_) => value.clone(),
                Value::String(s) => str_to_number(s).map(Value::Number).unwrap_or_default(),
                _ => Value::Nil,
            }]);
        }
        if !(2..=36).contains(&base) {
            return Err(arg_error(state, 2, "tonumber", "base out of range"));
        }
        let text = check_string(state, &args, 1, "tonumber")?;
        let parsed = i64::from_str_radix(text.trim(), base as u32)
            .map(|n| Value::Number(n as f64))
            .unwrap_or_default();
        Ok(vec![parsed])
    });

    register(state, &globals, "rawget", |state, args| {
        let table = check_table(state, &args, 1, "rawget")?;
        let key = check_any(state, &args, 2, "rawget")?;
        Ok(vec![table.get(&key)])
    });

    register(state, &globals, "rawset", |state, args| {
        let table = check_table(state, &args, 1, "rawset")?;
        let key = check_any(state, &args, 2, "rawset")?;
        let value = check_any(state, &args, 3, "rawset")?;
        state.raw_set(&table, key, value)?;
        Ok(vec![Value::Table(table)])
    });

    register(state, &globals, "rawequal", |state, args| {
        let a = check_any(state, &args, 1, "rawequal")?;
        let b = check_any(state, &args, 2, "rawequal")?;
        Ok(vec![Value::Boolean(a.raw_equal(&b))])
    });

    register(state, &globals, "setmetatable", |state, args| {
        let table = check_table(state, &args, 1, "setmetatable")?;
        let metatable = match arg(&args, 2) {
            Value::Nil => None,
            Value::Table(t) => Some(t),
            _ => return Err(arg_error(state, 2, "setmetatable", "nil or table expected")),
        };
        if let Some(current) = table.metatable() {
            if !current.get_str("__metatable").is_nil() {
                return Err(state.error("cannot change a protected metatable"));
            }
        }
        let previous = table.metatable();
        table.borrow_mut().set_metatable(metatable);
        drop(previous);
        Ok(vec![Value::Table(table)])
    });

    register(state, &globals, "getmetatable", |state, args| {
        let value = check_any(state, &args, 1, "getmetatable")?;
        Ok(vec![match state.metatable(&value) {
            None => Value::Nil,
            Some(metatable) => {
                let protected = metatable.get_str("__metatable");
                if protected.is_nil() {
                    Value::Table(metatable)
                } else {
                    protected
                }
            }
        }])
    });

    let next = state.create_function("next", table_next);
    globals.set_str("next", next.clone());

    register(state, &globals, "pairs", move |state, args| {
        let table = check_table(state, &args, 1, "pairs")?;
        Ok(vec![next.clone(), Value::Table(table), Value::Nil])
    });

    let ipairs_step = state.create_function("ipairs_iterator", |state, args| {
        let table = check_table(state, &args, 1, "ipairs")?;
        let i = check_integer(state, &args, 2, "ipairs")? + 1;
        let value = table.get(&Value::Number(i as f64));
        if value.is_nil() {
            Ok(vec![Value::Nil])
        } else {
            Ok(vec![Value::Number(i as f64), value])
        }
    });
    register(state, &globals, "ipairs", move |state, args| {
        let table = check_table(state, &args, 1, "ipairs")?;
        Ok(vec![
            ipairs_step.clone(),
            Value::Table(table),
            Value::Number(0.0),
        ])
    });

    register(state, &globals, "select", |state, args| {
        let count = args.len().saturating_sub(1) as i64;
        if let Value::String(s) = arg(&args, 1) {
            if &*s == "#" {
                return Ok(vec![Value::Number(count as f64)]);
            }
        }
        let n = check_integer(state, &args, 1, "select")?;
        let start = if n < 0 { count + n } else { n - 1 };
        if n == 0 || start < 0 {
            return Err(arg_error(state, 1, "select", "index out of range"));
        }
        Ok(args.into_iter().skip(1 + start as usize).collect())
    });

    register(state, &globals, "unpack", |state, args| {
        let table = check_table(state, &args, 1, "unpack")?;
        let first = opt_integer(state, &args, 2, "unpack", 1)?;
        let last = match arg(&args, 3) {
            Value::Nil => table.borrow().border() as i64,
            _ => check_integer(state, &args, 3, "unpack")?,
        };
        if first > last {
            return Ok(Vec::new());
        }
        let count = last
            .checked_sub(first)
            .and_then(|d| d.checked_add(1))
            .and_then(|n| usize::try_from(n).ok());
        match count {
            Some(count) if state.ensure_stack(count).is_ok() => {}
            _ => return Err(state.error("too many results to unpack")),
        }
        Ok((first..=last)
            .map(|i| table.get(&Value::Number(i as f64)))
            .collect())
    });

    register(state, &globals, "newproxy", |state, args| {
        let metatable = match arg(&args, 1) {
            Value::Boolean(true) => Some(state.new_table()),
            Value::Nil | Value::Boolean(false) => None,
            _ => return Err(arg_error(state, 1, "newproxy", "boolean or proxy expected")),
        };
        Ok(vec![state.create_userdata((), metatable)])
    });

    register(state, &globals, "collectgarbage", |state, args| {
        let option = opt_string(state, &args, 1, "collectgarbage")?;
        match option.as_deref().unwrap_or("collect") {
            "collect" | "step" => {
                state.collect_garbage();
                Ok(vec![Value::Number(0.0)])
            }
            "count" => {
                let bytes = state.live_tables() * std::mem::size_of::<Table>();
                Ok(vec![Value::Number(bytes as f64 / 1024.0)])
            }
            other => Err(arg_error(
                state,
                1,
                "collectgarbage",
                format!("invalid option '{}'", other),
            )),
        }
    });

    register(state, &globals, "loadstring", |state, args| {
        let source = check_string(state, &args, 1, "loadstring")?;
        let name = opt_string(state, &args, 2, "loadstring")?;
        match state.load(&source, name.as_deref().unwrap_or(&source)) {
            Ok(function) => Ok(vec![function]),
            Err(err) => Ok(vec![Value::Nil, Value::string(err.to_string())]),
        }
    });

    register(state, &globals, "setfenv", |state, args| {
        let env = check_table(state, &args, 2, "setfenv")?;
        let function = function_argument(state, &args, "setfenv")?;
        match function {
            Some(function) if state.set_environment(&function, env) => Ok(vec![function]),
            _ => Err(state.error("'setfenv' cannot change environment of given object")),
        }
    });

    register(state, &globals, "getfenv", |state, args| {
        let env = match function_argument(state, &args, "getfenv")? {
            Some(function) => state.environment(&function),
            None => Some(state.globals()),
        };
        Ok(vec![env.map(Value::Table).unwrap_or_default()])
    });
}

/// `true, ...` or `false, err` from a protected call.
fn protected(result: Result<Vec<Value>, ScriptError>) -> Vec<Value> {
    match result {
        Ok(values) => {
            let mut out = Vec::with_capacity(values.len() + 1);
            out.push(Value::Boolean(true));
            out.extend(values);
            out
        }
        Err(err) => vec![Value::Boolean(false), err.into_value()],
    }
}

fn table_next(state: &State, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
    let table = check_table(state, &args, 1, "next")?;
    let key = arg(&args, 2);
    let entry = table.borrow().next(&key);
    match entry {
        Ok(Some((key, value))) => Ok(vec![key, value]),
        Ok(None) => Ok(vec![Value::Nil]),
        Err(err) => Err(state.error(err.to_string())),
    }
}

/// Function named by a `setfenv`/`getfenv` argument: a function value or a
/// call level (1 = the caller). `None` means level 0, the global table.
fn function_argument(
    state: &State,
    args: &[Value],
    name: &str,
) -> Result<Option<Value>, ScriptError> {
    match arg(args, 1) {
        function @ Value::Function(_) => Ok(Some(function)),
        Value::Nil if name == "getfenv" => Ok(level_function(state, 1)),
        _ => {
            let level = check_integer(state, args, 1, name)?;
            if level < 0 {
                return Err(arg_error(state, 1, name, "level must be non-negative"));
            }
            if level == 0 {
                return Ok(None);
            }
            level_function(state, level as usize)
                .map(Some)
                .ok_or_else(|| arg_error(state, 1, name, "invalid level"))
        }
    }
}

fn level_function(state: &State, level: usize) -> Option<Value> {
    state.function_at_level(level).map(Value::Function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::interpreter::StateOptions;

    fn state() -> State {
        let state = State::new(StateOptions::default());
        state.open_libs();
        state
    }

    fn eval(state: &State, source: &str) -> Vec<Value> {
        match state.exec(source) {
            Ok(values) => values,
            Err(err) => panic!("{}: {}", source, err),
        }
    }

    #[test]
    fn test_select_and_unpack() {
        let state = state();
        assert_eq!(eval(&state, "return select('#', 1, nil, 3)"), vec![Value::Number(3.0)]);
        assert_eq!(
            eval(&state, "return select(-1, 'a', 'b')"),
            vec![Value::from("b")]
        );
        assert_eq!(
            eval(&state, "return unpack({1, 2, 3}, 2)"),
            vec![Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn test_pcall_reports_failure_as_data() {
        let state = state();
        let values = eval(&state, "return pcall(error, {code = 7})");
        assert_eq!(values[0], Value::Boolean(false));
        let table = values[1].as_table().cloned().unwrap();
        assert_eq!(table.get_str("code"), Value::Number(7.0));
    }

    #[test]
    fn test_protected_metatable() {
        let state = state();
        let values = eval(
            &state,
            "local t = setmetatable({}, {__metatable = 'locked'})
             local ok, err = pcall(setmetatable, t, {})
             return getmetatable(t), ok, err",
        );
        assert_eq!(values[0], Value::from("locked"));
        assert_eq!(values[1], Value::Boolean(false));
        assert!(values[2].as_str().unwrap().ends_with("cannot change a protected metatable"));
    }

    #[test]
    fn test_tonumber_bases() {
        let state = state();
        assert_eq!(
            eval(&state, "return tonumber('ff', 16), tonumber(' 12 '), tonumber('x')"),
            vec![Value::Number(255.0), Value::Number(12.0), Value::Nil]
        );
    }

    #[test]
    fn test_setfenv_on_function() {
        let state = state();
        let values = eval(
            &state,
            "local function f() return answer end
             setfenv(f, {answer = 42})
             return f(), answer",
        );
        assert_eq!(values, vec![Value::Number(42.0), Value::Nil]);
    }

    #[test]
    fn test_unpack_extreme_bounds() {
        let state = state();
        for source in [
            "return pcall(unpack, {}, -2^63, 2^63)",
            "return pcall(unpack, {}, 1, 2^62)",
            "return pcall(unpack, {}, -2^62, 2^62)",
        ] {
            let values = eval(&state, source);
            assert_eq!(values[0], Value::Boolean(false), "{}", source);
            assert!(
                values[1].as_str().unwrap().ends_with("too many results to unpack"),
                "{:?}",
                values[1]
            );
        }
        assert_eq!(eval(&state, "return unpack({}, 2^63, -2^63)"), Vec::<Value>::new());
    }
}
