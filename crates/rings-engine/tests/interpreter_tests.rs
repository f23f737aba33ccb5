//! Interpreter Integration Tests
//!
//! End-to-end scripts run through `State::exec`:
//! - Closures and upvalues
//! - Metatables (`__index`, `__newindex`, `__call`, `__tostring`)
//! - Error positions, `pcall`/`error` and tracebacks
//! - Loops, varargs and multiple assignment
//! - Limits and heap tracking
//!
//! # Running Tests
//! ```bash
//! cargo test -p rings-engine --test interpreter_tests
//! ```

use rings_engine::{State, StateOptions, Value};

fn new_state() -> State {
    let state = State::new(StateOptions::default());
    state.open_libs();
    state
}

fn run(state: &State, source: &str) -> Vec<Value> {
    match state.exec(source) {
        Ok(values) => values,
        Err(err) => panic!("script failed: {}\n{}", err, source),
    }
}

fn run_err(state: &State, source: &str) -> String {
    match state.exec(source) {
        Ok(values) => panic!("expected failure, got {:?}", values),
        Err(err) => err.message(),
    }
}

// ===== Closures =====

#[test]
fn test_closure_counter_keeps_upvalue() {
    let state = new_state();
    let values = run(
        &state,
        "local function counter()
            local n = 0
            return function() n = n + 1; return n end
         end
         local a, b = counter(), counter()
         a(); a()
         return a(), b()",
    );
    assert_eq!(values, vec![Value::Number(3.0), Value::Number(1.0)]);
}

#[test]
fn test_loop_variables_are_fresh_per_iteration() {
    let state = new_state();
    let values = run(
        &state,
        "local fs = {}
         for i = 1, 3 do fs[i] = function() return i end end
         return fs[1](), fs[3]()",
    );
    assert_eq!(values, vec![Value::Number(1.0), Value::Number(3.0)]);
}

#[test]
fn test_recursive_local_function() {
    let state = new_state();
    let values = run(
        &state,
        "local function fib(n) if n < 2 then return n end return fib(n-1) + fib(n-2) end
         return fib(15)",
    );
    assert_eq!(values, vec![Value::Number(610.0)]);
}

// ===== Varargs and assignment =====

#[test]
fn test_varargs_and_multiple_results() {
    let state = new_state();
    let values = run(
        &state,
        "local function pack(...) return {...}, select('#', ...) end
         local t, n = pack(1, nil, 3)
         local a, b, c = (function() return 1, 2, 3 end)()
         local x, y = 1
         return n, t[3], a + b + c, y",
    );
    assert_eq!(
        values,
        vec![
            Value::Number(3.0),
            Value::Number(3.0),
            Value::Number(6.0),
            Value::Nil
        ]
    );
}

#[test]
fn test_swap_evaluates_right_side_first() {
    let state = new_state();
    let values = run(&state, "local a, b = 1, 2; a, b = b, a; return a, b");
    assert_eq!(values, vec![Value::Number(2.0), Value::Number(1.0)]);
}

// ===== Control flow =====

#[test]
fn test_loops_and_break() {
    let state = new_state();
    let values = run(
        &state,
        "local sum = 0
         for i = 10, 1, -2 do sum = sum + i end
         local n = 0
         while true do n = n + 1; if n == 5 then break end end
         local r = 0
         repeat local done = r >= 3; r = r + 1 until done
         local keys = 0
         for k, v in pairs({a = 1, b = 2, 3}) do keys = keys + 1 end
         local seq = ''
         for i, v in ipairs({'x', 'y', nil, 'z'}) do seq = seq .. v end
         return sum, n, r, keys, seq",
    );
    assert_eq!(
        values,
        vec![
            Value::Number(30.0),
            Value::Number(5.0),
            Value::Number(4.0),
            Value::Number(3.0),
            Value::from("xy"),
        ]
    );
}

// ===== Metatables =====

#[test]
fn test_index_and_newindex_metamethods() {
    let state = new_state();
    let values = run(
        &state,
        "local log = {}
         local base = {greet = function(self) return 'hi ' .. self.name end}
         local obj = setmetatable({name = 'ann'}, {
            __index = base,
            __newindex = function(t, k, v) log[#log + 1] = k; rawset(t, k, v) end,
         })
         obj.age = 3
         obj.age = 4
         return obj:greet(), obj.age, #log",
    );
    assert_eq!(
        values,
        vec![Value::from("hi ann"), Value::Number(4.0), Value::Number(1.0)]
    );
}

#[test]
fn test_call_and_tostring_metamethods() {
    let state = new_state();
    let values = run(
        &state,
        "local callable = setmetatable({}, {
            __call = function(self, x) return x * 2 end,
            __tostring = function() return 'callable!' end,
         })
         return callable(21), tostring(callable)",
    );
    assert_eq!(values, vec![Value::Number(42.0), Value::from("callable!")]);
}

// ===== Errors =====

#[test]
fn test_runtime_error_positions() {
    let state = new_state();
    let message = run_err(&state, "local t = nil\nreturn t.x");
    assert_eq!(
        message,
        "[string \"local t = nil...\"]:2: attempt to index local 't' (a nil value)"
    );

    let message = run_err(&state, "undefined_function()");
    assert!(
        message.ends_with("attempt to call global 'undefined_function' (a nil value)"),
        "{}",
        message
    );

    let message = run_err(&state, "return 1 + {}");
    assert!(message.ends_with("attempt to perform arithmetic on a table value"), "{}", message);

    let message = run_err(&state, "return {} < {}");
    assert!(message.ends_with("attempt to compare two table values"), "{}", message);
}

#[test]
fn test_error_levels_and_values() {
    let state = new_state();
    let values = run(
        &state,
        "local function check(x) if not x then error('need x', 2) end end
         local ok1, e1 = pcall(function()
            check(false)  -- line 3
         end)
         local ok2, e2 = pcall(error, 'plain', 0)
         local ok3, e3 = pcall(error)
         return e1, e2, e3",
    );
    let first = values[0].as_str().unwrap();
    assert!(first.ends_with(":3: need x"), "{}", first);
    assert_eq!(values[1], Value::from("plain"));
    assert_eq!(values[2], Value::Nil);
}

#[test]
fn test_syntax_errors_are_reported() {
    let state = new_state();
    let values = run(&state, "return loadstring('x = = 1')");
    assert_eq!(values[0], Value::Nil);
    let message = values[1].as_str().unwrap();
    assert!(message.contains(":1:"), "{}", message);

    let message = run_err(&state, "if x then");
    assert!(message.contains("'end' expected"), "{}", message);
}

#[test]
fn test_xpcall_handler_sees_failing_frames() {
    let state = new_state();
    let values = run(
        &state,
        "local function inner() local x = nil; return x.field end
         local function outer() return inner() end
         return xpcall(outer, debug.traceback)",
    );
    assert_eq!(values[0], Value::Boolean(false));
    let trace = values[1].as_str().unwrap();
    assert!(trace.contains("attempt to index local 'x'"), "{}", trace);
    assert!(trace.contains("in function 'inner'"), "{}", trace);
    assert!(trace.contains("in function 'outer'"), "{}", trace);
    assert!(trace.contains("in main chunk"), "{}", trace);
}

// ===== Limits =====

#[test]
fn test_call_depth_limit_is_a_script_error() {
    let state = State::new(StateOptions {
        max_call_depth: 40,
        ..Default::default()
    });
    state.open_libs();
    let values = run(
        &state,
        "local function down(n) return down(n + 1) end
         return pcall(down, 1)",
    );
    assert_eq!(values[0], Value::Boolean(false));
    assert!(values[1].as_str().unwrap().ends_with("stack overflow"));
}

#[test]
fn test_traceback_handler_runs_past_call_depth_limit() {
    let state = State::new(StateOptions {
        max_call_depth: 40,
        ..Default::default()
    });
    state.open_libs();
    let values = run(
        &state,
        "local function f(n) return f(n + 1) + 1 end
         return xpcall(function() return f(1) end, debug.traceback)",
    );
    assert_eq!(values[0], Value::Boolean(false));
    let message = values[1].as_str().unwrap();
    assert!(message.contains("stack overflow"), "{}", message);
    assert!(message.contains("stack traceback:"), "{}", message);
    assert!(message.contains("in function 'f'"), "{}", message);

    // The state is usable afterwards
    assert_eq!(run(&state, "return 1 + 1"), vec![Value::Number(2.0)]);
}

#[test]
fn test_failing_handler_still_reports_error_in_error_handling() {
    let state = new_state();
    let values = run(
        &state,
        "local function handler(e) error('again') end
         return xpcall(function() error('first') end, handler)",
    );
    assert_eq!(values[0], Value::Boolean(false));
    assert_eq!(values[1], Value::from("error in error handling"));
}

// ===== Environments =====

#[test]
fn test_function_environments() {
    let state = new_state();
    let chunk = state.load("return answer, print", "=env").unwrap();
    let env = state.new_table();
    env.set_str("answer", Value::Number(42.0));
    assert!(state.set_environment(&chunk, env.clone()));

    let values = state.pcall(&chunk, Vec::new(), None).unwrap();
    assert_eq!(values, vec![Value::Number(42.0), Value::Nil]);
    assert!(state.environment(&chunk).unwrap().ptr_eq(&env));
}

// ===== Heap tracking =====

#[test]
fn test_close_breaks_reference_cycles() {
    let state = new_state();
    run(
        &state,
        "cycle = {}
         cycle.self = cycle
         local a, b = {}, {}
         a.other, b.other = b, a",
    );
    let cycle = state.globals().get_str("cycle").as_table().cloned().unwrap();
    assert!(state.live_tables() > 0);

    state.close();
    assert!(state.is_closed());
    assert!(cycle.borrow().is_empty());
    assert_eq!(state.live_tables(), 0);
}

#[test]
fn test_collect_garbage_prunes_dead_tables() {
    let state = new_state();
    let before = state.live_tables();
    run(&state, "for i = 1, 100 do local t = {i} end");
    state.collect_garbage();
    assert_eq!(state.live_tables(), before);
    assert!(state.heap_stats().collections >= 1);
}
