//! Math library

use super::{check_number, new_library, register};
use crate::vm::interpreter::State;
use crate::vm::value::Value;

pub(super) fn open(state: &State) {
    let math = new_library(state, "math");
    math.set_str("huge", Value::Number(f64::INFINITY));
    math.set_str("pi", Value::Number(std::f64::consts::PI));

    register(state, &math, "floor", |state, args| {
        Ok(vec![Value::Number(check_number(state, &args, 1, "floor")?.floor())])
    });
    register(state, &math, "ceil", |state, args| {
        Ok(vec![Value::Number(check_number(state, &args, 1, "ceil")?.ceil())])
    });
    register(state, &math, "abs", |state, args| {
        Ok(vec![Value::Number(check_number(state, &args, 1, "abs")?.abs())])
    });
    register(state, &math, "sqrt", |state, args| {
        Ok(vec![Value::Number(check_number(state, &args, 1, "sqrt")?.sqrt())])
    });

    register(state, &math, "fmod", |state, args| {
        let a = check_number(state, &args, 1, "fmod")?;
        let b = check_number(state, &args, 2, "fmod")?;
        // Rust's % on floats truncates like C fmod
        Ok(vec![Value::Number(a % b)])
    });

    register(state, &math, "max", |state, args| {
        let mut best = check_number(state, &args, 1, "max")?;
        for position in 2..=args.len() {
            best = best.max(check_number(state, &args, position, "max")?);
        }
        Ok(vec![Value::Number(best)])
    });

    register(state, &math, "min", |state, args| {
        let mut best = check_number(state, &args, 1, "min")?;
        for position in 2..=args.len() {
            best = best.min(check_number(state, &args, position, "min")?);
        }
        Ok(vec![Value::Number(best)])
    });
}
