//! `rings eval` - evaluate inline code and print its results.

use rings_core::{CallOutcome, Rings, RingsOptions};
use rings_engine::{State, Value};
use std::process::ExitCode;

pub fn execute(options: RingsOptions, code: &str) -> anyhow::Result<ExitCode> {
    let rings = Rings::with_options(options)?;

    match rings.eval(code) {
        CallOutcome::Success(values) => {
            if !values.is_empty() {
                println!("{}", render(&rings.host(), &values));
            }
            Ok(ExitCode::SUCCESS)
        }
        CallOutcome::Failure(err) => {
            eprintln!("rings: {}", err);
            Ok(ExitCode::from(1))
        }
    }
}

/// Tab separated, converted the way `tostring` does.
fn render(state: &State, values: &[Value]) -> String {
    values
        .iter()
        .map(|value| match state.tostring(value) {
            Ok(text) => text.to_string(),
            Err(_) => value.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\t")
}
