//! `rings run` - execute a script file in a fresh host context.

use anyhow::Context;
use rings_core::{CallOutcome, Rings, RingsOptions};
use rings_engine::Value;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;

pub fn execute(options: RingsOptions, path: &Path, args: &[String]) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let source = strip_shebang(&source);

    let rings = Rings::with_options(options)?;
    let host = rings.host();

    // arg[0] is the script, arg[1..] its arguments
    let arg = host.new_table();
    arg.set(Value::Number(0.0), Value::string(path.display().to_string()))?;
    for (i, value) in args.iter().enumerate() {
        arg.set(Value::Number((i + 1) as f64), Value::string(value))?;
    }
    host.globals().set_str("arg", Value::Table(arg));

    let varargs = args.iter().map(Value::string).collect();
    let chunk_name = format!("@{}", path.display());
    debug!(file = %path.display(), args = args.len(), "running script");

    match rings.run(&source, &chunk_name, varargs) {
        CallOutcome::Success(_) => Ok(ExitCode::SUCCESS),
        CallOutcome::Failure(err) => {
            eprintln!("rings: {}", err);
            Ok(ExitCode::from(1))
        }
    }
}

/// Turn a leading `#!` line into a comment so line numbers stay put.
fn strip_shebang(source: &str) -> String {
    if source.starts_with('#') {
        format!("--{}", source)
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_shebang() {
        assert_eq!(strip_shebang("#!/usr/bin/env rings\nprint(1)"), "--#!/usr/bin/env rings\nprint(1)");
        assert_eq!(strip_shebang("print(1)"), "print(1)");
    }
}
