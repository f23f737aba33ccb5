//! Integration tests for the `rings` binary.
//!
//! Each test drives the built executable the way a user would and checks
//! its exit status and output streams.

use std::path::Path;
use std::process::{Command, Output};

fn rings() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rings"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_script(dir: &Path, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, source).unwrap();
    path
}

// ────────────────────────────────────────────────────────────────────────────
// eval
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_eval_prints_results() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args(["eval", "return 1 + 1, 'x'"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "2\tx");
}

#[test]
fn test_eval_no_results_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args(["eval", "local x = 1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
}

#[test]
fn test_eval_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args(["eval", "error('boom')"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("boom"));
}

#[test]
fn test_eval_ring_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args([
            "eval",
            "local r = rings.new() return r:dostring('return select(\"#\", ...), ...', 'a', 'b')",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "true\t2\ta\tb");
}

// ────────────────────────────────────────────────────────────────────────────
// run
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_script_with_args() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "double.lua",
        "#!/usr/bin/env rings\n\
         local r = rings.new()\n\
         local ok, v = r:dostring('return ... * 2', tonumber(arg[1]))\n\
         print(ok, v)\n",
    );

    let output = rings()
        .current_dir(dir.path())
        .arg("run")
        .arg(&script)
        .arg("21")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "true\t42");
}

#[test]
fn test_run_script_receives_varargs() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "args.lua", "print(select('#', ...), ...)\n");

    let output = rings()
        .current_dir(dir.path())
        .arg("run")
        .arg(&script)
        .args(["one", "-two"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "2\tone\t-two");
}

#[test]
fn test_run_failure_reports_location() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fail.lua", "local x = 1\nerror('bad thing')\n");

    let output = rings()
        .current_dir(dir.path())
        .arg("run")
        .arg(&script)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("bad thing"), "stderr: {}", err);
    assert!(err.contains(":2:"), "stderr: {}", err);
}

#[test]
fn test_run_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args(["run", "does-not-exist.lua"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read"));
}

// ────────────────────────────────────────────────────────────────────────────
// configuration
// ────────────────────────────────────────────────────────────────────────────

const DEEP_COPY: &str =
    "local r = rings.new() return r:dostring('return true', {{{}}})";

#[test]
fn test_config_flag_sets_copy_depth() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("shallow.toml");
    std::fs::write(&config, "max_copy_depth = 2\n").unwrap();

    let output = rings()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["eval", DEEP_COPY])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("false\t"), "stdout: {}", out);
    assert!(out.contains("Hit maximum copy depth"), "stdout: {}", out);
}

#[test]
fn test_default_depth_allows_nesting() {
    let dir = tempfile::tempdir().unwrap();
    let output = rings()
        .current_dir(dir.path())
        .args(["eval", DEEP_COPY])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "true\ttrue");
}

#[test]
fn test_rings_toml_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rings.toml"), "max_copy_depth = 2\n").unwrap();

    let output = rings()
        .current_dir(dir.path())
        .args(["eval", DEEP_COPY])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).starts_with("false\t"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "max_copy_depth = 0\n").unwrap();

    let output = rings()
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["eval", "return 1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("max_copy_depth must be at least 1"));
}
