mod common;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use common::guest;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::tempdir;

fn lumo_cmd() -> Command {
    Command::cargo_bin("lumo").expect("lumo binary")
}

fn write_module(dir: &Path, name: &str, wat: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, wat).expect("write module");
    path
}

fn imul_guest() -> String {
    guest(
        r#"(import "env" "math.imul" (func $imul (param i32 i32) (result i32)))"#,
        "(result i32) i32.const 6 i32.const 7 call $imul",
        Some(r#""int""#),
    )
}

#[test]
fn run_prints_the_decoded_result() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(dir.path(), "answer.wat", &imul_guest());

    lumo_cmd()
        .arg("run")
        .arg(&module)
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn run_returns_replaces_the_module_descriptor() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(
        dir.path(),
        "colour.wat",
        &guest("", "(result i32) i32.const 1", Some(r#""int""#)),
    );

    lumo_cmd().arg("run").arg(&module).assert().success().stdout("1\n");
    lumo_cmd()
        .arg("run")
        .arg(&module)
        .args(["--returns", r#"{"type":"enum","enum":["red","green"]}"#])
        .assert()
        .success()
        .stdout("green\n");
    lumo_cmd()
        .arg("run")
        .arg(&module)
        .args(["--returns", "colour"])
        .assert()
        .failure()
        .stderr(contains("malformed type descriptor"));
}

#[test]
fn imports_lists_each_binding() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(
        dir.path(),
        "imports.wat",
        &guest(
            r#"(import "env" "print" (func (param i32)))
               (import "env" "math.sin" (func (param f64) (result f64)))"#,
            "",
            None,
        ),
    );

    lumo_cmd()
        .arg("imports")
        .arg(&module)
        .assert()
        .success()
        .stdout(contains("env.print -> node.print").and(contains("env.math.sin -> math.sin")));
}

#[test]
fn web_environment_rejects_os_imports() {
    let dir = tempdir().expect("tempdir");
    let module = write_module(
        dir.path(),
        "cwd.wat",
        &guest(
            r#"(import "env" "os.getcwd" (func $getcwd (result i32)))"#,
            "(result i32) call $getcwd",
            Some(r#""str""#),
        ),
    );

    lumo_cmd()
        .args(["--env", "web", "run"])
        .arg(&module)
        .assert()
        .failure()
        .stderr(contains("unknown import module: os"));
    lumo_cmd().arg("run").arg(&module).assert().success();
}

#[cfg(unix)]
#[test]
fn line_runs_through_an_external_compiler() {
    lumo_cmd()
        .args(["line", "--compiler", "cat", &imul_guest()])
        .assert()
        .success()
        .stdout("42\n");
}

#[cfg(unix)]
#[test]
fn repl_reports_errors_and_keeps_going() {
    // The compiler keeps only the text after the last `;`, so every line is
    // compiled on its own.
    let line = imul_guest().replace('\n', " ");
    lumo_cmd()
        .args(["repl", "--compiler", "sed s/.*;//"])
        .write_stdin(format!("(module (func\n{line}\n"))
        .assert()
        .success()
        .stdout(contains("42"))
        .stderr(contains("error: compile failed"));
}
