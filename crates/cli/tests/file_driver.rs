//! Drives the built `kokoki` binary against real files on disk, the same
//! write-a-temp-file-then-exercise-it shape as the teacher's
//! `crates/runtime/src/file.rs` unit tests, but through a subprocess since
//! this is the file-evaluation entry point itself rather than a native.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn kokoki() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kokoki"))
}

fn write_source(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    write!(file, "{source}").unwrap();
    file
}

#[test]
fn running_a_file_that_leaves_no_error_exits_zero() {
    let file = write_source("1 2 + dump");
    let output = kokoki().arg(file.path()).output().expect("failed to run kokoki");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");
}

#[test]
fn running_a_file_that_leaves_an_error_on_the_stack_exits_nonzero() {
    let file = write_source("1 move");
    let output = kokoki().arg(file.path()).output().expect("failed to run kokoki");
    assert!(!output.status.success());
}

#[test]
fn a_compile_error_exits_nonzero_and_reports_on_stderr() {
    let file = write_source("frobnicate");
    let output = kokoki().arg(file.path()).output().expect("failed to run kokoki");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("frobnicate"));
}

#[test]
fn a_missing_file_exits_nonzero() {
    let output = kokoki()
        .arg("/does/not/exist/kokoki-file-driver-test.kok")
        .output()
        .expect("failed to run kokoki");
    assert!(!output.status.success());
}
