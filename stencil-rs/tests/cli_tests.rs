/// Command-line tests: run templates through the `stencil` binary and check
/// stdout, stderr and the exit status.
///
/// Every run passes `-n` so a user config on the test machine cannot change
/// the outcome.
use std::io::Write;
use std::process::{Command, Output, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Path to the `stencil` binary built by this Cargo workspace.
fn binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_stencil"))
}

/// Pipe `template` to the binary on stdin.
fn run(args: &[&str], template: &str) -> Output {
    let mut child = Command::new(binary())
        .arg("-n")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn stencil binary");
    {
        let stdin = child.stdin.as_mut().expect("stdin not open");
        stdin.write_all(template.as_bytes()).expect("write to stdin");
    }
    child.wait_with_output().expect("wait failed")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── Cases ─────────────────────────────────────────────────────────────────────

#[test]
fn renders_stdin() {
    let out = run(&[], "{FOR EACH i IN 1..3}{i * 2}{WITH},{END}\n");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "2,4,6\n");
}

#[test]
fn defines_are_typed() {
    let out = run(
        &["-Dname=Ada", "-Dn=4", "-Dloud=true"],
        "{IF loud THEN}{name.upper()}{ELSE}{name}{END} {n + 1}",
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "ADA 5");
}

#[test]
fn strict_flag_reports_unknown_names() {
    let out = run(&["-s"], "{missing}");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("`missing` is not defined"), "{}", stderr(&out));

    let out = run(&["-s", "-i"], "a{missing}b");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "ab");
}

#[test]
fn compile_errors_fail() {
    let out = run(&[], "{IF x THEN}never closed");
    assert!(!out.status.success());
    assert!(stderr(&out).starts_with("stencil: "), "{}", stderr(&out));
    assert!(stdout(&out).is_empty());
}

#[test]
fn template_file_and_config() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("stencil.conf");
    std::fs::write(&conf, "tag_start = <\ntag_end = >\nundefined = ?\n").unwrap();
    let tpl = dir.path().join("page.tpl");
    std::fs::write(&tpl, "{literal} <nothing>").unwrap();

    let out = Command::new(binary())
        .arg(format!("-c{}", conf.display()))
        .arg(&tpl)
        .output()
        .expect("failed to run stencil binary");
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "{literal} ?");
}

#[test]
fn bad_usage() {
    let out = run(&["-z"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Usage:"));
}
