//! Fatal paths, driven through the `ehm-probe` binary in a child process.

use std::process::{Command, Output};
use tempfile::TempDir;

fn probe(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_ehm-probe");
    Command::new(bin)
        .env("EHM_LOG", "off")
        .args(args)
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn unmatched_throw_aborts_with_diagnostic() {
    let output = probe(&["unmatched-throw"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("uncaught exception"), "stderr={}", err);
    assert!(err.contains("Failure"), "stderr={}", err);
    assert!(err.contains("raised by probe"), "stderr={}", err);
    assert!(err.contains("nobody catches this"), "stderr={}", err);
}

#[test]
fn unmatched_resume_aborts_with_diagnostic() {
    let output = probe(&["unmatched-resume"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("unhandled resumption"), "stderr={}", err);
    assert!(err.contains("Interrupt"), "stderr={}", err);
    assert!(!stdout(&output).contains("resumed"));
}

#[test]
fn raise_in_cleanup_during_unwind_is_fatal() {
    let output = probe(&["finally-during-unwind"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("finally_during_unwind"), "stderr={}", err);
    assert!(
        err.contains("Raising an exception in a finally clause during exception propagation is disallowed."),
        "stderr={}",
        err
    );
    assert!(!stdout(&output).contains("caught"));
}

#[test]
fn raise_in_cleanup_after_normal_exit_is_caught() {
    let output = probe(&["finally-after-unwind"]);
    assert!(output.status.success(), "stderr={}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "caught: raised in cleanup");
}

#[test]
fn closing_mask_scope_out_of_order_is_fatal() {
    let output = probe(&["mask-out-of-order"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("scope_order"), "stderr={}", err);
    assert!(err.contains("mask scope"), "stderr={}", err);
    assert!(!stdout(&output).contains("scopes closed"));
}

#[test]
fn closing_handler_scope_out_of_order_is_fatal() {
    let output = probe(&["handler-out-of-order"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("scope_order"), "stderr={}", err);
    assert!(err.contains("handler scope"), "stderr={}", err);
    assert!(!stdout(&output).contains("scopes closed"));
}

#[test]
fn handled_throw_exits_cleanly() {
    let output = probe(&["handled"]);
    assert!(output.status.success(), "stderr={}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "caught: expected from probe");
}

#[test]
fn replaced_fallback_controls_exit_status() {
    let output = probe(&["unmatched-throw", "--exit-code", "3"]);
    assert_eq!(output.status.code(), Some(3));
    let report: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(report["violation"], "unmatched_throw");
    assert_eq!(report["context"], "probe");
    assert_eq!(report["message"], "nobody catches this");
}

#[test]
fn config_file_shortens_source_names() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("ehm.toml");
    std::fs::write(&config, "[engine]\nmax_source_name = 3\n").unwrap();

    let output = probe(&["handled", "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr={}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "caught: expected from pro");
}

#[test]
fn invalid_config_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("ehm.toml");
    std::fs::write(&config, "[engine]\ninbox_high_water = 0\n").unwrap();

    let output = probe(&["handled", "--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("inbox_high_water"));
}
