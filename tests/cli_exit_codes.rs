//! CLI integration tests for exit codes and the summary line

#![cfg(feature = "cli")]

mod common;

use common::{TestRecord, Workspace};
use std::process::{Command, Output};

fn run_cli(ws: &Workspace, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_e621-noapi"))
        .args(args)
        .env("E621_NOAPI_CACHE_DIR", ws.path().join("cache"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI")
}

#[test]
fn test_successful_run_prints_summary_and_exits_zero() {
    let ws = Workspace::new();
    ws.write_image("1.png", 30, 30);
    let export = ws.write_jsonl(&[TestRecord::new("1", &["a"]), TestRecord::new("2", &["a"])]);
    let out = ws.output("out");
    let images = ws.images();

    let output = run_cli(
        &ws,
        &[
            export.to_str().unwrap(),
            out.to_str().unwrap(),
            "-i",
            images.to_str().unwrap(),
            "-s",
            "24",
            "-q",
            "a",
        ],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("matched 2, succeeded 1, skipped 1"), "stdout: {stdout}");
    assert!(out.join("1.png").exists());
    assert_eq!(image::open(out.join("1.png")).unwrap().width(), 24);
}

#[test]
fn test_bad_query_exits_nonzero() {
    let ws = Workspace::new();
    let export = ws.write_jsonl(&[TestRecord::new("1", &["a"])]);
    let out = ws.output("out");

    let output = run_cli(
        &ws,
        &[export.to_str().unwrap(), out.to_str().unwrap(), "-q", "( a OR"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid query syntax"));
    assert!(!out.exists());
}

#[test]
fn test_missing_export_exits_nonzero_with_summary() {
    let ws = Workspace::new();
    let export = ws.path().join("missing.jsonl");
    let out = ws.output("out");

    let output = run_cli(&ws, &[export.to_str().unwrap(), out.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("matched 0"));
}

#[test]
fn test_save_config_round_trips_through_config_flag() {
    let ws = Workspace::new();
    ws.write_image("1.png", 30, 30);
    let export = ws.write_jsonl(&[TestRecord::new("1", &["a"])]);
    let out = ws.output("out");
    let images = ws.images();
    let config_path = ws.path().join("config.json");

    let saved = run_cli(
        &ws,
        &[
            export.to_str().unwrap(),
            out.to_str().unwrap(),
            "-i",
            images.to_str().unwrap(),
            "--format",
            "jpeg",
            "--save-config",
            config_path.to_str().unwrap(),
        ],
    );
    assert!(saved.status.success());
    assert!(!out.exists());

    let output = run_cli(&ws, &["--config", config_path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(out.join("1.jpg").exists());
}
